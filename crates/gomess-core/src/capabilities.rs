//! Capabilities the gateway consumes from collaborators.
//!
//! The gateway never talks to storage or the wall clock directly. It is
//! handed a [`UserDirectory`] and a [`Clock`] so both can be swapped in tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::UserId;

// ─────────────────────────────────────────────────────────────────────────────
// Clock
// ─────────────────────────────────────────────────────────────────────────────

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a settable instant.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock reading `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// UserDirectory
// ─────────────────────────────────────────────────────────────────────────────

/// A user record as exposed by the API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Same value as the token subject.
    pub id: UserId,
    /// Display name.
    pub name: String,
    #[allow(missing_docs)]
    pub email: String,
}

/// Failure of a directory lookup.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LookupError {
    /// No entity under the requested key.
    #[error("User not found")]
    NotFound,
    /// The backing store failed.
    #[error("user directory unavailable: {0}")]
    Unavailable(String),
}

/// One page of a listing, 1-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    /// Page number, starting at 1.
    pub page: u64,
    /// Items per page.
    pub limit: u64,
}

impl PageRequest {
    /// Items to skip before this page.
    pub fn offset(self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

/// Read access to user entities.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Fetch one user by key.
    async fn find_user(&self, id: &UserId) -> Result<User, LookupError>;

    /// Fetch one page of users plus the total count.
    async fn list_users(&self, page: PageRequest) -> Result<(Vec<User>, u64), LookupError>;
}

/// Directory held in memory, ordered by id.
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<BTreeMap<UserId, User>>,
}

impl InMemoryUserDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user.
    pub fn upsert(&self, user: User) {
        let _ = self.users.write().insert(user.id.clone(), user);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_user(&self, id: &UserId) -> Result<User, LookupError> {
        self.users.read().get(id).cloned().ok_or(LookupError::NotFound)
    }

    async fn list_users(&self, page: PageRequest) -> Result<(Vec<User>, u64), LookupError> {
        let users = self.users.read();
        let total = users.len() as u64;
        let items = users
            .values()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(page.limit).unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok((items, total))
    }
}
