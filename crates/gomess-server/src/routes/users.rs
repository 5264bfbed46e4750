//! User endpoints backed by the [`UserDirectory`](gomess_core::UserDirectory)
//! capability.

use axum::extract::{Path, Query, State};
use axum::http::HeaderName;
use axum::response::{IntoResponse, Json, Response};
use gomess_core::{PageRequest, User, UserId};
use serde::{Deserialize, Serialize};

use crate::auth::Authenticated;
use crate::errors::ApiError;
use crate::server::AppState;

/// Header carrying the unpaginated item count.
pub const TOTAL_COUNT_HEADER: HeaderName = HeaderName::from_static("x-total-count");

const DEFAULT_PAGE: u64 = 1;
const DEFAULT_LIMIT: u64 = 10;
const MAX_LIMIT: u64 = 100;

/// Raw `page`/`limit` query values. Anything unparseable falls back to the
/// defaults instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct PaginationQuery {
    page: Option<String>,
    limit: Option<String>,
}

impl PaginationQuery {
    /// Normalized page request.
    pub fn page_request(&self) -> PageRequest {
        let parse = |raw: Option<&str>| raw.and_then(|v| v.trim().parse::<u64>().ok());
        PageRequest {
            page: parse(self.page.as_deref()).unwrap_or(DEFAULT_PAGE).max(1),
            limit: parse(self.limit.as_deref())
                .unwrap_or(DEFAULT_LIMIT)
                .clamp(1, MAX_LIMIT),
        }
    }
}

/// Page metadata of a listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PaginationMeta {
    /// Total items across all pages.
    pub item_count: u64,
    /// Number of pages.
    pub total_pages: u64,
    /// Current page, 1-based.
    pub page: u64,
    /// Page size.
    pub limit: u64,
    /// Whether a later page exists.
    pub has_next: bool,
    /// Whether an earlier page exists.
    pub has_prev: bool,
}

impl PaginationMeta {
    /// Metadata for `page` of a listing with `total` items.
    pub fn new(total: u64, page: PageRequest) -> Self {
        let total_pages = total.div_ceil(page.limit.max(1));
        Self {
            item_count: total,
            total_pages,
            page: page.page,
            limit: page.limit,
            has_next: page.page < total_pages,
            has_prev: page.page > 1,
        }
    }
}

/// Listing envelope.
#[derive(Clone, Debug, Serialize)]
pub struct PaginatedResponse<T> {
    /// Items on this page.
    pub data: Vec<T>,
    /// Page metadata.
    pub meta: PaginationMeta,
}

/// GET /api/users
pub async fn list_users(
    State(state): State<AppState>,
    Authenticated(_identity): Authenticated,
    Query(query): Query<PaginationQuery>,
) -> Result<Response, ApiError> {
    let page = query.page_request();
    let (users, total) = state.users.list_users(page).await?;
    let body = PaginatedResponse {
        data: users,
        meta: PaginationMeta::new(total, page),
    };
    Ok(([(TOTAL_COUNT_HEADER, total.to_string())], Json(body)).into_response())
}

/// GET /api/users/me
pub async fn me(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.users.find_user(&identity.user_id).await?))
}

/// GET /api/users/{id}
pub async fn get_user(
    State(state): State<AppState>,
    Authenticated(_identity): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.users.find_user(&UserId::from(id)).await?))
}
