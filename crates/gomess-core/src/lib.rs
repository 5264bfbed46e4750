//! # gomess-core
//!
//! Foundation types shared by every GoMess crate:
//!
//! - **Branded IDs**: `ConnectionId`, `UserId`, `SessionId` as newtypes
//! - **Errors**: the gateway error taxonomy and stable user-visible [`ErrorCode`]s
//! - **Identity**: verified [`Claims`] and the [`AuthenticatedIdentity`] derived from them
//! - **Capabilities**: the [`Clock`] and [`UserDirectory`] seams consumed from collaborators
//! - **Logging**: `tracing` subscriber setup and a log-capture test utility

#![deny(unsafe_code)]

pub mod capabilities;
pub mod errors;
pub mod identity;
pub mod ids;
pub mod logging;

pub use capabilities::{
    Clock, InMemoryUserDirectory, LookupError, ManualClock, PageRequest, SystemClock, User,
    UserDirectory,
};
pub use errors::{AuthError, ErrorCode, LifecycleFault, RegistryConflict, TransportError};
pub use identity::{Audience, AuthenticatedIdentity, Claims};
pub use ids::{ConnectionId, SessionId, UserId};
