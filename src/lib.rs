//! Token refresh and authenticated requests for the OurRoots clients.
//!
//! [`auth::AuthClient`] owns the signed-in session and collapses concurrent token
//! refreshes into one call to the identity provider. [`api::ApiClient`] attaches
//! the token to every backend request and recovers from an expired token once.

pub mod api;
pub mod auth;
pub mod common;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod notifications;
pub mod transport;

pub use api::{ApiClient, StaticToken, TokenSource};
pub use auth::{AuthClient, SessionStore, StandardizedUser};
pub use config::{AuthConfig, ConfigError};
pub use error::{AuthError, ErrorCategory, ErrorCode, Result};
pub use notifications::{NotificationCenter, NotificationKind};
