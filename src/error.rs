use std::fmt;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error codes for programmatic handling of auth and request failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// No usable session; an interactive login is needed
    LoginRequired,
    /// The backend answered with a non-success status
    HttpStatus,
    /// The backend rejected an edit because the item changed underneath it (409)
    EditConflict,
    /// The request never produced a response
    TransportFailed,
    /// A response arrived but its body could not be decoded
    DecodeFailed,
    /// The identity provider rejected or failed an operation
    IdentityFailed,
    /// Session storage could not be read or written
    StorageFailed,
    /// Configuration is missing or invalid
    ConfigInvalid,
    /// The auth client was used before `init` completed
    NotLoaded,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::LoginRequired => write!(f, "LOGIN_REQUIRED"),
            ErrorCode::HttpStatus => write!(f, "HTTP_STATUS"),
            ErrorCode::EditConflict => write!(f, "EDIT_CONFLICT"),
            ErrorCode::TransportFailed => write!(f, "TRANSPORT_FAILED"),
            ErrorCode::DecodeFailed => write!(f, "DECODE_FAILED"),
            ErrorCode::IdentityFailed => write!(f, "IDENTITY_FAILED"),
            ErrorCode::StorageFailed => write!(f, "STORAGE_FAILED"),
            ErrorCode::ConfigInvalid => write!(f, "CONFIG_INVALID"),
            ErrorCode::NotLoaded => write!(f, "NOT_LOADED"),
        }
    }
}

/// Error categories for different recovery strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Temporary network issues, timeouts, etc. - usually retryable
    Network,
    /// Authentication failures that might be fixed by a token refresh or a login
    Authentication,
    /// Concurrent modification of the same resource
    Conflict,
    /// Backend returned a 5xx - retryable for idempotent requests
    ServiceUnavailable,
    /// Configuration errors - not retryable without reconfiguration
    Configuration,
    /// Internal errors in our code or storage - generally not retryable
    Internal,
    /// Any other 4xx - not retryable without input changes
    Client,
}

impl ErrorCategory {
    /// Returns true if errors in this category are generally retryable at the transport layer
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network | Self::ServiceUnavailable => true,
            Self::Authentication
            | Self::Conflict
            | Self::Configuration
            | Self::Internal
            | Self::Client => false,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Network => write!(f, "Network"),
            ErrorCategory::Authentication => write!(f, "Authentication"),
            ErrorCategory::Conflict => write!(f, "Conflict"),
            ErrorCategory::ServiceUnavailable => write!(f, "ServiceUnavailable"),
            ErrorCategory::Configuration => write!(f, "Configuration"),
            ErrorCategory::Internal => write!(f, "Internal"),
            ErrorCategory::Client => write!(f, "Client"),
        }
    }
}

/// Errors surfaced by the auth client and the request pipeline.
///
/// `LoginRequired` is the only auth failure callers ever need to handle: every
/// failure on the refresh path is folded into it. Check for it with
/// [`AuthError::is_login_required`] or by matching on [`AuthError::code`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Login Required")]
    LoginRequired,

    #[error("Request failed with status {status}")]
    Status { status: StatusCode, body: String },

    #[error("Request failed: {reason}")]
    Transport { reason: String },

    #[error("Invalid response body: {reason}")]
    Decode { reason: String },

    #[error("Identity provider error: {reason}")]
    Identity { reason: String },

    #[error("Session storage error: {reason}")]
    Storage { reason: String },

    #[error("Configuration error: {reason}")]
    Config { reason: String },

    #[error("Auth client has not finished loading")]
    NotLoaded,
}

impl AuthError {
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    pub fn identity(reason: impl Into<String>) -> Self {
        Self::Identity {
            reason: reason.into(),
        }
    }

    pub fn storage(reason: impl Into<String>) -> Self {
        Self::Storage {
            reason: reason.into(),
        }
    }

    /// Discriminated kind of this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::LoginRequired => ErrorCode::LoginRequired,
            Self::Status { status, .. } if *status == StatusCode::CONFLICT => {
                ErrorCode::EditConflict
            }
            Self::Status { .. } => ErrorCode::HttpStatus,
            Self::Transport { .. } => ErrorCode::TransportFailed,
            Self::Decode { .. } => ErrorCode::DecodeFailed,
            Self::Identity { .. } => ErrorCode::IdentityFailed,
            Self::Storage { .. } => ErrorCode::StorageFailed,
            Self::Config { .. } => ErrorCode::ConfigInvalid,
            Self::NotLoaded => ErrorCode::NotLoaded,
        }
    }

    /// Category used to pick a recovery strategy
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::LoginRequired | Self::Identity { .. } => ErrorCategory::Authentication,
            Self::Status { status, .. } => {
                if *status == StatusCode::UNAUTHORIZED {
                    ErrorCategory::Authentication
                } else if *status == StatusCode::CONFLICT {
                    ErrorCategory::Conflict
                } else if status.is_server_error() {
                    ErrorCategory::ServiceUnavailable
                } else {
                    ErrorCategory::Client
                }
            }
            Self::Transport { .. } => ErrorCategory::Network,
            Self::Config { .. } => ErrorCategory::Configuration,
            Self::Decode { .. } | Self::Storage { .. } | Self::NotLoaded => {
                ErrorCategory::Internal
            }
        }
    }

    pub fn is_login_required(&self) -> bool {
        matches!(self, Self::LoginRequired)
    }

    pub fn is_edit_conflict(&self) -> bool {
        self.code() == ErrorCode::EditConflict
    }

    /// HTTP status, when the error came from a backend response
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<crate::config::ConfigError> for AuthError {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::Config {
            reason: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
