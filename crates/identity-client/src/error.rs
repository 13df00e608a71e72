//! Identity provider error types.

use thiserror::Error;

/// Identity provider error type.
#[derive(Error, Debug)]
pub enum IdentityError {
    /// Invalid email or password
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The provider answered with a non-success status.
    #[error("Identity provider returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Missing URL or key
    #[error("Not configured: {0}")]
    NotConfigured(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,
}

impl IdentityError {
    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Transient errors are timeouts, connection failures, and 5xx/429
    /// responses.
    pub fn is_transient(&self) -> bool {
        match self {
            IdentityError::Timeout => true,
            IdentityError::Api { status, .. } => *status >= 500 || *status == 429,
            IdentityError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            _ => false,
        }
    }

    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            IdentityError::InvalidCredentials(message) | IdentityError::Api { message, .. } => {
                message.clone()
            }
            IdentityError::Http(_) | IdentityError::Timeout => {
                "Could not reach the sign-in service".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Result type alias using IdentityError.
pub type IdentityResult<T> = Result<T, IdentityError>;
