//! Session manager error types.

use identity_client::IdentityError;
use thiserror::Error;

/// Session manager error type.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Identity provider call failed
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Host IPC call failed
    #[error("Host IPC error: {0}")]
    Ipc(#[from] shell_ipc::IpcError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid state transition in the auth FSM
    #[error("Invalid auth state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Not signed in")]
    NotSignedIn,

    /// A password update outside a recovery session
    #[error("No password recovery in progress")]
    NotRecovering,

    /// The session has no e-mail to re-verify the password against
    #[error("Session has no e-mail address")]
    MissingEmail,

    /// Host refused or failed the account deletion
    #[error("Account deletion failed: {0}")]
    AccountDeletion(String),

    #[error("Too many session event subscribers (max {0})")]
    TooManySubscribers(usize),
}

impl SessionError {
    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Identity(e) => e.user_message(),
            SessionError::AccountDeletion(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type alias using SessionError.
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_errors_keep_provider_message() {
        let err = SessionError::from(IdentityError::InvalidCredentials(
            "Invalid login credentials".to_string(),
        ));
        assert_eq!(err.user_message(), "Invalid login credentials");
    }

    #[test]
    fn deletion_error_message_is_passed_through() {
        let err = SessionError::AccountDeletion("account deletion is not configured".to_string());
        assert_eq!(err.user_message(), "account deletion is not configured");
    }
}
