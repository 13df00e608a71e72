//! UI-side session of record for the Lumen shell.
//!
//! Consumes deep-link payloads pushed by the host, performs the exchange or
//! verification against the identity provider, and persists the resulting
//! session through the host's secure token vault.
//!
//! Session-changed listeners receive a [`FollowUpScheduler`] rather than the
//! manager. Refreshes and sign-ins are therefore always started outside the
//! notification path.

mod auth_fsm;
mod error;
mod events;
mod manager;
mod session;
mod storage;

pub use auth_fsm::{AuthMachine, AuthMachineInput, AuthMachineState, AuthState};
pub use error::{SessionError, SessionResult};
pub use events::{
    FollowUp, FollowUpScheduler, SessionEvent, SessionEventBus, DEFAULT_MAX_SUBSCRIBERS,
};
pub use manager::{
    oauth_redirect, password_reset_redirect, HandleOutcome, OAuthStart, SessionManager,
};
pub use session::Session;
pub use storage::{IpcSessionStorage, MemorySessionStorage, SessionStorage, DEFAULT_STORAGE_KEY};
