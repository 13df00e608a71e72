//! Authentication state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐  SessionRestored   ┌─────────────────┐
//! │    SignedOut    │ ─────────────────► │    SignedIn     │
//! └────────┬────────┘                    └──┬──────┬────┬──┘
//!          │ ExchangeStarted                │      │    │ RefreshStarted
//!          ▼                                │      │    ▼
//! ┌─────────────────┐  ExchangeSucceeded    │      │  ┌─────────────────┐
//! │   Exchanging    │ ──────────────────────┘      │  │   Refreshing    │
//! └────────┬────────┘                              │  └─────────────────┘
//!          │ RecoveryVerified                      │    RefreshSucceeded/Deferred/Failed
//!          ▼                                       │ SignOutRequested
//! ┌─────────────────┐  PasswordUpdated             ▼
//! │   Recovering    │ ──► SignedIn        ┌─────────────────┐
//! └─────────────────┘                     │   SigningOut    │ ── SignOutComplete ──► SignedOut
//!                                         └─────────────────┘
//! ```
//!
//! A failed exchange returns to `SignedOut`, or to `SignedIn` when a prior
//! session is still in memory (`ExchangeAbandoned`).

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub auth_machine(SignedOut)

    SignedOut => {
        ExchangeStarted => Exchanging,
        SessionRestored => SignedIn
    },
    Exchanging => {
        ExchangeSucceeded => SignedIn,
        // Recovery link verified; the session may only set a new password
        RecoveryVerified => Recovering,
        ExchangeFailed => SignedOut,
        ExchangeAbandoned => SignedIn
    },
    SignedIn => {
        ExchangeStarted => Exchanging,
        RefreshStarted => Refreshing,
        SignOutRequested => SigningOut
    },
    Refreshing => {
        RefreshSucceeded => SignedIn,
        // Transient failure; the session stays usable
        RefreshDeferred => SignedIn,
        RefreshFailed => SignedOut
    },
    Recovering => {
        PasswordUpdated => SignedIn,
        ExchangeStarted => Exchanging,
        SignOutRequested => SigningOut
    },
    SigningOut => {
        SignOutComplete => SignedOut
    }
}

pub use auth_machine::Input as AuthMachineInput;
pub use auth_machine::State as AuthMachineState;
pub use auth_machine::StateMachine as AuthMachine;

/// Authentication state for external consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    SignedOut,
    /// Exchanging a code, handoff, or verification link for a session.
    Exchanging,
    SignedIn,
    Refreshing,
    /// Signed in through a recovery link; only a password update is allowed.
    Recovering,
    SigningOut,
}

impl AuthState {
    /// Returns true if a usable session is held.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::SignedIn | AuthState::Recovering)
    }

    /// Returns true if the state is a transient/in-progress state.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuthState::Exchanging | AuthState::Refreshing | AuthState::SigningOut
        )
    }
}

impl From<&AuthMachineState> for AuthState {
    fn from(state: &AuthMachineState) -> Self {
        match state {
            AuthMachineState::SignedOut => AuthState::SignedOut,
            AuthMachineState::Exchanging => AuthState::Exchanging,
            AuthMachineState::SignedIn => AuthState::SignedIn,
            AuthMachineState::Refreshing => AuthState::Refreshing,
            AuthMachineState::Recovering => AuthState::Recovering,
            AuthMachineState::SigningOut => AuthState::SigningOut,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_signed_out() {
        let machine = AuthMachine::new();
        assert_eq!(*machine.state(), AuthMachineState::SignedOut);
    }

    #[test]
    fn test_exchange_flow() {
        let mut machine = AuthMachine::new();

        machine.consume(&AuthMachineInput::ExchangeStarted).unwrap();
        assert_eq!(*machine.state(), AuthMachineState::Exchanging);

        machine.consume(&AuthMachineInput::ExchangeSucceeded).unwrap();
        assert_eq!(*machine.state(), AuthMachineState::SignedIn);
    }

    #[test]
    fn test_failed_exchange_without_session_signs_out() {
        let mut machine = AuthMachine::new();
        machine.consume(&AuthMachineInput::ExchangeStarted).unwrap();
        machine.consume(&AuthMachineInput::ExchangeFailed).unwrap();
        assert_eq!(*machine.state(), AuthMachineState::SignedOut);
    }

    #[test]
    fn test_abandoned_exchange_keeps_prior_session() {
        let mut machine = AuthMachine::new();
        machine.consume(&AuthMachineInput::SessionRestored).unwrap();
        machine.consume(&AuthMachineInput::ExchangeStarted).unwrap();
        machine.consume(&AuthMachineInput::ExchangeAbandoned).unwrap();
        assert_eq!(*machine.state(), AuthMachineState::SignedIn);
    }

    #[test]
    fn test_recovery_only_allows_password_update_or_sign_out() {
        let mut machine = AuthMachine::new();
        machine.consume(&AuthMachineInput::ExchangeStarted).unwrap();
        machine.consume(&AuthMachineInput::RecoveryVerified).unwrap();
        assert_eq!(*machine.state(), AuthMachineState::Recovering);

        assert!(machine.consume(&AuthMachineInput::RefreshStarted).is_err());
        assert_eq!(*machine.state(), AuthMachineState::Recovering);

        machine.consume(&AuthMachineInput::PasswordUpdated).unwrap();
        assert_eq!(*machine.state(), AuthMachineState::SignedIn);
    }

    #[test]
    fn test_refresh_deferred_then_failure() {
        let mut machine = AuthMachine::new();
        machine.consume(&AuthMachineInput::SessionRestored).unwrap();
        machine.consume(&AuthMachineInput::RefreshStarted).unwrap();
        machine.consume(&AuthMachineInput::RefreshDeferred).unwrap();
        assert_eq!(*machine.state(), AuthMachineState::SignedIn);

        machine.consume(&AuthMachineInput::RefreshStarted).unwrap();
        machine.consume(&AuthMachineInput::RefreshFailed).unwrap();
        assert_eq!(*machine.state(), AuthMachineState::SignedOut);
    }

    #[test]
    fn test_sign_out_flow() {
        let mut machine = AuthMachine::new();
        machine.consume(&AuthMachineInput::SessionRestored).unwrap();
        machine.consume(&AuthMachineInput::SignOutRequested).unwrap();
        assert_eq!(*machine.state(), AuthMachineState::SigningOut);
        machine.consume(&AuthMachineInput::SignOutComplete).unwrap();
        assert_eq!(*machine.state(), AuthMachineState::SignedOut);
    }

    #[test]
    fn test_cannot_refresh_while_signed_out() {
        let mut machine = AuthMachine::new();
        assert!(machine.consume(&AuthMachineInput::RefreshStarted).is_err());
        assert!(machine.consume(&AuthMachineInput::SignOutRequested).is_err());
    }

    #[test]
    fn test_auth_state_classification() {
        assert!(AuthState::SignedIn.is_authenticated());
        assert!(AuthState::Recovering.is_authenticated());
        assert!(!AuthState::Refreshing.is_authenticated());
        assert!(AuthState::Exchanging.is_transient());
        assert!(!AuthState::SignedOut.is_transient());
    }

    #[test]
    fn test_auth_state_serialization() {
        let json = serde_json::to_string(&AuthState::SignedIn).unwrap();
        assert_eq!(json, "\"signed_in\"");
    }
}
