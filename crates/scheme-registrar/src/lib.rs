//! URL scheme registration.
//!
//! Associates `appscheme://` with the running executable so the OS launches
//! (or forwards to) the shell when a browser opens such a link:
//! - **Linux**: a `.desktop` entry plus `xdg-mime default`
//! - **macOS**: `LSSetDefaultHandlerForURLScheme` for the bundle id
//!
//! Registration runs on every launch and is idempotent. Failure only
//! degrades deep-link delivery, so the host calls [`register_or_warn`].

mod desktop_entry;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "macos")]
mod macos;

pub use desktop_entry::{write_if_changed, DesktopEntry};

use shell_config_and_utils::{APP_ID, APP_NAME, URL_SCHEME};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum RegistrarError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command `{command}` failed: {detail}")]
    CommandFailed { command: String, detail: String },

    #[error("Platform error: {0}")]
    Platform(String),
}

pub type RegistrarResult<T> = Result<T, RegistrarError>;

/// What to register.
#[derive(Debug, Clone)]
pub struct SchemeRegistration {
    pub scheme: String,
    pub app_id: String,
    pub app_name: String,
    pub exe: PathBuf,
}

impl SchemeRegistration {
    /// Registration of the shell's own scheme for `exe`.
    pub fn for_exe(exe: PathBuf) -> Self {
        Self {
            scheme: URL_SCHEME.to_string(),
            app_id: APP_ID.to_string(),
            app_name: APP_NAME.to_string(),
            exe,
        }
    }

    /// Registration of the shell's own scheme for the running executable.
    pub fn current() -> RegistrarResult<Self> {
        Ok(Self::for_exe(std::env::current_exe()?))
    }
}

/// Outcome of a registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Handler written or changed.
    Registered,
    /// The OS already pointed at this executable.
    AlreadyCurrent,
    /// No registration mechanism on this platform.
    Unsupported,
}

/// Register `registration` with the OS.
pub fn register(registration: &SchemeRegistration) -> RegistrarResult<Registration> {
    #[cfg(target_os = "linux")]
    {
        linux::register(registration)
    }

    #[cfg(target_os = "macos")]
    {
        macos::register(registration)
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        let _ = registration;
        Ok(Registration::Unsupported)
    }
}

/// Register and log the outcome. Never fails.
pub fn register_or_warn(registration: &SchemeRegistration) -> Option<Registration> {
    match register(registration) {
        Ok(outcome) => {
            info!(
                scheme = %registration.scheme,
                outcome = ?outcome,
                "URL scheme registration"
            );
            Some(outcome)
        }
        Err(e) => {
            warn!(
                scheme = %registration.scheme,
                error = %e,
                "URL scheme registration failed; deep links may not reach the app"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_exe_uses_app_identity() {
        let reg = SchemeRegistration::for_exe(PathBuf::from("/opt/lumen/lumen"));
        assert_eq!(reg.scheme, "appscheme");
        assert_eq!(reg.app_id, "com.lumen.desktop");
        assert_eq!(reg.app_name, "Lumen");
    }

    #[test]
    fn current_resolves_test_binary() {
        let reg = SchemeRegistration::current().unwrap();
        assert!(reg.exe.is_absolute());
    }
}
