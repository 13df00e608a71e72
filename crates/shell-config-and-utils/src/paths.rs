//! File system paths for the shell.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Local socket the primary instance holds for its lifetime.
const INSTANCE_SOCKET_NAME: &str = "instance.sock";
/// Privileged IPC socket the UI process connects to.
const SHELL_SOCKET_NAME: &str = "shell.sock";
/// Secure token vault backing file.
const VAULT_FILE_NAME: &str = "secure-tokens.json";

/// Manages file system paths for the shell.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for runtime files (~/.lumen)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.lumen`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir().ok_or(CoreError::NoHomeDir)?;

        Ok(Self {
            base_dir: home.join(".lumen"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.lumen).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.lumen/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the single-instance socket path (~/.lumen/instance.sock).
    pub fn instance_socket_file(&self) -> PathBuf {
        self.base_dir.join(INSTANCE_SOCKET_NAME)
    }

    /// Get the privileged IPC socket path (~/.lumen/shell.sock).
    pub fn socket_file(&self) -> PathBuf {
        self.base_dir.join(SHELL_SOCKET_NAME)
    }

    /// Get the PID file path (~/.lumen/shell.pid).
    pub fn pid_file(&self) -> PathBuf {
        self.base_dir.join("shell.pid")
    }

    /// Get the secure token vault file path (~/.lumen/secure-tokens.json).
    pub fn vault_file(&self) -> PathBuf {
        self.base_dir.join(VAULT_FILE_NAME)
    }

    /// Get the logs directory (~/.lumen/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_with_base_dir() {
        let base = PathBuf::from("/tmp/test-lumen");
        let paths = Paths::with_base_dir(base.clone());

        assert_eq!(paths.base_dir(), &base);
        assert_eq!(paths.config_file(), base.join("config.json"));
        assert_eq!(paths.instance_socket_file(), base.join("instance.sock"));
        assert_eq!(paths.socket_file(), base.join("shell.sock"));
        assert_eq!(paths.pid_file(), base.join("shell.pid"));
        assert_eq!(paths.vault_file(), base.join("secure-tokens.json"));
        assert_eq!(paths.logs_dir(), base.join("logs"));
    }

    #[test]
    fn test_paths_default() {
        let paths = Paths::new().unwrap();
        let home = dirs::home_dir().unwrap();

        assert_eq!(paths.base_dir(), &home.join(".lumen"));
    }

    #[test]
    fn test_ensure_dirs_creates_directories() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("lumen");
        let paths = Paths::with_base_dir(base.clone());

        assert!(!base.exists());

        paths.ensure_dirs().unwrap();
        paths.ensure_dirs().unwrap();

        assert!(base.is_dir());
        assert!(paths.logs_dir().is_dir());
    }

    #[test]
    fn test_instance_and_ipc_sockets_differ() {
        let paths = Paths::with_base_dir(PathBuf::from("/x"));
        assert_ne!(paths.instance_socket_file(), paths.socket_file());
    }
}
