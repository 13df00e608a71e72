//! # Observability
//!
//! Centralized logging layer for the Lumen desktop shell.
//!
//! Every process of the shell (the privileged host, forwarding secondaries,
//! helper tools) calls `observability::init()` once at startup and then uses
//! plain `tracing` macros. Where the lines end up is decided here.
//!
//! ## Dev Mode
//!
//! All processes write structured JSONL to a single central file:
//! `~/.lumen/logs/dev.jsonl`
//!
//! ```text
//! tail -f ~/.lumen/logs/dev.jsonl | jq
//! ```
//!
//! Multiple processes append to the same file; each line is written and
//! flushed as one unit. A secondary instance forwarding a deep link therefore
//! shows up in the same stream as the primary that receives it.
//!
//! ## Redaction
//!
//! Structured fields whose name looks like a credential (`token`, `secret`,
//! `password`, `key`, ...) are replaced by `"[redacted]"` before a line is
//! written. Call sites should still avoid logging credential values.
//!
//! ## Usage
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init_with_config(observability::LogConfig {
//!         service_name: "lumen-shell".into(),
//!         default_level: "debug".into(),
//!         also_stderr: true,
//!         ..Default::default()
//!     });
//!     tracing::info!("shell started");
//! }
//! ```

#[cfg(feature = "dev")]
mod dev;

mod json_layer;

use std::path::PathBuf;

pub use json_layer::{is_sensitive_field, LogEntry, REDACTED};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the process (e.g., "lumen-shell", "lumen-forwarder").
    /// Included in every log line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional custom log file path.
    /// Defaults to `~/.lumen/logs/dev.jsonl` in dev mode.
    pub log_path: Option<PathBuf>,

    /// Also emit logs to stderr for immediate feedback.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize logging with default settings for the given service.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize logging with custom configuration.
///
/// Calling this more than once in a process is a no-op after the first call.
pub fn init_with_config(config: LogConfig) {
    #[cfg(feature = "dev")]
    {
        dev::init_dev_subscriber(&config);
    }

    #[cfg(not(feature = "dev"))]
    {
        use tracing_subscriber::util::SubscriberInitExt;
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.default_level)),
            )
            .with_target(true)
            .compact()
            .finish()
            .try_init();
    }
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.service_name, "unknown");
        assert_eq!(config.default_level, "info");
        assert!(config.log_path.is_none());
        assert!(!config.also_stderr);
    }
}
