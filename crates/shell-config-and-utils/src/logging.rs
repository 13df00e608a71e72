//! Logging initialization for the shell.
//!
//! All shell processes share the observability crate's central JSONL stream
//! at `~/.lumen/logs/dev.jsonl`.

pub use observability::LogConfig;

use crate::Paths;

/// Service name used by the primary host process.
const SHELL_SERVICE_NAME: &str = "lumen-shell";

/// File name of the JSONL stream inside the logs directory.
const LOG_FILE_NAME: &str = "dev.jsonl";

/// Initialize logging with the JSONL stream under `paths`, so a shell run
/// with `--base-dir` keeps its logs next to its sockets.
///
/// ```ignore
/// init_logging_in(&paths, "info");
/// tracing::info!("Shell started");
/// ```
pub fn init_logging_in(paths: &Paths, level: &str) {
    observability::init_with_config(LogConfig {
        service_name: SHELL_SERVICE_NAME.into(),
        default_level: parse_level(level).to_string().to_ascii_lowercase(),
        log_path: Some(paths.logs_dir().join(LOG_FILE_NAME)),
        also_stderr: true,
    });
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_level_all_variants() {
        assert_eq!(parse_level("trace"), tracing::Level::TRACE);
        assert_eq!(parse_level("debug"), tracing::Level::DEBUG);
        assert_eq!(parse_level("info"), tracing::Level::INFO);
        assert_eq!(parse_level("warn"), tracing::Level::WARN);
        assert_eq!(parse_level("warning"), tracing::Level::WARN);
        assert_eq!(parse_level("error"), tracing::Level::ERROR);
    }

    #[test]
    fn parse_level_case_insensitive() {
        assert_eq!(parse_level("DEBUG"), tracing::Level::DEBUG);
        assert_eq!(parse_level("Warning"), tracing::Level::WARN);
    }

    #[test]
    fn parse_level_unknown_defaults_to_info() {
        assert_eq!(parse_level(""), tracing::Level::INFO);
        assert_eq!(parse_level("verbose"), tracing::Level::INFO);
    }

    #[test]
    fn level_display_is_a_valid_filter() {
        let filter = parse_level("warning").to_string().to_ascii_lowercase();
        assert_eq!(filter, "warn");
    }
}
