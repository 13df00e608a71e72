//! Lumen shell host - the privileged process behind the desktop window.
//!
//! Owns the single-instance lock, receives `appscheme://` deep links, and
//! serves the IPC surface the UI process uses for secure storage, browser
//! launch, and account deletion.

mod app;
mod ipc;

use std::path::PathBuf;

use clap::Parser;
use shell_config_and_utils::{init_logging_in, Config, Paths, DEFAULT_LOG_LEVEL};

/// Lumen shell command-line interface.
#[derive(Parser)]
#[command(name = "lumen-shell")]
#[command(about = "Lumen desktop shell host")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "LUMEN_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    log_level: String,

    /// Base directory for runtime files (sockets, vault, logs, config). Defaults to ~/.lumen
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Launch arguments; the OS appends deep-link URLs here.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    init_logging_in(&paths, &cli.log_level);

    let config = Config::load(&paths)?;

    app::run_shell(config, paths, cli.args).await
}
