//! Dev-mode logging configuration.
//!
//! Writes structured JSONL logs to a central file shared by every shell
//! process. Multi-process safe via append-only semantics.

use crate::json_layer::JsonLayer;
use crate::LogConfig;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Central log file location, `~/.lumen/logs/dev.jsonl`.
/// Falls back to the temp dir when no home directory can be resolved.
fn default_log_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".lumen")
        .join("logs")
        .join("dev.jsonl")
}

/// Filter from `RUST_LOG`, falling back to the configured level.
fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Append-only file writer shared by all layers of one process.
#[derive(Clone)]
pub struct CentralLogWriter {
    inner: Arc<Mutex<BufWriter<File>>>,
}

impl CentralLogWriter {
    pub fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            inner: Arc::new(Mutex::new(BufWriter::with_capacity(8192, file))),
        })
    }
}

impl io::Write for CentralLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.inner.lock();
        let result = guard.write(buf);
        // Flush per line so other processes see complete lines.
        guard.flush()?;
        result
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

#[derive(Clone)]
pub struct WriterFactory {
    writer: CentralLogWriter,
}

impl<'a> MakeWriter<'a> for WriterFactory {
    type Writer = CentralLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.writer.clone()
    }
}

/// Install the dev subscriber: JSONL file layer plus optional stderr layer.
///
/// If the log file cannot be opened the process still gets stderr logging;
/// a logging failure must never keep the shell from starting.
pub fn init_dev_subscriber(config: &LogConfig) {
    let log_path = config.log_path.clone().unwrap_or_else(default_log_path);

    let json_layer = match CentralLogWriter::new(&log_path) {
        Ok(writer) => Some(
            JsonLayer::new(config.service_name.clone(), WriterFactory { writer })
                .with_filter(env_filter(&config.default_level)),
        ),
        Err(e) => {
            eprintln!("failed to open log file {}: {}", log_path.display(), e);
            None
        }
    };
    let file_enabled = json_layer.is_some();

    let stderr_layer = if config.also_stderr || !file_enabled {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_writer(io::stderr)
                .with_ansi(true)
                .with_filter(env_filter(&config.default_level)),
        )
    } else {
        None
    };

    let installed = tracing_subscriber::registry()
        .with(json_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if installed && file_enabled {
        tracing::info!(
            log_path = %log_path.display(),
            service = %config.service_name,
            "observability initialized"
        );
    }
}
