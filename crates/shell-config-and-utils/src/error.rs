//! Errors from loading configuration and laying out the data directory.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid identity provider URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Malformed config file: {0}")]
    Json(#[from] serde_json::Error),

    /// No home directory to put `~/.lumen` under.
    #[error("Could not determine home directory")]
    NoHomeDir,
}

pub type CoreResult<T> = Result<T, CoreError>;
