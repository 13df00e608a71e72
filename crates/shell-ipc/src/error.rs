//! Errors seen by either end of the host socket.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The host answered with an error response.
    #[error("Remote error {code}: {message}")]
    Remote { code: i32, message: String },

    /// The host socket could not be reached.
    #[error("Socket error: {0}")]
    Socket(String),

    /// The host closed the connection before answering.
    #[error("Connection closed")]
    ConnectionClosed,
}

pub type IpcResult<T> = Result<T, IpcError>;
