//! Error types for deep-link delivery.

use thiserror::Error;

/// Failure reported by a [`crate::DeepLinkReceiver`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The receiving window went away; the payload was not consumed.
    #[error("Receiver closed")]
    Closed,
}

/// Errors from the pending buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("A receiver is already registered")]
    AlreadyRegistered,
}
