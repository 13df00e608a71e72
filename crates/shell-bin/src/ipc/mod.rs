//! IPC surface exposed to the UI process.

pub mod handlers;
mod register;

pub use register::register_handlers;
