//! Privileged IPC surface between the Lumen host process and its UI.
//!
//! This crate provides:
//! - Unix domain socket server with per-method handlers
//! - JSON-RPC-like request/response protocol (NDJSON)
//! - Push streams: a `window.ready` connection stays open and receives
//!   host-to-UI pushes
//! - A client for the UI side

#[cfg(not(unix))]
compile_error!("the Lumen IPC surface needs Unix domain sockets");

mod client;
mod error;
mod protocol;
mod server;

pub use client::{IpcClient, PushStream};
pub use error::{IpcError, IpcResult};
pub use protocol::{
    error_codes, AccountDeleteParams, AccountDeleteResult, ErrorInfo, HealthResult, KeyParams,
    Method, Push, PushType, Request, Response, SetParams, UrlParams, WindowReadyResult,
};
pub use server::{HandlerFn, IpcServer, PushSubscription, StreamEndFn, StreamHandlerFn, StreamOpen};
