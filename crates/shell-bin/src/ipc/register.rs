//! Handler registration for the IPC server.

use crate::app::ShellState;
use crate::ipc::handlers;
use shell_ipc::IpcServer;
use tracing::info;

/// Register all IPC handlers.
pub async fn register_handlers(server: &IpcServer, state: ShellState) {
    handlers::health::register(server).await;
    handlers::app::register(server, state.clone()).await;
    handlers::secure_store::register(server, state.clone()).await;
    handlers::oauth::register(server, state.clone()).await;
    handlers::account::register(server, state.clone()).await;
    handlers::window::register(server, state).await;

    info!("All IPC handlers registered");
}
