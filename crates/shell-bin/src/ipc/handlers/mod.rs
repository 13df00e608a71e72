//! IPC handler implementations.
//!
//! Handlers are thin: they validate params, then call into the vault, the
//! pending buffer, or the admin client.

pub mod account;
pub mod app;
pub mod health;
pub mod oauth;
pub mod secure_store;
pub mod window;

#[cfg(test)]
pub(crate) mod test_support {
    use shell_ipc::{IpcClient, IpcServer};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Serve `server` on a socket inside `dir` and return a client for it.
    pub async fn serve(server: IpcServer, dir: &TempDir) -> (Arc<IpcServer>, IpcClient) {
        let server = Arc::new(server);
        let listener = server.bind().unwrap();
        let running = server.clone();
        tokio::spawn(async move {
            let _ = running.serve(listener).await;
        });
        let client = IpcClient::new(dir.path().join("shell.sock"));
        (server, client)
    }
}
