//! Application info handlers.

use crate::app::ShellState;
use shell_ipc::{IpcServer, Method, Response};
use tracing::info;

/// Register `app.version` and `app.backend-port`.
pub async fn register(server: &IpcServer, state: ShellState) {
    server
        .register_handler(Method::AppVersion, |req| async move {
            Response::success(&req.id, serde_json::json!(env!("CARGO_PKG_VERSION")))
        })
        .await;

    server
        .register_handler(Method::AppBackendPort, move |req| {
            let port = state.config.backend_port;
            async move { Response::success(&req.id, serde_json::json!(port)) }
        })
        .await;

    info!("Registered app handlers");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::state::test_support::test_state;
    use crate::ipc::handlers::test_support::serve;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn reports_version_and_port() {
        let dir = TempDir::new().unwrap();
        let mut state = test_state(&dir);
        let mut config = (*state.config).clone();
        config.backend_port = Some(3100);
        state.config = Arc::new(config);

        let server = IpcServer::new(dir.path().join("shell.sock"));
        register(&server, state).await;
        let (_server, client) = serve(server, &dir).await;

        let version: String = client.request(Method::AppVersion, None).await.unwrap();
        assert_eq!(version, env!("CARGO_PKG_VERSION"));
        let port: Option<u16> = client.request(Method::AppBackendPort, None).await.unwrap();
        assert_eq!(port, Some(3100));
    }

    #[tokio::test]
    async fn missing_port_is_null() {
        let dir = TempDir::new().unwrap();
        let server = IpcServer::new(dir.path().join("shell.sock"));
        register(&server, test_state(&dir)).await;
        let (_server, client) = serve(server, &dir).await;

        let port: Option<u16> = client.request(Method::AppBackendPort, None).await.unwrap();
        assert_eq!(port, None);
    }
}
