//! Health handler.

use shell_ipc::{HealthResult, IpcServer, Method, Response};
use tracing::info;

/// Register the health handler.
pub async fn register(server: &IpcServer) {
    server
        .register_handler(Method::Health, |req| async move {
            let result = HealthResult {
                status: "ok".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            };
            match serde_json::to_value(result) {
                Ok(value) => Response::success(&req.id, value),
                Err(e) => Response::error(
                    &req.id,
                    shell_ipc::error_codes::INTERNAL_ERROR,
                    &e.to_string(),
                ),
            }
        })
        .await;

    info!("Registered health handlers");
}
