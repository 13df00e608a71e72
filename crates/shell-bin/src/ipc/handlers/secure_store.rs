//! Secure token vault handlers.
//!
//! Vault access touches the keychain and the disk, so every call runs under
//! `spawn_blocking`. Values never reach the logs.

use crate::app::ShellState;
use shell_ipc::{error_codes, IpcServer, KeyParams, Method, Request, Response, SetParams};
use tracing::{debug, info, warn};

/// Register `secure-store.get`, `secure-store.set`, and `secure-store.remove`.
pub async fn register(server: &IpcServer, state: ShellState) {
    let get_state = state.clone();
    server
        .register_handler(Method::SecureStoreGet, move |req| {
            let vault = get_state.vault.clone();
            async move {
                let params: KeyParams = match params(&req) {
                    Ok(p) => p,
                    Err(response) => return response,
                };
                let key = params.key.clone();
                match tokio::task::spawn_blocking(move || vault.get(&params.key)).await {
                    Ok(value) => {
                        debug!(key = %key, found = value.is_some(), "secure-store.get");
                        Response::success(&req.id, serde_json::json!(value))
                    }
                    Err(e) => internal_error(&req, "secure-store.get", e),
                }
            }
        })
        .await;

    let set_state = state.clone();
    server
        .register_handler(Method::SecureStoreSet, move |req| {
            let vault = set_state.vault.clone();
            async move {
                let params: SetParams = match params(&req) {
                    Ok(p) => p,
                    Err(response) => return response,
                };
                let result =
                    tokio::task::spawn_blocking(move || vault.set(&params.key, &params.value))
                        .await;
                match result {
                    Ok(Ok(())) => Response::success(&req.id, serde_json::Value::Null),
                    Ok(Err(e)) => internal_error(&req, "secure-store.set", e),
                    Err(e) => internal_error(&req, "secure-store.set", e),
                }
            }
        })
        .await;

    server
        .register_handler(Method::SecureStoreRemove, move |req| {
            let vault = state.vault.clone();
            async move {
                let params: KeyParams = match params(&req) {
                    Ok(p) => p,
                    Err(response) => return response,
                };
                match tokio::task::spawn_blocking(move || vault.remove(&params.key)).await {
                    Ok(Ok(_)) => Response::success(&req.id, serde_json::Value::Null),
                    Ok(Err(e)) => internal_error(&req, "secure-store.remove", e),
                    Err(e) => internal_error(&req, "secure-store.remove", e),
                }
            }
        })
        .await;

    info!("Registered secure-store handlers");
}

fn params<T: serde::de::DeserializeOwned>(req: &Request) -> Result<T, Response> {
    req.params_as().map_err(|e| {
        Response::error(
            &req.id,
            error_codes::INVALID_PARAMS,
            &format!("Invalid params: {}", e),
        )
    })
}

fn internal_error(req: &Request, method: &str, e: impl std::fmt::Display) -> Response {
    warn!(method, error = %e, "Secure store operation failed");
    Response::error(&req.id, error_codes::INTERNAL_ERROR, &e.to_string())
}
