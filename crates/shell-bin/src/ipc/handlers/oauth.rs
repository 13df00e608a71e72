//! External browser launch.

use crate::app::ShellState;
use shell_ipc::{error_codes, IpcServer, Method, Response, UrlParams};
use tracing::{info, warn};
use url::Url;

/// Register `oauth.launch`.
///
/// Only `http` and `https` URLs are opened; anything else could hand the OS
/// a `file:` path or another app's scheme.
pub async fn register(server: &IpcServer, state: ShellState) {
    server
        .register_handler(Method::OAuthLaunch, move |req| {
            let browser = state.browser.clone();
            async move {
                let params: UrlParams = match req.params_as() {
                    Ok(p) => p,
                    Err(e) => {
                        return Response::error(
                            &req.id,
                            error_codes::INVALID_PARAMS,
                            &format!("Invalid params: {}", e),
                        )
                    }
                };

                let url = match Url::parse(&params.url) {
                    Ok(url) if matches!(url.scheme(), "http" | "https") => url,
                    Ok(url) => {
                        warn!(scheme = url.scheme(), "Refusing to open non-web URL");
                        return Response::error(
                            &req.id,
                            error_codes::INVALID_PARAMS,
                            "Only http and https URLs can be opened",
                        );
                    }
                    Err(e) => {
                        return Response::error(
                            &req.id,
                            error_codes::INVALID_PARAMS,
                            &format!("Invalid URL: {}", e),
                        )
                    }
                };

                let host = url.host_str().unwrap_or_default().to_string();
                let launched =
                    tokio::task::spawn_blocking(move || browser(url.as_str())).await;
                match launched {
                    Ok(Ok(())) => {
                        info!(host = %host, "Opened external browser");
                        Response::success(&req.id, serde_json::Value::Null)
                    }
                    Ok(Err(e)) => {
                        warn!(host = %host, error = %e, "Failed to open external browser");
                        Response::error(&req.id, error_codes::INTERNAL_ERROR, &e.to_string())
                    }
                    Err(e) => Response::error(&req.id, error_codes::INTERNAL_ERROR, &e.to_string()),
                }
            }
        })
        .await;

    info!("Registered oauth handlers");
}
