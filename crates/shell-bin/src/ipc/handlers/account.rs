//! Account deletion, the one operation that needs the service key.

use crate::app::ShellState;
use shell_ipc::{
    error_codes, AccountDeleteParams, AccountDeleteResult, IpcServer, Method, Response,
};
use tracing::{info, warn};
use uuid::Uuid;

/// Register `account.delete`.
///
/// Cascade failures are reported as `{success: false, error}` inside a
/// successful response; only malformed params produce an error response.
/// `user_id` must be a UUID, since it ends up in service-key requests.
pub async fn register(server: &IpcServer, state: ShellState) {
    server
        .register_handler(Method::AccountDelete, move |req| {
            let admin = state.admin.clone();
            async move {
                let params: AccountDeleteParams = match req.params_as() {
                    Ok(p) => p,
                    Err(e) => {
                        return Response::error(
                            &req.id,
                            error_codes::INVALID_PARAMS,
                            &format!("Invalid params: {}", e),
                        )
                    }
                };
                let user_id = match Uuid::parse_str(params.user_id.trim()) {
                    Ok(id) => id.to_string(),
                    Err(e) => {
                        warn!(error = %e, "account.delete with a malformed user_id");
                        return Response::error(
                            &req.id,
                            error_codes::INVALID_PARAMS,
                            "user_id must be a UUID",
                        );
                    }
                };

                let result = match admin {
                    Some(admin) => match admin.delete_account(&user_id).await {
                        Ok(steps) => {
                            info!(user_id = %user_id, steps = steps.len(), "Account deleted");
                            AccountDeleteResult::ok()
                        }
                        Err(e) => AccountDeleteResult::failed(e.to_string()),
                    },
                    None => {
                        warn!("account.delete called without a service key");
                        AccountDeleteResult::failed("account deletion is not configured")
                    }
                };

                match serde_json::to_value(result) {
                    Ok(value) => Response::success(&req.id, value),
                    Err(e) => {
                        Response::error(&req.id, error_codes::INTERNAL_ERROR, &e.to_string())
                    }
                }
            }
        })
        .await;

    info!("Registered account handlers");
}
