//! Startup gate on the application backend's health endpoint.

use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Delay between health checks.
pub const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Checks before startup fails.
pub const HEALTH_MAX_ATTEMPTS: u32 = 60;

/// Per-check request timeout.
const CHECK_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
#[error("Backend at {url} not healthy after {attempts} attempts")]
pub struct BackendUnavailable {
    pub url: String,
    pub attempts: u32,
}

/// Poll `url` until it answers 200, returning the attempt that succeeded.
pub async fn wait_for_backend(
    url: &str,
    interval: Duration,
    max_attempts: u32,
) -> Result<u32, BackendUnavailable> {
    let unavailable = || BackendUnavailable {
        url: url.to_string(),
        attempts: max_attempts,
    };
    let client = reqwest::Client::builder()
        .timeout(CHECK_TIMEOUT)
        .build()
        .map_err(|e| {
            warn!(error = %e, "Failed to build health check client");
            unavailable()
        })?;

    for attempt in 1..=max_attempts {
        match client.get(url).send().await {
            Ok(response) if response.status() == reqwest::StatusCode::OK => {
                info!(url = %url, attempt, "Backend is healthy");
                return Ok(attempt);
            }
            Ok(response) => {
                debug!(url = %url, attempt, status = %response.status(), "Backend not ready");
            }
            Err(e) => {
                debug!(url = %url, attempt, error = %e, "Backend unreachable");
            }
        }
        if attempt < max_attempts {
            tokio::time::sleep(interval).await;
        }
    }

    warn!(url = %url, attempts = max_attempts, "Backend never became healthy");
    Err(unavailable())
}
