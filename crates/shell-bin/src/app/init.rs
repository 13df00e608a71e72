//! Shell host initialization.

use crate::app::{route_launch, route_url, wait_for_backend, ShellState};
use crate::app::{HEALTH_MAX_ATTEMPTS, HEALTH_POLL_INTERVAL};
use crate::ipc::register_handlers;
use deep_link::find_in_args;
use identity_client::AdminClient;
use scheme_registrar::{register_or_warn, SchemeRegistration};
use shell_config_and_utils::{Config, Paths};
use shell_ipc::IpcServer;
use shell_lifecycle::{acquire, InstanceRole, SecondInstance};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Service-level secret for the account-deletion cascade.
const SERVICE_ROLE_KEY_ENV: &str = "LUMEN_SUPABASE_SERVICE_ROLE_KEY";

/// Run the shell host.
///
/// A secondary instance forwards its launch to the primary and returns.
pub async fn run_shell(
    config: Config,
    paths: Paths,
    args: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    match SchemeRegistration::current() {
        Ok(registration) => {
            register_or_warn(&registration);
        }
        Err(e) => warn!(error = %e, "Could not describe URL scheme registration"),
    }

    let mut lock = match acquire(&paths)? {
        InstanceRole::Primary(lock) => lock,
        InstanceRole::Secondary(secondary) => {
            // Exit regardless; a lost link beats two running hosts.
            match secondary.forward(&SecondInstance::current()) {
                Ok(()) => info!("Forwarded launch to running instance"),
                Err(e) => error!(error = %e, "Failed to forward launch to running instance"),
            }
            return Ok(());
        }
    };
    // Accept forwarded launches now; they queue until the state exists.
    let mut launches = lock.listen()?;

    info!(
        supabase_url = %config.supabase_url,
        backend_port = ?config.backend_port,
        "Starting Lumen shell host"
    );

    let admin = build_admin_client(&config);
    let vault = shell_storage::open_vault(&paths)?;
    info!(
        encrypted = vault.is_encryption_available(),
        "Secure token vault opened"
    );

    if let Some(url) = config.backend_health_url() {
        wait_for_backend(&url, HEALTH_POLL_INTERVAL, HEALTH_MAX_ATTEMPTS).await?;
    }

    let state = ShellState::new(config, paths.clone(), vault, admin);

    if let Some(url) = find_in_args(&args) {
        route_url(&state, &url);
    }

    let launch_state = state.clone();
    tokio::spawn(async move {
        while let Some(launch) = launches.recv().await {
            route_launch(&launch_state, &launch);
        }
    });

    let ipc_server = Arc::new(IpcServer::new(paths.socket_file()));
    register_handlers(&ipc_server, state).await;

    let signal_server = ipc_server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received");
            signal_server.shutdown();
        }
    });

    info!(
        socket = %paths.socket_file().display(),
        "IPC server starting"
    );
    let server_result = ipc_server.run().await;

    drop(lock);
    info!("Shell host stopped");

    server_result.map_err(|e| e.into())
}

/// Build the admin client, then drop the secret from the environment so
/// no child process inherits it.
fn build_admin_client(config: &Config) -> Option<AdminClient> {
    let key = std::env::var(SERVICE_ROLE_KEY_ENV).ok();
    std::env::remove_var(SERVICE_ROLE_KEY_ENV);

    let Some(key) = key.filter(|k| !k.trim().is_empty()) else {
        warn!("No service key configured; account deletion is disabled");
        return None;
    };
    match AdminClient::new(&config.supabase_url, &key) {
        Ok(client) => Some(client),
        Err(e) => {
            warn!(error = %e, "Invalid admin client configuration; account deletion is disabled");
            None
        }
    }
}
