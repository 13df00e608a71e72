//! Single-instance coordination for the Lumen shell.
//!
//! The first process to bind `~/.lumen/instance.sock` becomes the primary and
//! holds the socket for its lifetime. Any later process finds the socket
//! live, becomes a secondary, sends its argument list to the primary as one
//! JSON line, and exits.

#[cfg(not(unix))]
compile_error!("the Lumen shell host runs on Unix (macOS, Linux) only");

mod forward;
mod pid;

pub use forward::{SecondInstance, FORWARD_TIMEOUT};
use pid::{cleanup_pid_file, write_pid_file};

use shell_config_and_utils::Paths;
use std::io::ErrorKind;
use std::os::unix::net::{UnixListener as StdUnixListener, UnixStream as StdUnixStream};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Bind attempts before giving up on a contended socket.
const ACQUIRE_ATTEMPTS: usize = 3;

/// Capacity of the second-instance event channel.
const SECOND_INSTANCE_CHANNEL: usize = 16;

/// Errors from lifecycle management.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Instance socket kept changing hands after {0} attempts")]
    Contended(usize),
    #[error("Primary did not acknowledge the forwarded launch")]
    NotAcknowledged,
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Lock is already listening")]
    AlreadyListening,
}

/// Outcome of [`acquire`].
#[derive(Debug)]
pub enum InstanceRole {
    /// This process owns the instance lock.
    Primary(InstanceLock),
    /// Another process owns it; forward and exit.
    Secondary(SecondaryInstance),
}

/// Held by the primary for the process lifetime.
///
/// Dropping it removes the socket and PID files.
#[derive(Debug)]
pub struct InstanceLock {
    listener: Option<StdUnixListener>,
    socket_path: PathBuf,
    pid_path: PathBuf,
}

/// Connection to the primary, used once to forward a launch.
#[derive(Debug)]
pub struct SecondaryInstance {
    stream: StdUnixStream,
}

/// Take the instance lock or connect to its current holder.
///
/// A socket file nobody listens on is treated as left over from a crash:
/// it is removed and binding is retried.
pub fn acquire(paths: &Paths) -> Result<InstanceRole, LifecycleError> {
    paths
        .ensure_dirs()
        .map_err(|e| LifecycleError::Io(std::io::Error::other(e.to_string())))?;
    acquire_at(&paths.instance_socket_file(), &paths.pid_file())
}

/// [`acquire`] with explicit file locations.
pub fn acquire_at(socket_path: &Path, pid_path: &Path) -> Result<InstanceRole, LifecycleError> {
    for attempt in 1..=ACQUIRE_ATTEMPTS {
        match StdUnixListener::bind(socket_path) {
            Ok(listener) => {
                listener.set_nonblocking(true)?;
                let pid = write_pid_file(pid_path)?;
                info!(pid, socket = %socket_path.display(), "Acquired instance lock");
                return Ok(InstanceRole::Primary(InstanceLock {
                    listener: Some(listener),
                    socket_path: socket_path.to_path_buf(),
                    pid_path: pid_path.to_path_buf(),
                }));
            }
            Err(e) if e.kind() == ErrorKind::AddrInUse => match StdUnixStream::connect(socket_path) {
                Ok(stream) => {
                    info!(socket = %socket_path.display(), "Another instance is running");
                    return Ok(InstanceRole::Secondary(SecondaryInstance { stream }));
                }
                Err(connect_err) => {
                    warn!(
                        attempt,
                        error = %connect_err,
                        "Instance socket is stale, removing"
                    );
                    remove_if_exists(socket_path)?;
                }
            },
            Err(e) => return Err(e.into()),
        }
    }
    Err(LifecycleError::Contended(ACQUIRE_ATTEMPTS))
}

impl InstanceLock {
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Start accepting forwarded launches.
    ///
    /// Must be called inside a tokio runtime, and as early as possible:
    /// secondaries stop waiting for an ack after [`FORWARD_TIMEOUT`]. Each
    /// well-formed launch is yielded on the returned channel, including
    /// launches that carried no URL and launches whose sender already gave
    /// up on the ack.
    pub fn listen(&mut self) -> Result<mpsc::Receiver<SecondInstance>, LifecycleError> {
        let std_listener = self
            .listener
            .take()
            .ok_or(LifecycleError::AlreadyListening)?;
        let listener = tokio::net::UnixListener::from_std(std_listener)?;
        let (tx, rx) = mpsc::channel(SECOND_INSTANCE_CHANNEL);

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        let tx = tx.clone();
                        tokio::spawn(async move {
                            match forward::receive_launch(stream).await {
                                Ok(Some(launch)) => {
                                    debug!(args = launch.args.len(), "Second instance observed");
                                    let _ = tx.send(launch).await;
                                }
                                Ok(None) => debug!("Instance socket connection closed without a launch"),
                                Err(e) => warn!(error = %e, "Malformed second-instance message"),
                            }
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "Instance socket accept failed");
                        break;
                    }
                }
                if tx.is_closed() {
                    break;
                }
            }
        });

        Ok(rx)
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
        let _ = cleanup_pid_file(&self.pid_path);
        debug!("Released instance lock");
    }
}

impl SecondaryInstance {
    /// Send this process's launch to the primary and wait for its ack.
    pub fn forward(self, launch: &SecondInstance) -> Result<(), LifecycleError> {
        forward::send_launch(self.stream, launch)
    }
}

fn remove_if_exists(path: &Path) -> Result<(), LifecycleError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
