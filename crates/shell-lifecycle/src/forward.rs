//! Wire format between a secondary and the primary.
//!
//! The secondary writes one JSON line describing its launch; the primary
//! answers with `{"ok":true}` once the line is parsed.

use crate::LifecycleError;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream as StdUnixStream;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader as AsyncBufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::UnixStream;
use tracing::warn;

/// How long a secondary waits for the primary to acknowledge.
pub const FORWARD_TIMEOUT: Duration = Duration::from_secs(2);

/// A launch observed by the primary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondInstance {
    /// Full argument list of the secondary, including argv[0].
    pub args: Vec<String>,
    /// Working directory of the secondary.
    #[serde(default)]
    pub cwd: Option<String>,
}

impl SecondInstance {
    /// Describe the current process.
    pub fn current() -> Self {
        Self {
            args: std::env::args().collect(),
            cwd: std::env::current_dir()
                .ok()
                .map(|p| p.to_string_lossy().into_owned()),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Ack {
    ok: bool,
}

pub(crate) fn send_launch(
    mut stream: StdUnixStream,
    launch: &SecondInstance,
) -> Result<(), LifecycleError> {
    stream.set_write_timeout(Some(FORWARD_TIMEOUT))?;
    stream.set_read_timeout(Some(FORWARD_TIMEOUT))?;

    let mut line = serde_json::to_string(launch)?;
    line.push('\n');
    stream.write_all(line.as_bytes())?;
    stream.flush()?;

    let mut reader = BufReader::new(stream);
    let mut response = String::new();
    reader.read_line(&mut response)?;
    match serde_json::from_str::<Ack>(response.trim()) {
        Ok(Ack { ok: true }) => Ok(()),
        _ => Err(LifecycleError::NotAcknowledged),
    }
}

/// Read one launch from a connection. `Ok(None)` means the peer closed
/// without sending anything.
pub(crate) async fn receive_launch(
    stream: UnixStream,
) -> Result<Option<SecondInstance>, LifecycleError> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = AsyncBufReader::new(reader);
    let mut line = String::new();

    let read = reader.read_line(&mut line).await?;
    if read == 0 || line.trim().is_empty() {
        return Ok(None);
    }

    let launch: SecondInstance = serde_json::from_str(line.trim())?;
    // The launch is kept even if the secondary gave up waiting.
    if let Err(e) = write_ack(&mut writer).await {
        warn!(error = %e, "Could not acknowledge forwarded launch");
    }
    Ok(Some(launch))
}

async fn write_ack(writer: &mut OwnedWriteHalf) -> Result<(), LifecycleError> {
    let mut ack = serde_json::to_string(&Ack { ok: true })?;
    ack.push('\n');
    writer.write_all(ack.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
