//! IPC client for the UI side of the shell socket.

use crate::{IpcError, IpcResult, Method, Push, Request, Response, WindowReadyResult};
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tracing::warn;

/// IPC client for connecting to the shell host.
#[derive(Debug, Clone)]
pub struct IpcClient {
    socket_path: PathBuf,
}

impl IpcClient {
    /// Create a new IPC client.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    async fn connect(&self) -> IpcResult<(BufReader<OwnedReadHalf>, OwnedWriteHalf)> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| IpcError::Socket(format!("Failed to connect: {}", e)))?;
        let (reader, writer) = stream.into_split();
        Ok((BufReader::new(reader), writer))
    }

    /// Send a request and wait for response.
    pub async fn call(&self, request: Request) -> IpcResult<Response> {
        let (mut reader, mut writer) = self.connect().await?;
        send(&mut writer, &request).await?;
        read_response(&mut reader).await
    }

    /// Send a method call with no parameters.
    pub async fn call_method(&self, method: Method) -> IpcResult<Response> {
        self.call(Request::new(method)).await
    }

    /// Send a method call with parameters.
    pub async fn call_method_with_params(
        &self,
        method: Method,
        params: serde_json::Value,
    ) -> IpcResult<Response> {
        self.call(Request::with_params(method, params)).await
    }

    /// Call a method and decode its result, turning an error response into
    /// [`IpcError::Remote`].
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        params: Option<serde_json::Value>,
    ) -> IpcResult<T> {
        let request = match params {
            Some(params) => Request::with_params(method, params),
            None => Request::new(method),
        };
        decode_result(self.call(request).await?)
    }

    /// Check if the host is running.
    pub async fn is_host_running(&self) -> bool {
        self.call_method(Method::Health).await.is_ok()
    }

    /// Signal load-complete and switch to a push stream.
    ///
    /// Buffered deep links follow the response on the returned stream.
    pub async fn open_window(&self) -> IpcResult<(WindowReadyResult, PushStream)> {
        let (mut reader, mut writer) = self.connect().await?;
        send(&mut writer, &Request::new(Method::WindowReady)).await?;
        let ready: WindowReadyResult = decode_result(read_response(&mut reader).await?)?;

        Ok((
            ready,
            PushStream {
                reader,
                _writer: writer,
                line_buffer: String::new(),
            },
        ))
    }
}

async fn send(writer: &mut OwnedWriteHalf, request: &Request) -> IpcResult<()> {
    let request_json = request.to_json()?;
    writer.write_all(request_json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

async fn read_response(reader: &mut BufReader<OwnedReadHalf>) -> IpcResult<Response> {
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    if line.is_empty() {
        return Err(IpcError::ConnectionClosed);
    }

    Ok(Response::from_json(line.trim())?)
}

fn decode_result<T: DeserializeOwned>(response: Response) -> IpcResult<T> {
    if let Some(error) = response.error {
        return Err(IpcError::Remote {
            code: error.code,
            message: error.message,
        });
    }
    let result = response.result.unwrap_or(serde_json::Value::Null);
    Ok(serde_json::from_value(result)?)
}

/// The window's push stream.
///
/// Dropping it closes the connection, which the host observes as the
/// window going away.
#[derive(Debug)]
pub struct PushStream {
    reader: BufReader<OwnedReadHalf>,
    _writer: OwnedWriteHalf,
    line_buffer: String,
}

impl PushStream {
    /// Receive the next push. Returns `None` once the host closes the stream.
    ///
    /// Lines that are not pushes (stray responses, garbage) are skipped.
    pub async fn recv(&mut self) -> Option<Push> {
        loop {
            self.line_buffer.clear();
            match self.reader.read_line(&mut self.line_buffer).await {
                Ok(0) => return None,
                Ok(_) => {
                    let trimmed = self.line_buffer.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match Push::from_json(trimmed) {
                        Ok(push) => return Some(push),
                        Err(e) => warn!(error = %e, "Skipping non-push line on push stream"),
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Read error on push stream");
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ipc_client_not_running() {
        let client = IpcClient::new("/tmp/lumen-nonexistent.sock");
        assert!(!client.is_host_running().await);
    }

    #[tokio::test]
    async fn test_ipc_client_connect_failure() {
        let client = IpcClient::new("/tmp/definitely-does-not-exist-lumen.sock");
        let result = client.call_method(Method::Health).await;
        assert!(matches!(result, Err(IpcError::Socket(_))));
    }

    #[test]
    fn test_decode_result_null_is_none() {
        let value: Option<String> =
            decode_result(Response::success("1", serde_json::Value::Null)).unwrap();
        assert!(value.is_none());

        let value: Option<String> =
            decode_result(Response::success("1", serde_json::json!("tok"))).unwrap();
        assert_eq!(value.as_deref(), Some("tok"));
    }

    #[test]
    fn test_decode_result_error_is_remote() {
        let err = decode_result::<()>(Response::error("1", -32602, "bad")).unwrap_err();
        match err {
            IpcError::Remote { code, message } => {
                assert_eq!(code, -32602);
                assert_eq!(message, "bad");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
