//! IPC server implementation.
//!
//! Supports both request/response and push streams.
//!
//! ## Push streams
//!
//! A method registered with [`IpcServer::register_stream_handler`] turns its
//! connection into a push stream. The client:
//!
//! 1. Sends the stream method (`window.ready`)
//! 2. Receives the success response
//! 3. Reads pushes (NDJSON lines with a `type` field) until it disconnects
//!
//! Ordinary requests may still be sent on a push stream; their responses are
//! interleaved with pushes and correlated by `id`.
//!
//! When the stream ends the push channel is closed, which the producer
//! observes as a closed sender. Pushes that were queued but never written
//! are handed to the subscription's end callback.

use crate::{error_codes, IpcError, IpcResult, Method, Push, Request, Response};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, error, info, warn};

/// Handler function type for IPC methods.
pub type HandlerFn =
    Box<dyn Fn(Request) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync>;

/// Called once when a push stream ends, with the pushes it accepted but
/// never wrote, oldest first.
pub type StreamEndFn = Box<dyn FnOnce(Vec<Push>) + Send>;

/// A successfully opened push stream: the response to send first and the
/// receiver to drain afterwards.
pub struct PushSubscription {
    response: Response,
    pushes: mpsc::UnboundedReceiver<Push>,
    on_end: Option<StreamEndFn>,
}

impl PushSubscription {
    pub fn new(response: Response, pushes: mpsc::UnboundedReceiver<Push>) -> Self {
        Self {
            response,
            pushes,
            on_end: None,
        }
    }

    /// Run `on_end` with the undelivered pushes once the stream ends.
    pub fn on_end<F>(mut self, on_end: F) -> Self
    where
        F: FnOnce(Vec<Push>) + Send + 'static,
    {
        self.on_end = Some(Box::new(on_end));
        self
    }

    /// Close the channel and hand everything still queued, after
    /// `undelivered`, to the end callback.
    fn end(mut self, mut undelivered: Vec<Push>) {
        self.pushes.close();
        while let Ok(push) = self.pushes.try_recv() {
            undelivered.push(push);
        }
        match self.on_end.take() {
            Some(on_end) => on_end(undelivered),
            None if !undelivered.is_empty() => {
                warn!(count = undelivered.len(), "Dropping undelivered pushes")
            }
            None => {}
        }
    }
}

/// Outcome of opening a push stream, or an error response that leaves the
/// connection in request/response mode.
pub type StreamOpen = Result<PushSubscription, Response>;

/// Handler function type for stream-opening methods.
pub type StreamHandlerFn =
    Box<dyn Fn(Request) -> Pin<Box<dyn Future<Output = StreamOpen> + Send>> + Send + Sync>;

type Handlers = Arc<RwLock<HashMap<Method, HandlerFn>>>;
type StreamHandlers = Arc<RwLock<HashMap<Method, StreamHandlerFn>>>;

/// IPC server that listens on a Unix domain socket.
pub struct IpcServer {
    socket_path: PathBuf,
    handlers: Handlers,
    stream_handlers: StreamHandlers,
    shutdown_tx: watch::Sender<bool>,
}

impl IpcServer {
    /// Create a new IPC server.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            socket_path: socket_path.into(),
            handlers: Arc::new(RwLock::new(HashMap::new())),
            stream_handlers: Arc::new(RwLock::new(HashMap::new())),
            shutdown_tx,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Register a handler for a method.
    pub async fn register_handler<F, Fut>(&self, method: Method, handler: F)
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        let boxed_handler: HandlerFn = Box::new(move |req| Box::pin(handler(req)));
        self.handlers.write().await.insert(method, boxed_handler);
    }

    /// Register a handler that turns its connection into a push stream.
    pub async fn register_stream_handler<F, Fut>(&self, method: Method, handler: F)
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StreamOpen> + Send + 'static,
    {
        let boxed_handler: StreamHandlerFn = Box::new(move |req| Box::pin(handler(req)));
        self.stream_handlers
            .write()
            .await
            .insert(method, boxed_handler);
    }

    /// Methods with a registered handler of either kind.
    pub async fn registered_methods(&self) -> Vec<Method> {
        let mut methods: Vec<Method> = self.handlers.read().await.keys().copied().collect();
        methods.extend(self.stream_handlers.read().await.keys().copied());
        methods
    }

    /// Get a shutdown receiver. Its value turns `true` once shutdown is
    /// requested, even if that happened before subscribing.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Trigger shutdown.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Bind the socket, replacing a leftover file, with owner-only access.
    pub fn bind(&self) -> IpcResult<UnixListener> {
        let socket_path = self.socket_path.as_path();
        if socket_path.exists() {
            std::fs::remove_file(socket_path)?;
        }

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(socket_path)?;
        restrict_to_owner(socket_path)?;
        info!(path = %socket_path.display(), "IPC server listening");
        Ok(listener)
    }

    /// Bind and serve until shutdown.
    pub async fn run(&self) -> IpcResult<()> {
        let listener = self.bind()?;
        self.serve(listener).await
    }

    /// Serve connections on an already bound listener until shutdown.
    pub async fn serve(&self, listener: UnixListener) -> IpcResult<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, _)) => {
                            let handlers = self.handlers.clone();
                            let stream_handlers = self.stream_handlers.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, handlers, stream_handlers).await {
                                    error!(error = %e, "Connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Accept error");
                        }
                    }
                }
                _ = shutdown_rx.wait_for(|stopped| *stopped) => {
                    info!("IPC server shutting down");
                    break;
                }
            }
        }

        let _ = std::fs::remove_file(&self.socket_path);

        Ok(())
    }
}

fn restrict_to_owner(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

/// Parse one line into a request, or the error response to send instead.
fn parse_request(line: &str) -> Result<Request, Response> {
    match Request::from_json(line) {
        Ok(request) => Ok(request),
        Err(e) => {
            warn!(error = %e, "Failed to parse request");
            let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else {
                return Err(Response::error(
                    "",
                    error_codes::PARSE_ERROR,
                    &format!("Parse error: {}", e),
                ));
            };
            let id = value.get("id").and_then(|id| id.as_str()).unwrap_or("");
            Err(match value.get("method").and_then(|m| m.as_str()) {
                Some(method) if serde_json::from_value::<Method>(method.into()).is_err() => {
                    Response::error(
                        id,
                        error_codes::METHOD_NOT_FOUND,
                        &format!("Method not found: {}", method),
                    )
                }
                _ => Response::error(
                    id,
                    error_codes::INVALID_REQUEST,
                    &format!("Invalid request: {}", e),
                ),
            })
        }
    }
}

async fn dispatch(handlers: &Handlers, request: Request) -> Response {
    let request_id = request.id.clone();
    let method = request.method;
    let handlers = handlers.read().await;
    match handlers.get(&method) {
        Some(handler) => handler(request).await,
        None => Response::error(
            &request_id,
            error_codes::METHOD_NOT_FOUND,
            &format!("Method not found: {}", method.as_str()),
        ),
    }
}

async fn write_line(writer: &mut OwnedWriteHalf, json: &str) -> std::io::Result<()> {
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

/// Handle a single client connection.
async fn handle_connection(
    stream: UnixStream,
    handlers: Handlers,
    stream_handlers: StreamHandlers,
) -> IpcResult<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    debug!("Client connected");

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;

        if bytes_read == 0 {
            debug!("Client disconnected");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let request = match parse_request(trimmed) {
            Ok(request) => request,
            Err(response) => {
                write_line(&mut writer, &response.to_json()?).await?;
                continue;
            }
        };

        // Params may carry secrets; only the method and id are logged.
        debug!(method = request.method.as_str(), id = %request.id, "Received request");

        let stream_open = {
            let stream_handlers = stream_handlers.read().await;
            match stream_handlers.get(&request.method) {
                Some(handler) => Some(handler(request.clone()).await),
                None => None,
            }
        };

        match stream_open {
            Some(Ok(subscription)) => {
                let written: IpcResult<()> = match subscription.response.to_json() {
                    Ok(json) => write_line(&mut writer, &json).await.map_err(IpcError::from),
                    Err(e) => Err(IpcError::from(e)),
                };
                if let Err(e) = written {
                    subscription.end(Vec::new());
                    return Err(e);
                }
                info!("Client entered push mode");
                return stream_pushes(reader, writer, subscription, &handlers).await;
            }
            Some(Err(response)) => {
                write_line(&mut writer, &response.to_json()?).await?;
            }
            None => {
                let response = dispatch(&handlers, request).await;
                write_line(&mut writer, &response.to_json()?).await?;
            }
        }
    }

    Ok(())
}

/// Forward pushes to the client until either side goes away.
async fn stream_pushes(
    mut reader: BufReader<OwnedReadHalf>,
    mut writer: OwnedWriteHalf,
    mut subscription: PushSubscription,
    handlers: &Handlers,
) -> IpcResult<()> {
    let mut line = String::new();
    let mut undelivered = Vec::new();

    loop {
        tokio::select! {
            push = subscription.pushes.recv() => {
                let Some(push) = push else {
                    debug!("Push channel closed");
                    break;
                };
                match push.to_json() {
                    Ok(json) => {
                        if write_line(&mut writer, &json).await.is_err() {
                            debug!("Failed to write push, client disconnected");
                            undelivered.push(push);
                            break;
                        }
                        debug!(push_type = push.push_type.as_str(), "Push sent");
                    }
                    Err(e) => warn!(error = %e, "Failed to serialize push"),
                }
            }

            read_result = reader.read_line(&mut line) => {
                match read_result {
                    Ok(0) => {
                        debug!("Client disconnected from push stream");
                        break;
                    }
                    Ok(_) => {
                        let trimmed = line.trim();
                        if !trimmed.is_empty() {
                            let response = match parse_request(trimmed) {
                                Ok(request) => dispatch(handlers, request).await,
                                Err(response) => response,
                            };
                            if let Ok(json) = response.to_json() {
                                if write_line(&mut writer, &json).await.is_err() {
                                    break;
                                }
                            }
                        }
                        line.clear();
                    }
                    Err(e) => {
                        debug!(error = %e, "Read error on push stream");
                        break;
                    }
                }
            }
        }
    }

    info!(undelivered = undelivered.len(), "Push stream ended");
    subscription.end(undelivered);
    Ok(())
}
