//! `window.ready`: the UI signals load-complete and its connection becomes
//! the push stream.
//!
//! Deep links the stream accepted but never wrote go back to the pending
//! buffer when it ends, so a window reload does not lose them.

use crate::app::{ShellState, WindowReceiver};
use deep_link::{BufferError, DeepLinkPayload, PendingBuffer};
use shell_ipc::{
    error_codes, IpcServer, Method, Push, PushSubscription, Response, WindowReadyResult,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Register `window.ready`.
pub async fn register(server: &IpcServer, state: ShellState) {
    server
        .register_stream_handler(Method::WindowReady, move |req| {
            let state = state.clone();
            async move {
                let (tx, rx) = mpsc::unbounded_channel();
                // Buffered payloads land in `rx` before the response is written;
                // the server drains `rx` only after it.
                match state
                    .deep_links
                    .register_receiver(WindowReceiver::new(tx.clone()))
                {
                    Ok(flushed) => {
                        state.window.attach(tx);
                        info!(flushed, "Window ready");
                        let result = WindowReadyResult { flushed };
                        let deep_links = state.deep_links.clone();
                        match serde_json::to_value(result) {
                            Ok(value) => Ok(PushSubscription::new(
                                Response::success(&req.id, value),
                                rx,
                            )
                            .on_end(move |undelivered| requeue(&deep_links, undelivered))),
                            Err(e) => Err(Response::error(
                                &req.id,
                                error_codes::INTERNAL_ERROR,
                                &e.to_string(),
                            )),
                        }
                    }
                    Err(BufferError::AlreadyRegistered) => {
                        warn!("window.ready while another window is attached");
                        Err(Response::error(
                            &req.id,
                            error_codes::CONFLICT,
                            "A window is already attached",
                        ))
                    }
                }
            }
        })
        .await;

    info!("Registered window handlers");
}

fn requeue(deep_links: &PendingBuffer<WindowReceiver>, undelivered: Vec<Push>) {
    deep_links.release_closed_receiver();
    for push in undelivered {
        match DeepLinkPayload::from_push(push.push_type.as_str(), &push.data) {
            Some(payload) => {
                deep_links.requeue(payload);
            }
            None => debug!(push_type = push.push_type.as_str(), "Dropping undelivered push"),
        }
    }
}
