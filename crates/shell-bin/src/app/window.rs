//! Bridge between the pending deep-link buffer and the window's push stream.

use deep_link::{DeepLinkPayload, DeepLinkReceiver, DeliveryError};
use shell_ipc::{Push, PushType};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

/// Delivers deep links as pushes on the window's `window.ready` stream.
pub struct WindowReceiver {
    tx: UnboundedSender<Push>,
}

impl WindowReceiver {
    pub fn new(tx: UnboundedSender<Push>) -> Self {
        Self { tx }
    }
}

impl DeepLinkReceiver for WindowReceiver {
    fn deliver(&self, payload: &DeepLinkPayload) -> Result<(), DeliveryError> {
        let Some(push_type) = PushType::from_channel(payload.channel()) else {
            // Every payload kind has a push channel.
            warn!(channel = payload.channel(), "No push type for deep link channel");
            return Err(DeliveryError::Closed);
        };
        self.tx
            .send(Push::new(push_type, payload.push_body()))
            .map_err(|_| DeliveryError::Closed)
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The current window's push sender, kept for non-deep-link pushes.
#[derive(Clone, Default)]
pub struct WindowHandle {
    tx: Arc<Mutex<Option<UnboundedSender<Push>>>>,
}

impl WindowHandle {
    pub fn attach(&self, tx: UnboundedSender<Push>) {
        *self.tx.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
    }

    /// Ask the window to restore if minimized and take focus.
    ///
    /// Returns false when no window is open.
    pub fn focus(&self) -> bool {
        let mut slot = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = slot.as_ref() else {
            debug!("No window to focus");
            return false;
        };
        if tx.send(Push::window_focus()).is_err() {
            debug!("Window stream closed, dropping handle");
            *slot = None;
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deep_link::VerificationKind;
    use tokio::sync::mpsc;

    #[test]
    fn deliver_pushes_on_payload_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let receiver = WindowReceiver::new(tx);

        receiver
            .deliver(&DeepLinkPayload::VerificationLink {
                token_hash: "abc123".to_string(),
                kind: VerificationKind::PasswordRecovery,
            })
            .unwrap();

        let push = rx.try_recv().unwrap();
        assert_eq!(push.push_type, PushType::Verification);
        assert_eq!(
            push.data,
            serde_json::json!({"token_hash": "abc123", "kind": "reset"})
        );
    }

    #[test]
    fn dropped_stream_reports_closed() {
        let (tx, rx) = mpsc::unbounded_channel();
        let receiver = WindowReceiver::new(tx);
        drop(rx);

        assert!(receiver.is_closed());
        let result = receiver.deliver(&DeepLinkPayload::SessionHandoff {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
        });
        assert_eq!(result, Err(DeliveryError::Closed));
    }

    #[test]
    fn focus_requires_open_window() {
        let handle = WindowHandle::default();
        assert!(!handle.focus());

        let (tx, mut rx) = mpsc::unbounded_channel();
        handle.attach(tx);
        assert!(handle.focus());
        assert_eq!(rx.try_recv().unwrap().push_type, PushType::WindowFocus);

        drop(rx);
        assert!(!handle.focus());
        assert!(handle.tx.lock().unwrap().is_none());
    }
}
