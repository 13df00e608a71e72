//! Session-changed notifications.
//!
//! Listeners run on their own task and receive a [`FollowUpScheduler`]
//! instead of the manager. They can ask for work but cannot call back into
//! the identity client from inside the notification, so a listener can never
//! re-enter an operation that is still publishing.

use crate::{SessionError, SessionResult};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default cap on concurrent subscribers.
pub const DEFAULT_MAX_SUBSCRIBERS: usize = 16;

const CHANNEL_CAPACITY: usize = 64;

/// What changed. Carries no tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    SignedIn { user_id: String },
    SignedOut,
    TokenRefreshed { user_id: String },
    /// A recovery link was verified; the UI should prompt for a new password.
    PasswordRecovery { user_id: String },
    UserUpdated { user_id: String },
}

/// Work a listener may request. Executed by the follow-up worker on a later
/// turn, never inside the notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    Refresh,
    /// Restore the persisted session if none is in memory.
    Resync,
}

/// Handle listeners use to queue follow-up work.
#[derive(Debug, Clone)]
pub struct FollowUpScheduler {
    tx: mpsc::UnboundedSender<FollowUp>,
}

impl FollowUpScheduler {
    pub(crate) fn new(tx: mpsc::UnboundedSender<FollowUp>) -> Self {
        Self { tx }
    }

    pub fn schedule(&self, follow_up: FollowUp) {
        if self.tx.send(follow_up).is_err() {
            debug!(follow_up = ?follow_up, "Follow-up worker gone, dropping");
        }
    }
}

/// Broadcast bus with a bounded subscriber count.
#[derive(Debug)]
pub struct SessionEventBus {
    sender: broadcast::Sender<SessionEvent>,
    max_subscribers: usize,
}

impl Default for SessionEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SUBSCRIBERS)
    }
}

impl SessionEventBus {
    pub fn new(max_subscribers: usize) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            max_subscribers,
        }
    }

    pub fn subscribe(&self) -> SessionResult<broadcast::Receiver<SessionEvent>> {
        if self.sender.receiver_count() >= self.max_subscribers {
            return Err(SessionError::TooManySubscribers(self.max_subscribers));
        }
        Ok(self.sender.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Callers must not hold any session lock here.
    pub(crate) fn publish(&self, event: SessionEvent) {
        debug!(event = ?event, subscribers = self.sender.receiver_count(), "Publishing session event");
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    /// Run `listener` for every event on its own task.
    pub fn listen<F>(&self, scheduler: FollowUpScheduler, listener: F) -> SessionResult<JoinHandle<()>>
    where
        F: Fn(&SessionEvent, &FollowUpScheduler) + Send + 'static,
    {
        let mut rx = self.subscribe()?;
        Ok(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => listener(&event, &scheduler),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Session listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_are_capped() {
        let bus = SessionEventBus::new(2);
        let _a = bus.subscribe().unwrap();
        let _b = bus.subscribe().unwrap();
        assert!(matches!(
            bus.subscribe(),
            Err(SessionError::TooManySubscribers(2))
        ));

        drop(_a);
        assert!(bus.subscribe().is_ok());
    }

    #[tokio::test]
    async fn listener_can_only_schedule() {
        let bus = SessionEventBus::default();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let _handle = bus
            .listen(FollowUpScheduler::new(tx), |event, scheduler| {
                if matches!(event, SessionEvent::SignedIn { .. }) {
                    scheduler.schedule(FollowUp::Refresh);
                }
            })
            .unwrap();

        bus.publish(SessionEvent::SignedOut);
        bus.publish(SessionEvent::SignedIn {
            user_id: "u1".to_string(),
        });

        assert_eq!(rx.recv().await, Some(FollowUp::Refresh));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = SessionEventBus::default();
        bus.publish(SessionEvent::SignedOut);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn events_serialize_without_tokens() {
        let json = serde_json::to_value(SessionEvent::TokenRefreshed {
            user_id: "u1".to_string(),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"event": "token_refreshed", "user_id": "u1"})
        );
    }
}
