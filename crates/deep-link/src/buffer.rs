//! Pending-state buffer bridging "payload classified" and "window loaded".
//!
//! A deep link can arrive before any window exists (cold start) or while the
//! window is still loading. Until a receiver registers, each payload kind has
//! one slot; a newer payload of the same kind replaces an older one. Once a
//! receiver is registered, payloads bypass the slots.
//!
//! The receiver check and the deliver-or-store decision happen under one
//! lock, so a payload racing with registration is either flushed by the
//! registration or delivered directly, never both and never neither.

use crate::error::{BufferError, DeliveryError};
use crate::payload::{DeepLinkPayload, PayloadKind};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// The loaded window's side of the delivery channel.
///
/// `deliver` is called with the buffer lock held and must not block.
pub trait DeepLinkReceiver: Send {
    fn deliver(&self, payload: &DeepLinkPayload) -> Result<(), DeliveryError>;

    /// Whether the other end has gone away. A closed receiver can be
    /// replaced by a new registration.
    fn is_closed(&self) -> bool {
        false
    }
}

/// What happened to a stored payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Handed to the registered receiver.
    Delivered,
    /// Held in its slot; `replaced` is true if an undelivered payload of the
    /// same kind was overwritten.
    Buffered { replaced: bool },
}

struct BufferState<R> {
    slots: [Option<DeepLinkPayload>; 3],
    receiver: Option<R>,
}

/// Holds at most one undelivered payload per [`PayloadKind`].
pub struct PendingBuffer<R> {
    state: Mutex<BufferState<R>>,
}

impl<R: DeepLinkReceiver> Default for PendingBuffer<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: DeepLinkReceiver> PendingBuffer<R> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BufferState {
                slots: [None, None, None],
                receiver: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BufferState<R>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Deliver immediately if a receiver is registered, otherwise buffer.
    ///
    /// If the receiver reports it closed, it is dropped and the payload is
    /// buffered for the next registration.
    pub fn store(&self, payload: DeepLinkPayload) -> Submission {
        let mut state = self.lock();
        Self::place(&mut state, payload)
    }

    /// Return a payload that was handed to a receiver but never reached the
    /// window.
    ///
    /// A newer payload of the same kind already waiting in its slot wins, and
    /// the requeued one is dropped (`None`).
    pub fn requeue(&self, payload: DeepLinkPayload) -> Option<Submission> {
        let kind = payload.kind();
        let mut state = self.lock();
        if state.receiver.is_none() && state.slots[kind.slot()].is_some() {
            debug!(
                channel = kind.channel(),
                "Newer deep link already buffered, dropping requeued one"
            );
            return None;
        }
        info!(channel = kind.channel(), "Requeuing undelivered deep link");
        Some(Self::place(&mut state, payload))
    }

    fn place(state: &mut BufferState<R>, payload: DeepLinkPayload) -> Submission {
        let kind = payload.kind();

        if let Some(receiver) = state.receiver.as_ref() {
            match receiver.deliver(&payload) {
                Ok(()) => {
                    debug!(channel = kind.channel(), "Deep link delivered");
                    return Submission::Delivered;
                }
                Err(DeliveryError::Closed) => {
                    warn!(
                        channel = kind.channel(),
                        "Receiver closed, buffering deep link"
                    );
                    state.receiver = None;
                }
            }
        }

        let replaced = state.slots[kind.slot()].replace(payload).is_some();
        if replaced {
            info!(
                channel = kind.channel(),
                "Undelivered deep link replaced by newer one"
            );
        } else {
            debug!(channel = kind.channel(), "Deep link buffered");
        }
        Submission::Buffered { replaced }
    }

    /// Register the loaded window's receiver and flush every occupied slot.
    ///
    /// Returns the number of payloads delivered. Fails if a live receiver is
    /// already registered; a closed one is replaced. If the receiver closes
    /// mid-flush, it is dropped and the undelivered payloads stay buffered.
    pub fn register_receiver(&self, receiver: R) -> Result<usize, BufferError> {
        let mut state = self.lock();
        if let Some(current) = state.receiver.as_ref() {
            if !current.is_closed() {
                return Err(BufferError::AlreadyRegistered);
            }
            debug!("Replacing closed deep link receiver");
            state.receiver = None;
        }

        let mut flushed = 0;
        for kind in PayloadKind::ALL {
            let Some(payload) = state.slots[kind.slot()].take() else {
                continue;
            };
            match receiver.deliver(&payload) {
                Ok(()) => flushed += 1,
                Err(DeliveryError::Closed) => {
                    warn!(
                        channel = kind.channel(),
                        flushed, "Receiver closed during flush"
                    );
                    state.slots[kind.slot()] = Some(payload);
                    return Ok(flushed);
                }
            }
        }

        state.receiver = Some(receiver);
        info!(flushed, "Deep link receiver registered");
        Ok(flushed)
    }

    /// Drop the current receiver if it reports closed, e.g. after the
    /// window's stream ended. A live receiver (a window that attached since)
    /// is left alone. Returns whether one was dropped.
    pub fn release_closed_receiver(&self) -> bool {
        let mut state = self.lock();
        match state.receiver.as_ref() {
            Some(receiver) if receiver.is_closed() => {
                state.receiver = None;
                debug!("Closed deep link receiver released");
                true
            }
            _ => false,
        }
    }

    pub fn has_receiver(&self) -> bool {
        self.lock().receiver.is_some()
    }

    /// Kinds that currently hold an undelivered payload.
    pub fn pending_kinds(&self) -> Vec<PayloadKind> {
        let state = self.lock();
        PayloadKind::ALL
            .into_iter()
            .filter(|kind| state.slots[kind.slot()].is_some())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::VerificationKind;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Recorder {
        seen: Arc<Mutex<Vec<DeepLinkPayload>>>,
        closed: Arc<AtomicBool>,
    }

    impl Recorder {
        fn seen(&self) -> Vec<DeepLinkPayload> {
            self.seen.lock().unwrap().clone()
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    impl DeepLinkReceiver for Recorder {
        fn deliver(&self, payload: &DeepLinkPayload) -> Result<(), DeliveryError> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(DeliveryError::Closed);
            }
            self.seen.lock().unwrap().push(payload.clone());
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    fn callback(code: &str) -> DeepLinkPayload {
        DeepLinkPayload::OAuthCallback {
            code: Some(code.to_string()),
            error: None,
            error_description: None,
        }
    }

    fn reset(hash: &str) -> DeepLinkPayload {
        DeepLinkPayload::VerificationLink {
            token_hash: hash.to_string(),
            kind: VerificationKind::PasswordRecovery,
        }
    }

    #[test]
    fn cold_start_payload_is_flushed_exactly_once() {
        let buffer = PendingBuffer::new();
        let recorder = Recorder::default();

        assert_eq!(
            buffer.store(callback("X")),
            Submission::Buffered { replaced: false }
        );
        assert_eq!(buffer.pending_kinds(), vec![PayloadKind::OAuthCallback]);

        assert_eq!(buffer.register_receiver(recorder.clone()), Ok(1));
        assert_eq!(recorder.seen(), vec![callback("X")]);
        assert!(buffer.pending_kinds().is_empty());
        assert_eq!(recorder.seen().len(), 1);
    }

    #[test]
    fn second_arrival_of_same_kind_overwrites_first() {
        let buffer = PendingBuffer::new();
        let recorder = Recorder::default();

        buffer.store(callback("old"));
        assert_eq!(
            buffer.store(callback("new")),
            Submission::Buffered { replaced: true }
        );

        buffer.register_receiver(recorder.clone()).unwrap();
        assert_eq!(recorder.seen(), vec![callback("new")]);
    }

    #[test]
    fn different_kinds_are_buffered_independently() {
        let buffer = PendingBuffer::new();
        let recorder = Recorder::default();

        buffer.store(reset("h"));
        buffer.store(callback("c"));

        assert_eq!(buffer.register_receiver(recorder.clone()), Ok(2));
        assert_eq!(recorder.seen(), vec![callback("c"), reset("h")]);
    }

    #[test]
    fn payload_after_registration_bypasses_buffer() {
        let buffer = PendingBuffer::new();
        let recorder = Recorder::default();

        assert_eq!(buffer.register_receiver(recorder.clone()), Ok(0));
        assert_eq!(buffer.store(callback("warm")), Submission::Delivered);
        assert!(buffer.pending_kinds().is_empty());
        assert_eq!(recorder.seen(), vec![callback("warm")]);
    }

    #[test]
    fn second_registration_is_refused() {
        let buffer = PendingBuffer::new();
        buffer.register_receiver(Recorder::default()).unwrap();
        assert_eq!(
            buffer.register_receiver(Recorder::default()),
            Err(BufferError::AlreadyRegistered)
        );
    }

    #[test]
    fn closed_receiver_is_replaced_on_registration() {
        let buffer = PendingBuffer::new();
        let first = Recorder::default();
        buffer.register_receiver(first.clone()).unwrap();
        first.close();

        let second = Recorder::default();
        assert_eq!(buffer.register_receiver(second.clone()), Ok(0));
        assert_eq!(buffer.store(callback("c")), Submission::Delivered);
        assert_eq!(second.seen(), vec![callback("c")]);
    }

    #[test]
    fn closed_receiver_returns_payload_to_slot() {
        let buffer = PendingBuffer::new();
        let first = Recorder::default();
        buffer.register_receiver(first.clone()).unwrap();

        first.close();
        assert_eq!(
            buffer.store(callback("lost?")),
            Submission::Buffered { replaced: false }
        );
        assert!(!buffer.has_receiver());

        let second = Recorder::default();
        assert_eq!(buffer.register_receiver(second.clone()), Ok(1));
        assert_eq!(second.seen(), vec![callback("lost?")]);
        assert!(first.seen().is_empty());
    }

    #[test]
    fn receiver_closed_during_flush_keeps_payload() {
        let buffer = PendingBuffer::new();
        buffer.store(callback("c"));

        let closed = Recorder::default();
        closed.close();
        assert_eq!(buffer.register_receiver(closed), Ok(0));
        assert!(!buffer.has_receiver());
        assert_eq!(buffer.pending_kinds(), vec![PayloadKind::OAuthCallback]);
    }

    #[test]
    fn release_only_drops_closed_receiver() {
        let buffer = PendingBuffer::new();
        let live = Recorder::default();
        buffer.register_receiver(live.clone()).unwrap();
        assert!(!buffer.release_closed_receiver());
        assert!(buffer.has_receiver());

        live.close();
        assert!(buffer.release_closed_receiver());
        assert!(!buffer.has_receiver());
        assert!(!buffer.release_closed_receiver());

        buffer.store(callback("after-reload"));
        let next = Recorder::default();
        assert_eq!(buffer.register_receiver(next.clone()), Ok(1));
        assert_eq!(next.seen(), vec![callback("after-reload")]);
    }

    #[test]
    fn requeue_fills_empty_slot_but_never_overwrites_newer() {
        let buffer = PendingBuffer::new();

        assert_eq!(
            buffer.requeue(reset("undelivered")),
            Some(Submission::Buffered { replaced: false })
        );

        buffer.store(callback("newer"));
        assert_eq!(buffer.requeue(callback("older")), None);

        let next = Recorder::default();
        assert_eq!(buffer.register_receiver(next.clone()), Ok(2));
        assert_eq!(next.seen(), vec![callback("newer"), reset("undelivered")]);
    }

    #[test]
    fn requeue_delivers_to_live_receiver() {
        let buffer = PendingBuffer::new();
        let window = Recorder::default();
        buffer.register_receiver(window.clone()).unwrap();

        assert_eq!(
            buffer.requeue(callback("again")),
            Some(Submission::Delivered)
        );
        assert_eq!(window.seen(), vec![callback("again")]);
    }

    #[test]
    fn concurrent_store_and_register_never_duplicates_or_loses() {
        for _ in 0..50 {
            let buffer = Arc::new(PendingBuffer::new());
            let recorder = Recorder::default();

            let storer = {
                let buffer = buffer.clone();
                std::thread::spawn(move || {
                    buffer.store(callback("race"));
                })
            };
            let registrar = {
                let buffer = buffer.clone();
                let recorder = recorder.clone();
                std::thread::spawn(move || {
                    buffer.register_receiver(recorder).unwrap();
                })
            };
            storer.join().unwrap();
            registrar.join().unwrap();

            assert_eq!(recorder.seen(), vec![callback("race")]);
            assert!(buffer.pending_kinds().is_empty());
        }
    }
}
