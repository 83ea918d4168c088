//! Async event channel between the data path and its observers
//!
//! Completion handlers must never block, so emitting is a `try_send`: when the
//! observer falls behind, events are dropped rather than stalling a transfer.

use async_channel::{Receiver, Sender, TrySendError, bounded};
use tracing::trace;

/// Events raised by the gadget data path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GadgetEvent {
    /// Host selected an alternate setting
    AltSettingChanged {
        /// Interface number
        interface: u8,
        /// New alternate setting
        alt: u8,
    },

    /// Playback pointer crossed one or more period boundaries
    PeriodElapsed {
        /// Hardware pointer after the advance (bytes)
        hw_ptr: usize,
        /// Number of periods crossed by this advance
        periods: u32,
    },

    /// An isochronous slot failed and was not resubmitted
    AudioStalled {
        /// Slot index within the pool
        slot: usize,
    },

    /// Inbound report queued for readers
    ReportReceived {
        /// Record length in bytes
        len: usize,
    },

    /// Inbound report dropped because the read queue was full
    ReportDropped {
        /// Record length in bytes
        len: usize,
    },

    /// Outbound report transferred to the host
    ReportSent {
        /// Record length in bytes
        len: usize,
    },

    /// First caller opened the report channel
    FunctionActivated,

    /// Last caller closed the report channel
    FunctionDeactivated,
}

/// Sending half, cloned into every component that raises events
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<GadgetEvent>,
}

impl EventSender {
    /// Emit an event without blocking
    pub fn emit(&self, event: GadgetEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => trace!("Event channel full, dropped {:?}", event),
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// Sender whose events go nowhere
    pub fn disconnected() -> Self {
        let (tx, _) = bounded(1);
        Self { tx }
    }
}

/// Receiving half, owned by the observer
pub struct EventReceiver {
    rx: Receiver<GadgetEvent>,
}

impl EventReceiver {
    /// Receive the next event (async)
    pub async fn recv(&self) -> crate::Result<GadgetEvent> {
        self.rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Receive the next event from a plain thread
    pub fn recv_blocking(&self) -> crate::Result<GadgetEvent> {
        self.rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&self) -> Option<GadgetEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain every event currently queued
    pub fn drain(&self) -> Vec<GadgetEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

/// Create the event channel
///
/// Returns (EventSender for the data path, EventReceiver for the observer)
pub fn create_event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = bounded(capacity.max(1));
    (EventSender { tx }, EventReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_channel() {
        let (events, receiver) = create_event_channel(8);

        let handle = std::thread::spawn(move || {
            events.emit(GadgetEvent::AltSettingChanged {
                interface: 1,
                alt: 1,
            });
        });

        let event = receiver.recv().await.unwrap();
        assert_eq!(
            event,
            GadgetEvent::AltSettingChanged {
                interface: 1,
                alt: 1
            }
        );
        handle.join().unwrap();
    }

    #[test]
    fn test_emit_never_blocks_when_full() {
        let (events, receiver) = create_event_channel(2);

        for len in 0..10 {
            events.emit(GadgetEvent::ReportSent { len });
        }

        let drained = receiver.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0], GadgetEvent::ReportSent { len: 0 });
    }

    #[test]
    fn test_disconnected_sender() {
        let events = EventSender::disconnected();
        events.emit(GadgetEvent::FunctionActivated);
    }
}
