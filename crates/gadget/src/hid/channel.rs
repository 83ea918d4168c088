//! Report channel: caller-facing side of the HID bridge

use super::pending::PendingWrite;
use super::queue::{PopResult, RecordQueue};
use super::wait::{WaitAbort, WaitQueue};
use crate::error::HidError;
use async_channel::{Receiver, Sender, TrySendError};
use bytes::Bytes;
use common::{EventSender, FunctionRegistrar, GadgetEvent};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, info, trace, warn};

/// Sizing of the report channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HidOptions {
    /// Largest report accepted by `write`
    pub max_report: usize,
    /// Byte capacity of each record queue
    pub queue_capacity: usize,
}

impl Default for HidOptions {
    fn default() -> Self {
        Self {
            max_report: 1024,
            queue_capacity: 4096,
        }
    }
}

/// Result of a readiness poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness {
    /// At least one inbound record is queued
    pub readable: bool,
    /// The write queue has at least one free byte
    pub writable: bool,
}

impl From<WaitAbort> for HidError {
    fn from(abort: WaitAbort) -> Self {
        match abort {
            WaitAbort::Interrupted => HidError::Interrupted,
            WaitAbort::Closed => HidError::Closed,
        }
    }
}

/// Shared state of the report channel
pub struct HidChannel {
    pub(crate) read_queue: RecordQueue,
    pub(crate) write_queue: RecordQueue,
    pub(crate) readiness: WaitQueue,
    pub(crate) pending: PendingWrite,
    pub(crate) events: EventSender,
    pub(crate) max_report: usize,
    kicks: Sender<()>,
    opened: AtomicUsize,
    registrar: Arc<dyn FunctionRegistrar>,
}

impl HidChannel {
    /// Create the channel and the receiving end of its drain kicks
    pub fn new(
        options: HidOptions,
        registrar: Arc<dyn FunctionRegistrar>,
        events: EventSender,
    ) -> (Arc<Self>, Receiver<()>) {
        let (kicks, kick_rx) = async_channel::bounded(1);
        let channel = Arc::new(Self {
            read_queue: RecordQueue::new("read", options.queue_capacity),
            write_queue: RecordQueue::new("write", options.queue_capacity),
            readiness: WaitQueue::new(),
            pending: PendingWrite::default(),
            events,
            max_report: options.max_report,
            kicks,
            opened: AtomicUsize::new(0),
            registrar,
        });
        (channel, kick_rx)
    }

    /// Open the channel; the first open registers the function
    pub fn open(self: &Arc<Self>, nonblocking: bool) -> Result<HidHandle, HidError> {
        if self.readiness.is_closed() {
            return Err(HidError::Closed);
        }

        if self.opened.fetch_add(1, Ordering::SeqCst) == 0 {
            if let Err(e) = self.registrar.register() {
                self.opened.fetch_sub(1, Ordering::SeqCst);
                warn!("Function registration failed: {}", e);
                return Err(HidError::Activation(e));
            }
            info!("Report channel opened, function registered");
            self.events.emit(GadgetEvent::FunctionActivated);
        }

        Ok(HidHandle {
            channel: Arc::clone(self),
            nonblocking: AtomicBool::new(nonblocking),
            interrupted: AtomicBool::new(false),
            waiting: AtomicUsize::new(0),
        })
    }

    fn release(&self) {
        if self.opened.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.registrar.unregister();
            info!("Report channel closed, function unregistered");
            self.events.emit(GadgetEvent::FunctionDeactivated);
        }
    }

    /// Number of open handles
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Queue an inbound report for readers
    ///
    /// Never blocks. A report that does not fit is dropped whole and
    /// `false` is returned.
    pub fn receive(&self, data: &[u8]) -> bool {
        let len = data.len();
        if len == 0 {
            trace!("Ignoring empty inbound report");
            return false;
        }

        match self.read_queue.push(Bytes::copy_from_slice(data)) {
            Ok(()) => {
                trace!("Queued {} byte inbound report", len);
                self.events.emit(GadgetEvent::ReportReceived { len });
                self.readiness.wake_all();
                true
            }
            Err(_) => {
                warn!("Read queue full, dropping {} byte report", len);
                self.events.emit(GadgetEvent::ReportDropped { len });
                false
            }
        }
    }

    /// Current readiness
    pub fn poll(&self) -> Readiness {
        Readiness {
            readable: !self.read_queue.is_empty(),
            writable: !self.write_queue.is_full(),
        }
    }

    /// Wake the drain worker; kicks while it is busy coalesce
    pub(crate) fn schedule_drain(&self) {
        match self.kicks.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Closed(())) => debug!("Drain worker gone, not scheduling"),
        }
    }

    /// Tear the channel down: wake every waiter and stop the drain worker
    pub fn close(&self) {
        self.readiness.close();
        self.kicks.close();
        self.pending.abort();
    }

    pub fn is_closed(&self) -> bool {
        self.readiness.is_closed()
    }
}

/// One open handle on the report channel
///
/// Handles are `Sync`; another thread may call [`HidHandle::interrupt`] to
/// end a blocked read or write.
pub struct HidHandle {
    channel: Arc<HidChannel>,
    nonblocking: AtomicBool,
    interrupted: AtomicBool,
    /// Calls blocked on this handle; interrupts only land while non-zero
    waiting: AtomicUsize,
}

impl HidHandle {
    /// Read one whole report into `buf`
    ///
    /// Fails with [`HidError::BufferTooSmall`] when the next report does not
    /// fit; that report stays queued.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, HidError> {
        let channel = &self.channel;
        let limit = buf.len();
        let attempt = || match channel.read_queue.pop_fitting(limit) {
            PopResult::Record(record) => Some(Ok(record)),
            PopResult::TooLarge { needed } => Some(Err(HidError::BufferTooSmall {
                needed,
                available: limit,
            })),
            PopResult::Empty => None,
        };

        let outcome = if self.is_nonblocking() {
            match attempt() {
                Some(outcome) => outcome,
                None if channel.is_closed() => Err(HidError::Closed),
                None => Err(HidError::WouldBlock),
            }
        } else {
            self.wait(attempt)?
        };

        let record = outcome?;
        // Freed space may unblock the inbound side of a peer
        channel.readiness.wake_all();
        buf[..record.len()].copy_from_slice(&record);
        Ok(record.len())
    }

    /// Queue one whole report for the host
    pub fn write(&self, data: &[u8]) -> Result<usize, HidError> {
        let channel = &self.channel;
        if data.is_empty() {
            return Ok(0);
        }

        let max = channel.max_report.min(channel.write_queue.capacity());
        if data.len() > max {
            return Err(HidError::ReportTooLong {
                len: data.len(),
                max,
            });
        }
        if channel.is_closed() {
            return Err(HidError::Closed);
        }

        let mut record = Some(Bytes::copy_from_slice(data));
        let mut attempt = || {
            let pending = record.take()?;
            match channel.write_queue.push(pending) {
                Ok(()) => Some(()),
                Err(rejected) => {
                    record = Some(rejected);
                    None
                }
            }
        };

        if self.is_nonblocking() {
            attempt().ok_or(HidError::WouldBlock)?;
        } else {
            self.wait(&mut attempt)?;
        }

        channel.schedule_drain();
        Ok(data.len())
    }

    pub fn poll(&self) -> Readiness {
        self.channel.poll()
    }

    /// End a blocked read or write on this handle with
    /// [`HidError::Interrupted`]
    pub fn interrupt(&self) {
        if self.waiting.load(Ordering::SeqCst) == 0 {
            trace!("Interrupt on idle handle ignored");
            return;
        }
        self.interrupted.store(true, Ordering::SeqCst);
        self.channel.readiness.wake_all();
    }

    /// Block until `ready` yields, the handle is interrupted or the channel
    /// closes
    fn wait<T>(&self, ready: impl FnMut() -> Option<T>) -> Result<T, WaitAbort> {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        let result = self.channel.readiness.wait_until(&self.interrupted, ready);
        if self.waiting.fetch_sub(1, Ordering::SeqCst) == 1 {
            // An interrupt that raced a successful wait must not outlive it
            self.interrupted.store(false, Ordering::SeqCst);
        }
        result
    }

    pub fn set_nonblocking(&self, nonblocking: bool) {
        self.nonblocking.store(nonblocking, Ordering::SeqCst);
    }

    pub fn is_nonblocking(&self) -> bool {
        self.nonblocking.load(Ordering::SeqCst)
    }
}

impl Drop for HidHandle {
    fn drop(&mut self) {
        self.channel.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::create_event_channel;
    use common::test_utils::MockRegistrar;

    fn channel(capacity: usize) -> (Arc<HidChannel>, Receiver<()>, Arc<MockRegistrar>) {
        let registrar = Arc::new(MockRegistrar::default());
        let (channel, kicks) = HidChannel::new(
            HidOptions {
                max_report: 64,
                queue_capacity: capacity,
            },
            registrar.clone(),
            EventSender::disconnected(),
        );
        (channel, kicks, registrar)
    }

    #[test]
    fn test_first_open_registers_last_close_unregisters() {
        let (channel, _kicks, registrar) = channel(64);

        let a = channel.open(false).unwrap();
        let b = channel.open(true).unwrap();
        assert_eq!(registrar.registrations(), 1);
        assert_eq!(channel.open_count(), 2);

        drop(a);
        assert_eq!(registrar.unregistrations(), 0);
        drop(b);
        assert_eq!(registrar.unregistrations(), 1);
    }

    #[test]
    fn test_refused_registration_fails_open() {
        let (channel, _kicks, registrar) = channel(64);
        registrar.refuse(true);

        assert!(matches!(channel.open(false), Err(HidError::Activation(_))));
        assert_eq!(channel.open_count(), 0);
    }

    #[test]
    fn test_nonblocking_read_empty() {
        let (channel, _kicks, _) = channel(64);
        let handle = channel.open(true).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(handle.read(&mut buf), Err(HidError::WouldBlock));
    }

    #[test]
    fn test_write_kicks_drain_once() {
        let (channel, kicks, _) = channel(64);
        let handle = channel.open(true).unwrap();

        assert_eq!(handle.write(b"one"), Ok(3));
        assert_eq!(handle.write(b"two"), Ok(3));
        assert_eq!(kicks.len(), 1);
        assert_eq!(channel.write_queue.len(), 2);
    }

    #[test]
    fn test_write_full_queue_would_block() {
        let (channel, _kicks, _) = channel(8);
        let handle = channel.open(true).unwrap();

        handle.write(b"12345678").unwrap();
        assert!(!handle.poll().writable);
        assert_eq!(handle.write(b"9"), Err(HidError::WouldBlock));
    }

    #[test]
    fn test_receive_then_read() {
        let (channel, _kicks, _) = channel(64);
        let handle = channel.open(true).unwrap();

        assert!(channel.receive(b"\x05hello"));
        assert!(handle.poll().readable);

        let mut buf = [0u8; 16];
        let n = handle.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"\x05hello");
    }

    #[test]
    fn test_idle_interrupt_does_not_end_next_read() {
        let (channel, _kicks, _) = channel(64);
        let handle = channel.open(false).unwrap();
        handle.interrupt();

        let feeder = {
            let channel = channel.clone();
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(50));
                channel.receive(b"\x05late")
            })
        };

        let mut buf = [0u8; 16];
        assert_eq!(handle.read(&mut buf), Ok(5));
        assert!(feeder.join().unwrap());
        assert_eq!(&buf[..5], b"\x05late");
    }

    #[test]
    fn test_empty_write_is_noop() {
        let (channel, kicks, _) = channel(64);
        let handle = channel.open(true).unwrap();
        assert_eq!(handle.write(b""), Ok(0));
        assert!(kicks.is_empty());
    }

    #[test]
    fn test_events_on_receive_and_drop() {
        let registrar = Arc::new(MockRegistrar::default());
        let (events, receiver) = create_event_channel(16);
        let (channel, _kicks) = HidChannel::new(
            HidOptions {
                max_report: 64,
                queue_capacity: 4,
            },
            registrar,
            events,
        );

        assert!(channel.receive(b"abcd"));
        assert!(!channel.receive(b"e"));
        assert_eq!(
            receiver.drain(),
            vec![
                GadgetEvent::ReportReceived { len: 4 },
                GadgetEvent::ReportDropped { len: 1 }
            ]
        );
    }
}
