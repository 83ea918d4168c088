//! HID drain worker
//!
//! Dedicated thread that moves queued outbound reports onto the interrupt IN
//! endpoint, one transfer at a time. Writers kick it through a one-slot
//! channel, so any number of kicks while it is busy collapse into a single
//! pending pass.

use super::channel::HidChannel;
use async_channel::Receiver;
use common::{GadgetEvent, Transfer, TransferTag, UsbTransport};
use protocol::Endpoint;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Handle to the running drain thread
pub struct DrainWorker {
    handle: Option<JoinHandle<()>>,
}

impl DrainWorker {
    /// Wait for the thread to exit
    ///
    /// The channel must be closed first, otherwise this blocks forever.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("HID drain worker panicked");
        }
    }
}

impl Drop for DrainWorker {
    fn drop(&mut self) {
        self.join();
    }
}

struct DrainLoop {
    channel: Arc<HidChannel>,
    transport: Arc<dyn UsbTransport>,
    kicks: Receiver<()>,
    /// Transfer buffer, reused across reports
    buf: Vec<u8>,
}

impl DrainLoop {
    fn run(mut self) {
        info!("HID drain worker started");

        while self.kicks.recv_blocking().is_ok() {
            if !self.drain() {
                break;
            }
        }

        info!("HID drain worker stopped");
    }

    /// Send records until the write queue is empty
    ///
    /// Returns false once the channel has been torn down.
    fn drain(&mut self) -> bool {
        while let Some(record) = self.channel.write_queue.pop() {
            self.channel.readiness.wake_all();

            let len = record.len();
            let mut buf = std::mem::take(&mut self.buf);
            buf.clear();
            buf.extend_from_slice(&record);

            let pending = &self.channel.pending;
            pending.reset();
            if let Err(e) = self
                .transport
                .submit(Endpoint::HidIn, Transfer::new(TransferTag::HidSend, buf))
            {
                pending.disarm();
                warn!("Dropping {} byte report, submit failed: {}", len, e);
                return true;
            }

            match pending.wait() {
                Some(completion) => {
                    if completion.status.is_ok() {
                        trace!("Sent {} byte report", len);
                        self.channel.events.emit(GadgetEvent::ReportSent { len });
                    } else {
                        warn!("Report send ended with {:?}", completion.status);
                    }
                    self.buf = completion.buf;
                }
                None => {
                    match self.transport.cancel(Endpoint::HidIn, TransferTag::HidSend) {
                        Ok(transfer) => {
                            debug!("Cancelled in-flight report on shutdown");
                            self.buf = transfer.buf;
                        }
                        Err(e) => debug!("No report to cancel on shutdown: {}", e),
                    }
                    return false;
                }
            }
        }
        true
    }
}

/// Spawn the drain thread for `channel`
pub fn spawn_drain_worker(
    channel: Arc<HidChannel>,
    transport: Arc<dyn UsbTransport>,
    kicks: Receiver<()>,
) -> std::io::Result<DrainWorker> {
    let buf = Vec::with_capacity(channel.max_report);
    let drain = DrainLoop {
        channel,
        transport,
        kicks,
        buf,
    };

    let handle = std::thread::Builder::new()
        .name("hid-drain".to_string())
        .spawn(move || drain.run())?;

    Ok(DrainWorker {
        handle: Some(handle),
    })
}
