//! HID report bridge
//!
//! Moves whole reports between callers and the interrupt endpoints:
//!
//! - outbound: `HidHandle::write` queues a record, the drain worker sends it
//!   on the interrupt IN endpoint, one transfer at a time
//! - inbound: SET_REPORT payloads and (optionally) interrupt OUT completions
//!   are queued as records for `HidHandle::read`

pub mod channel;
pub mod drain;
pub mod pending;
pub mod queue;
pub mod wait;

pub use channel::{HidChannel, HidHandle, HidOptions, Readiness};
pub use drain::{DrainWorker, spawn_drain_worker};
pub use queue::{PopResult, RecordQueue};
pub use wait::{WaitAbort, WaitQueue};

use crate::error::{GadgetError, LifecycleError};
use crate::lifecycle::StreamInterface;
use common::{
    Completion, EventSender, FunctionRegistrar, SlotHandle, Transfer, TransferTag, UsbTransport,
};
use protocol::{Endpoint, EndpointDescriptor, HID_INTERFACE, HID_MAX_PACKET_SIZE, TransferStatus};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, trace, warn};

/// HID function: report channel plus its endpoints
pub struct HidFunction {
    channel: Arc<HidChannel>,
    transport: Arc<dyn UsbTransport>,
    /// Dedicated interrupt OUT pool, when enabled
    out_stream: Option<StreamInterface>,
    worker: Mutex<Option<DrainWorker>>,
}

impl HidFunction {
    /// Create the channel and start its drain worker
    pub fn bind(
        options: HidOptions,
        out_transfers: Option<usize>,
        transport: Arc<dyn UsbTransport>,
        registrar: Arc<dyn FunctionRegistrar>,
        events: EventSender,
    ) -> Result<Self, GadgetError> {
        let (channel, kicks) = HidChannel::new(options, registrar, events);
        let worker = spawn_drain_worker(Arc::clone(&channel), Arc::clone(&transport), kicks)?;

        let out_stream = out_transfers.map(|slots| {
            StreamInterface::new(
                "HID interrupt OUT",
                HID_INTERFACE,
                Endpoint::HidOut,
                slots,
                usize::from(HID_MAX_PACKET_SIZE),
                TransferTag::HidReceive,
                Arc::clone(&transport),
            )
        });

        Ok(Self {
            channel,
            transport,
            out_stream,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn channel(&self) -> &Arc<HidChannel> {
        &self.channel
    }

    /// Select the (only) alternate setting, restarting the endpoints
    pub fn set_alt(&self, alt: u8) -> Result<(), LifecycleError> {
        if alt != 0 {
            return Err(LifecycleError::InvalidAlt {
                interface: HID_INTERFACE,
                alt,
            });
        }

        self.reclaim_send();
        let endpoint = Endpoint::HidIn;
        self.disable_send();
        let descriptor = EndpointDescriptor::for_speed(endpoint, self.transport.link_speed());
        self.transport
            .configure(endpoint, &descriptor)
            .map_err(|source| LifecycleError::Configure { endpoint, source })?;
        self.transport
            .enable(endpoint)
            .map_err(|source| LifecycleError::Enable { endpoint, source })?;

        if let Some(out) = &self.out_stream
            && let Err(e) = out.activate()
        {
            warn!("Report OUT activation failed: {}", e);
            self.disable_send();
            return Err(e);
        }

        info!("HID interface up at {} speed", self.transport.link_speed());
        // Reports queued while the endpoint was down
        self.channel.schedule_drain();
        Ok(())
    }

    /// Take the endpoints down
    pub fn deactivate(&self) {
        self.reclaim_send();
        self.disable_send();
        if let Some(out) = &self.out_stream {
            out.deactivate();
        }
    }

    /// Cancel an in-flight report and release the drain worker waiting on it
    fn reclaim_send(&self) {
        match self.transport.cancel(Endpoint::HidIn, TransferTag::HidSend) {
            Ok(transfer) => {
                debug!("Cancelled in-flight report");
                self.channel
                    .pending
                    .complete(Completion::failed(transfer, TransferStatus::Cancelled));
            }
            Err(e) => trace!("No in-flight report: {}", e),
        }
    }

    /// Disable the IN endpoint, resolving a report the disable flushed
    ///
    /// The drain worker can submit between the cancel and the disable.
    fn disable_send(&self) {
        for transfer in self.transport.disable(Endpoint::HidIn) {
            if transfer.tag == TransferTag::HidSend {
                debug!("In-flight report flushed by disable");
                self.channel
                    .pending
                    .complete(Completion::failed(transfer, TransferStatus::Shutdown));
            }
        }
    }

    /// Interrupt IN completion
    pub fn complete_send(&self, completion: Completion) {
        self.channel.pending.complete(completion);
    }

    /// Interrupt OUT completion for `slot`
    pub fn complete_receive(&self, slot: SlotHandle, completion: Completion) {
        let Some(out) = &self.out_stream else {
            debug!("Interrupt OUT completion without an OUT endpoint");
            return;
        };
        if !out.is_current(slot) {
            trace!("Dropping completion from released pool {:?}", slot.pool);
            return;
        }
        if !completion.status.is_ok() {
            warn!(
                "Interrupt OUT slot {} ended with {:?}, not resubmitting",
                slot.index, completion.status
            );
            return;
        }

        self.channel.receive(completion.data());

        let mut buf = completion.buf;
        buf.resize(out.slot_len(), 0);
        match out.resubmit(slot, Transfer::new(completion.tag, buf)) {
            Ok(_) => {}
            Err(e) => warn!("Interrupt OUT slot {} resubmit failed: {}", slot.index, e),
        }
    }

    /// Close the channel and stop the drain worker
    pub fn shutdown(&self) {
        self.channel.close();
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut worker) = worker {
            worker.join();
        }
        self.deactivate();
    }
}

impl Drop for HidFunction {
    fn drop(&mut self) {
        // The worker holds the channel; it only exits once the channel closes
        self.shutdown();
    }
}
