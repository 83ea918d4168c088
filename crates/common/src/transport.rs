//! Seam between the gadget engine and the USB device controller
//!
//! Transfer buffers move into the transport on [`UsbTransport::submit`] and
//! come back either inside a [`Completion`] or from a successful
//! [`UsbTransport::cancel`]. While the transport holds a buffer nothing else
//! can free or reuse it.

use crate::error::TransportError;
use protocol::{Endpoint, EndpointDescriptor, LinkSpeed, TransferStatus};

/// Identifies one activation of a transfer pool
///
/// Every activation gets a fresh id, so a completion that arrives after its
/// pool was torn down can be recognised and discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolId(pub u64);

/// One slot of one pool activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotHandle {
    pub pool: PoolId,
    pub index: usize,
}

/// What a completion means, dispatched explicitly by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferTag {
    /// Isochronous playback slot, refilled and resubmitted on completion
    AudioSlot(SlotHandle),
    /// The single outstanding outbound report
    HidSend,
    /// Interrupt OUT slot carrying an inbound report
    HidReceive(SlotHandle),
}

/// A transfer handed to the transport
#[derive(Debug)]
pub struct Transfer {
    pub tag: TransferTag,
    /// Buffer; for IN transfers the first `length` bytes are sent
    pub buf: Vec<u8>,
    /// Bytes to send (IN) or buffer space to fill (OUT)
    pub length: usize,
}

impl Transfer {
    pub fn new(tag: TransferTag, buf: Vec<u8>) -> Self {
        let length = buf.len();
        Self { tag, buf, length }
    }

    /// Payload as it goes on the wire
    pub fn payload(&self) -> &[u8] {
        &self.buf[..self.length.min(self.buf.len())]
    }
}

/// A finished (or cancelled) transfer, buffer returned to the engine
#[derive(Debug)]
pub struct Completion {
    pub tag: TransferTag,
    pub status: TransferStatus,
    pub buf: Vec<u8>,
    /// Bytes actually transferred
    pub actual: usize,
}

impl Completion {
    /// Complete `transfer` successfully with its full length
    pub fn completed(transfer: Transfer) -> Self {
        let actual = transfer.length;
        Self {
            tag: transfer.tag,
            status: TransferStatus::Completed,
            buf: transfer.buf,
            actual,
        }
    }

    /// Complete an OUT `transfer` with `data` received from the host
    pub fn received(transfer: Transfer, data: &[u8]) -> Self {
        let mut buf = transfer.buf;
        let actual = data.len().min(transfer.length);
        if buf.len() < actual {
            buf.resize(actual, 0);
        }
        buf[..actual].copy_from_slice(&data[..actual]);
        Self {
            tag: transfer.tag,
            status: TransferStatus::Completed,
            buf,
            actual,
        }
    }

    /// Complete `transfer` with a failure status
    pub fn failed(transfer: Transfer, status: TransferStatus) -> Self {
        Self {
            tag: transfer.tag,
            status,
            buf: transfer.buf,
            actual: 0,
        }
    }

    /// Bytes transferred
    pub fn data(&self) -> &[u8] {
        &self.buf[..self.actual.min(self.buf.len())]
    }
}

/// Device controller operations used by the engine
///
/// Implementations must not call back into the engine from inside these
/// methods; completions are delivered separately.
pub trait UsbTransport: Send + Sync {
    /// Speed negotiated with the host
    fn link_speed(&self) -> LinkSpeed;

    /// Disable an endpoint. Idempotent.
    ///
    /// Transfers still queued on the endpoint are flushed and handed back,
    /// oldest first; the engine resolves them as shut down.
    fn disable(&self, endpoint: Endpoint) -> Vec<Transfer>;

    /// Load the descriptor chosen for the current speed
    fn configure(
        &self,
        endpoint: Endpoint,
        descriptor: &EndpointDescriptor,
    ) -> Result<(), TransportError>;

    /// Enable a configured endpoint
    fn enable(&self, endpoint: Endpoint) -> Result<(), TransportError>;

    /// Queue a transfer. On error the transfer is dropped.
    fn submit(&self, endpoint: Endpoint, transfer: Transfer) -> Result<(), TransportError>;

    /// Dequeue a transfer that has not completed yet, handing its buffer back
    fn cancel(&self, endpoint: Endpoint, tag: TransferTag) -> Result<Transfer, TransportError>;
}

/// Brings the composite function up and down on the bus
pub trait FunctionRegistrar: Send + Sync {
    /// Register the function (first open of the report channel)
    fn register(&self) -> Result<(), TransportError>;

    /// Unregister the function (last close)
    fn unregister(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(index: usize) -> TransferTag {
        TransferTag::AudioSlot(SlotHandle {
            pool: PoolId(1),
            index,
        })
    }

    #[test]
    fn test_payload_respects_length() {
        let mut transfer = Transfer::new(slot(0), vec![7u8; 180]);
        transfer.length = 176;
        assert_eq!(transfer.payload().len(), 176);
    }

    #[test]
    fn test_received_truncates_to_buffer_space() {
        let mut transfer = Transfer::new(TransferTag::HidSend, vec![0u8; 4]);
        transfer.length = 4;
        let completion = Completion::received(transfer, b"abcdef");
        assert_eq!(completion.data(), b"abcd");
        assert!(completion.status.is_ok());
    }

    #[test]
    fn test_failed_has_no_data() {
        let transfer = Transfer::new(slot(2), vec![1u8; 8]);
        let completion = Completion::failed(transfer, TransferStatus::Stall);
        assert!(completion.data().is_empty());
        assert_eq!(completion.tag, slot(2));
    }
}
