//! Transfer pool owned by one activation of a streaming interface

use crate::error::LifecycleError;
use common::{PoolId, SlotHandle, Transfer, TransferTag, TransportError, UsbTransport};
use protocol::Endpoint;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Fixed set of self-resubmitting transfer slots
///
/// While a slot is queued its buffer belongs to the transport. Dropping the
/// pool cancels every slot still queued, so no buffer of this activation can
/// be completed into a later one.
pub struct TransferPool {
    id: PoolId,
    endpoint: Endpoint,
    slots: usize,
    tag: fn(SlotHandle) -> TransferTag,
    transport: Arc<dyn UsbTransport>,
}

impl TransferPool {
    pub fn new(
        id: PoolId,
        endpoint: Endpoint,
        slots: usize,
        tag: fn(SlotHandle) -> TransferTag,
        transport: Arc<dyn UsbTransport>,
    ) -> Self {
        Self {
            id,
            endpoint,
            slots,
            tag,
            transport,
        }
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    pub fn handle(&self, index: usize) -> SlotHandle {
        SlotHandle {
            pool: self.id,
            index,
        }
    }

    /// Submit every slot once with a zeroed `slot_len` byte buffer
    pub fn prime(&self, slot_len: usize) -> Result<(), LifecycleError> {
        for index in 0..self.slots {
            let tag = (self.tag)(self.handle(index));
            self.transport
                .submit(self.endpoint, Transfer::new(tag, vec![0u8; slot_len]))
                .map_err(|source| LifecycleError::Prime {
                    endpoint: self.endpoint,
                    slot: index,
                    source,
                })?;
            trace!("Primed slot {} of pool {:?} on {}", index, self.id, self.endpoint);
        }
        Ok(())
    }
}

impl Drop for TransferPool {
    fn drop(&mut self) {
        let mut reclaimed = 0;
        for index in 0..self.slots {
            let tag = (self.tag)(self.handle(index));
            match self.transport.cancel(self.endpoint, tag) {
                Ok(_transfer) => reclaimed += 1,
                Err(TransportError::NotQueued(_)) => {
                    trace!("Slot {} of pool {:?} not queued", index, self.id)
                }
                Err(e) => warn!("Failed to cancel slot {} on {}: {}", index, self.endpoint, e),
            }
        }
        debug!(
            "Released pool {:?} on {}, reclaimed {}/{} buffers",
            self.id, self.endpoint, reclaimed, self.slots
        );
    }
}
