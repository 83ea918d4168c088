//! Endpoint lifecycle
//!
//! Per-interface alternate setting state machine. Entering ACTIVE brings the
//! endpoint up for the negotiated speed and primes a fresh transfer pool;
//! leaving it cancels every queued slot before the endpoint is disabled.
//! Each activation gets a new pool id, so completions from an earlier
//! activation are recognised and dropped.

pub mod pool;

pub use pool::TransferPool;

use crate::error::LifecycleError;
use common::{PoolId, SlotHandle, Transfer, TransferTag, TransportError, UsbTransport};
use protocol::{Endpoint, EndpointDescriptor};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Alternate setting of a streaming interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AltSettingState {
    /// Alt 0: no bandwidth, no transfers
    #[default]
    Inactive,
    /// Alt 1: endpoint enabled, pool primed
    Active,
}

impl AltSettingState {
    pub fn alt(self) -> u8 {
        match self {
            AltSettingState::Inactive => 0,
            AltSettingState::Active => 1,
        }
    }
}

struct StreamState {
    pool: Option<TransferPool>,
    next_id: u64,
}

/// Endpoint and transfer pool of one streaming interface
pub struct StreamInterface {
    name: &'static str,
    interface: u8,
    endpoint: Endpoint,
    slots: usize,
    slot_len: usize,
    tag: fn(SlotHandle) -> TransferTag,
    transport: Arc<dyn UsbTransport>,
    state: Mutex<StreamState>,
    /// Id of the live pool, 0 when inactive; read without the lock on the
    /// completion path
    current: AtomicU64,
}

impl StreamInterface {
    pub fn new(
        name: &'static str,
        interface: u8,
        endpoint: Endpoint,
        slots: usize,
        slot_len: usize,
        tag: fn(SlotHandle) -> TransferTag,
        transport: Arc<dyn UsbTransport>,
    ) -> Self {
        Self {
            name,
            interface,
            endpoint,
            slots,
            slot_len,
            tag,
            transport,
            state: Mutex::new(StreamState {
                pool: None,
                next_id: 0,
            }),
            current: AtomicU64::new(0),
        }
    }

    fn state(&self) -> MutexGuard<'_, StreamState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a host alternate setting selection
    pub fn set_alt(&self, alt: u8) -> Result<(), LifecycleError> {
        match alt {
            0 => {
                self.deactivate();
                Ok(())
            }
            1 => self.activate(),
            _ => Err(LifecycleError::InvalidAlt {
                interface: self.interface,
                alt,
            }),
        }
    }

    pub fn alt_state(&self) -> AltSettingState {
        if self.current.load(Ordering::SeqCst) == 0 {
            AltSettingState::Inactive
        } else {
            AltSettingState::Active
        }
    }

    /// Bring the endpoint up and prime a fresh pool
    ///
    /// On failure the interface is left INACTIVE with the endpoint disabled.
    pub fn activate(&self) -> Result<(), LifecycleError> {
        let mut state = self.state();
        if let Some(old) = state.pool.take() {
            debug!("{} re-selected while active, releasing old pool", self.name);
            self.current.store(0, Ordering::SeqCst);
            drop(old);
        }

        let endpoint = self.endpoint;
        self.flush(endpoint);

        let speed = self.transport.link_speed();
        let descriptor = EndpointDescriptor::for_speed(endpoint, speed);
        self.transport
            .configure(endpoint, &descriptor)
            .map_err(|source| LifecycleError::Configure { endpoint, source })?;
        self.transport
            .enable(endpoint)
            .map_err(|source| LifecycleError::Enable { endpoint, source })?;

        state.next_id += 1;
        let pool = TransferPool::new(
            PoolId(state.next_id),
            endpoint,
            self.slots,
            self.tag,
            Arc::clone(&self.transport),
        );
        self.current.store(pool.id().0, Ordering::SeqCst);

        if let Err(e) = pool.prime(self.slot_len) {
            warn!("{} activation failed: {}", self.name, e);
            self.current.store(0, Ordering::SeqCst);
            drop(pool);
            self.flush(endpoint);
            return Err(e);
        }

        info!(
            "{} active: {} x {} byte transfers on {} at {} speed",
            self.name, self.slots, self.slot_len, endpoint, speed
        );
        state.pool = Some(pool);
        Ok(())
    }

    /// Cancel every queued slot, then disable the endpoint
    pub fn deactivate(&self) {
        let mut state = self.state();
        if let Some(pool) = state.pool.take() {
            self.current.store(0, Ordering::SeqCst);
            drop(pool);
            info!("{} inactive", self.name);
        }
        self.flush(self.endpoint);
    }

    /// Disable the endpoint; flushed slots die with their pool
    fn flush(&self, endpoint: Endpoint) {
        let flushed = self.transport.disable(endpoint);
        if !flushed.is_empty() {
            debug!("{} dropped {} flushed transfers", self.name, flushed.len());
        }
    }

    /// Whether `handle` belongs to the live pool
    pub fn is_current(&self, handle: SlotHandle) -> bool {
        let current = self.current.load(Ordering::SeqCst);
        current != 0 && handle.pool.0 == current
    }

    /// Resubmit a completed slot, unless its pool has been released meanwhile
    ///
    /// Returns `Ok(false)` when the slot was stale and its buffer dropped.
    pub fn resubmit(&self, handle: SlotHandle, transfer: Transfer) -> Result<bool, TransportError> {
        let state = self.state();
        match &state.pool {
            Some(pool) if pool.id() == handle.pool => {
                self.transport.submit(self.endpoint, transfer)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Buffer length of each slot
    pub fn slot_len(&self) -> usize {
        self.slot_len
    }

    pub fn slots(&self) -> usize {
        self.slots
    }
}
