//! In-process loopback transport
//!
//! Stands in for a device controller: submitted transfers wait in per-endpoint
//! queues until the "host" side takes them and hands them back to the engine
//! as completions. Used by the simulation binary and by tests, which can also
//! inject configure/enable/submit failures.

use crate::error::TransportError;
use crate::transport::{Transfer, TransferTag, UsbTransport};
use protocol::{Endpoint, EndpointDescriptor, LinkSpeed};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Default)]
struct LoopbackState {
    enabled: HashSet<Endpoint>,
    configured: HashMap<Endpoint, EndpointDescriptor>,
    queues: HashMap<Endpoint, VecDeque<Transfer>>,
    /// Whether accepted IN payloads are logged
    record: bool,
    /// Payload of every accepted IN submission while recording, in order
    submitted: HashMap<Endpoint, Vec<Vec<u8>>>,
    fail_configure: HashSet<Endpoint>,
    fail_enable: HashSet<Endpoint>,
    /// Remaining submissions accepted before failures start
    submit_budget: HashMap<Endpoint, usize>,
    cancelled: usize,
}

/// Loopback device controller
pub struct LoopbackTransport {
    speed: LinkSpeed,
    state: Mutex<LoopbackState>,
    queued: Condvar,
}

impl LoopbackTransport {
    pub fn new(speed: LinkSpeed) -> Self {
        Self {
            speed,
            state: Mutex::new(LoopbackState::default()),
            queued: Condvar::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of transfers waiting on `endpoint`
    pub fn pending(&self, endpoint: Endpoint) -> usize {
        self.state().queues.get(&endpoint).map_or(0, VecDeque::len)
    }

    /// Tags of the transfers waiting on `endpoint`, oldest first
    pub fn pending_tags(&self, endpoint: Endpoint) -> Vec<TransferTag> {
        self.state()
            .queues
            .get(&endpoint)
            .map(|q| q.iter().map(|t| t.tag).collect())
            .unwrap_or_default()
    }

    /// Host side: take the oldest transfer queued on `endpoint`
    pub fn take(&self, endpoint: Endpoint) -> Option<Transfer> {
        self.state()
            .queues
            .get_mut(&endpoint)
            .and_then(VecDeque::pop_front)
    }

    /// Host side: wait up to `timeout` for a transfer on `endpoint`
    pub fn wait_take(&self, endpoint: Endpoint, timeout: Duration) -> Option<Transfer> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state();
        loop {
            if let Some(transfer) = state.queues.get_mut(&endpoint).and_then(VecDeque::pop_front) {
                return Some(transfer);
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let (guard, _) = self
                .queued
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    /// Log accepted IN payloads for [`Self::submitted_payloads`]
    ///
    /// Off by default; turning it off drops the log.
    pub fn record_submissions(&self, record: bool) {
        let mut state = self.state();
        state.record = record;
        if !record {
            state.submitted.clear();
        }
    }

    /// Payloads of every IN transfer accepted on `endpoint` while recording
    pub fn submitted_payloads(&self, endpoint: Endpoint) -> Vec<Vec<u8>> {
        self.state()
            .submitted
            .get(&endpoint)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of successful cancellations
    pub fn cancelled(&self) -> usize {
        self.state().cancelled
    }

    pub fn is_enabled(&self, endpoint: Endpoint) -> bool {
        self.state().enabled.contains(&endpoint)
    }

    /// Descriptor loaded by the last successful configure
    pub fn descriptor(&self, endpoint: Endpoint) -> Option<EndpointDescriptor> {
        self.state().configured.get(&endpoint).copied()
    }

    pub fn fail_configure(&self, endpoint: Endpoint, fail: bool) {
        let mut state = self.state();
        if fail {
            state.fail_configure.insert(endpoint);
        } else {
            state.fail_configure.remove(&endpoint);
        }
    }

    pub fn fail_enable(&self, endpoint: Endpoint, fail: bool) {
        let mut state = self.state();
        if fail {
            state.fail_enable.insert(endpoint);
        } else {
            state.fail_enable.remove(&endpoint);
        }
    }

    /// Accept `budget` more submissions on `endpoint`, then refuse; `None`
    /// removes the limit
    pub fn limit_submissions(&self, endpoint: Endpoint, budget: Option<usize>) {
        let mut state = self.state();
        match budget {
            Some(n) => state.submit_budget.insert(endpoint, n),
            None => state.submit_budget.remove(&endpoint),
        };
    }
}

impl UsbTransport for LoopbackTransport {
    fn link_speed(&self) -> LinkSpeed {
        self.speed
    }

    fn disable(&self, endpoint: Endpoint) -> Vec<Transfer> {
        let mut state = self.state();
        state.enabled.remove(&endpoint);
        let flushed: Vec<Transfer> = state
            .queues
            .get_mut(&endpoint)
            .map(|queue| queue.drain(..).collect())
            .unwrap_or_default();
        if !flushed.is_empty() {
            trace!("Flushing {} transfers from {}", flushed.len(), endpoint);
        }
        flushed
    }

    fn configure(
        &self,
        endpoint: Endpoint,
        descriptor: &EndpointDescriptor,
    ) -> Result<(), TransportError> {
        let mut state = self.state();
        if state.fail_configure.contains(&endpoint) {
            return Err(TransportError::Unconfigurable(endpoint));
        }
        state.configured.insert(endpoint, *descriptor);
        Ok(())
    }

    fn enable(&self, endpoint: Endpoint) -> Result<(), TransportError> {
        let mut state = self.state();
        if state.fail_enable.contains(&endpoint) {
            return Err(TransportError::Controller(format!(
                "enable refused on {}",
                endpoint
            )));
        }
        if !state.configured.contains_key(&endpoint) {
            return Err(TransportError::Unconfigurable(endpoint));
        }
        state.enabled.insert(endpoint);
        Ok(())
    }

    fn submit(&self, endpoint: Endpoint, transfer: Transfer) -> Result<(), TransportError> {
        let mut state = self.state();
        if !state.enabled.contains(&endpoint) {
            return Err(TransportError::Disabled(endpoint));
        }
        if let Some(budget) = state.submit_budget.get_mut(&endpoint) {
            if *budget == 0 {
                return Err(TransportError::Controller("queue refused".to_string()));
            }
            *budget -= 1;
        }
        if state.record && endpoint.is_in() {
            let payload = transfer.payload().to_vec();
            state.submitted.entry(endpoint).or_default().push(payload);
        }
        state.queues.entry(endpoint).or_default().push_back(transfer);
        drop(state);
        self.queued.notify_all();
        Ok(())
    }

    fn cancel(&self, endpoint: Endpoint, tag: TransferTag) -> Result<Transfer, TransportError> {
        let mut state = self.state();
        let queue = state
            .queues
            .get_mut(&endpoint)
            .ok_or(TransportError::NotQueued(endpoint))?;
        let position = queue
            .iter()
            .position(|t| t.tag == tag)
            .ok_or(TransportError::NotQueued(endpoint))?;
        let transfer = queue
            .remove(position)
            .ok_or(TransportError::NotQueued(endpoint))?;
        state.cancelled += 1;
        Ok(transfer)
    }
}
