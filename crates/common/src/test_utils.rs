//! Test utilities for accessory-gadget
//!
//! Helpers shared by the unit and integration tests of every crate.
//!
//! # Example
//!
//! ```
//! use common::test_utils::{MockRegistrar, random_records};
//! use common::FunctionRegistrar;
//!
//! let registrar = MockRegistrar::default();
//! registrar.register().unwrap();
//! assert_eq!(registrar.registrations(), 1);
//!
//! let records = random_records(4, 16);
//! assert_eq!(records.len(), 4);
//! assert!(records.iter().all(|r| !r.is_empty() && r.len() <= 16));
//! ```

use crate::error::TransportError;
use crate::transport::FunctionRegistrar;
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Registrar that counts calls and can be told to refuse registration
#[derive(Default)]
pub struct MockRegistrar {
    registered: AtomicUsize,
    unregistered: AtomicUsize,
    refuse: AtomicBool,
}

impl MockRegistrar {
    pub fn registrations(&self) -> usize {
        self.registered.load(Ordering::SeqCst)
    }

    pub fn unregistrations(&self) -> usize {
        self.unregistered.load(Ordering::SeqCst)
    }

    /// Make subsequent `register` calls fail
    pub fn refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

impl FunctionRegistrar for MockRegistrar {
    fn register(&self) -> Result<(), TransportError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Controller("registration refused".to_string()));
        }
        self.registered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn unregister(&self) {
        self.unregistered.fetch_add(1, Ordering::SeqCst);
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// `count` non-empty records of random content, each at most `max_len` bytes
pub fn random_records(count: usize, max_len: usize) -> Vec<Vec<u8>> {
    let mut rng = rand::rng();
    (0..count)
        .map(|_| {
            let len = rng.random_range(1..=max_len.max(1));
            (0..len).map(|_| rng.random::<u8>()).collect()
        })
        .collect()
}
