//! Shared readiness wait for the report channel
//!
//! Both record queues have their own locks, so waiting cannot use either of
//! them. Waiters hold the wait lock while evaluating their condition, and
//! wakers take the same lock after changing a queue, which closes the window
//! for a lost wakeup.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};

/// Why a wait ended without its condition holding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitAbort {
    /// The waiter's interrupt flag was raised
    Interrupted,
    /// The channel was closed
    Closed,
}

pub struct WaitQueue {
    generation: Mutex<u64>,
    cond: Condvar,
    closed: AtomicBool,
}

impl WaitQueue {
    pub fn new() -> Self {
        Self {
            generation: Mutex::new(0),
            cond: Condvar::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Wake every waiter so it re-evaluates its condition
    pub fn wake_all(&self) {
        let mut generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        *generation = generation.wrapping_add(1);
        self.cond.notify_all();
    }

    /// Wake every waiter and make all current and future waits end with
    /// [`WaitAbort::Closed`] unless their condition already holds
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.wake_all();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Block until `ready` yields a value
    ///
    /// `ready` is called with the wait lock held. A raised `interrupted` flag
    /// is consumed and ends the wait.
    pub fn wait_until<T>(
        &self,
        interrupted: &AtomicBool,
        mut ready: impl FnMut() -> Option<T>,
    ) -> Result<T, WaitAbort> {
        let mut guard = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(value) = ready() {
                return Ok(value);
            }
            if interrupted.swap(false, Ordering::SeqCst) {
                return Err(WaitAbort::Interrupted);
            }
            if self.is_closed() {
                return Err(WaitAbort::Closed);
            }
            guard = self.cond.wait(guard).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_ready_immediately() {
        let waitq = WaitQueue::new();
        let flag = AtomicBool::new(false);
        assert_eq!(waitq.wait_until(&flag, || Some(5)), Ok(5));
    }

    #[test]
    fn test_wake_after_state_change() {
        let waitq = Arc::new(WaitQueue::new());
        let value = Arc::new(AtomicUsize::new(0));

        let waiter = {
            let waitq = waitq.clone();
            let value = value.clone();
            thread::spawn(move || {
                let flag = AtomicBool::new(false);
                waitq.wait_until(&flag, || match value.load(Ordering::SeqCst) {
                    0 => None,
                    v => Some(v),
                })
            })
        };

        thread::sleep(Duration::from_millis(20));
        value.store(3, Ordering::SeqCst);
        waitq.wake_all();

        assert_eq!(waiter.join().unwrap(), Ok(3));
    }

    #[test]
    fn test_interrupt_is_consumed() {
        let waitq = Arc::new(WaitQueue::new());
        let flag = Arc::new(AtomicBool::new(false));

        let waiter = {
            let waitq = waitq.clone();
            let flag = flag.clone();
            thread::spawn(move || waitq.wait_until(&flag, || None::<()>))
        };

        thread::sleep(Duration::from_millis(20));
        flag.store(true, Ordering::SeqCst);
        waitq.wake_all();

        assert_eq!(waiter.join().unwrap(), Err(WaitAbort::Interrupted));
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_close_ends_wait() {
        let waitq = WaitQueue::new();
        waitq.close();
        let flag = AtomicBool::new(false);
        assert_eq!(waitq.wait_until(&flag, || None::<()>), Err(WaitAbort::Closed));
    }
}
