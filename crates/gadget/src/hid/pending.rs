//! Completion signal for the single in-flight outbound report

use common::Completion;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Default)]
struct PendingState {
    completion: Option<Completion>,
    in_flight: bool,
    aborted: bool,
}

/// Reset-then-wait signal; at most one transfer is in flight at a time
#[derive(Default)]
pub struct PendingWrite {
    state: Mutex<PendingState>,
    done: Condvar,
}

impl PendingWrite {
    fn state(&self) -> MutexGuard<'_, PendingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arm the signal before submitting; must precede the submit so an
    /// immediate completion is not lost
    pub fn reset(&self) {
        let mut state = self.state();
        state.completion = None;
        state.in_flight = true;
    }

    /// Disarm after a submit that was refused
    pub fn disarm(&self) {
        self.state().in_flight = false;
    }

    /// Deliver the completion of the in-flight transfer
    ///
    /// Returns false for a completion nobody is waiting for.
    pub fn complete(&self, completion: Completion) -> bool {
        let mut state = self.state();
        if !state.in_flight {
            debug!("Ignoring send completion with nothing in flight");
            return false;
        }
        state.in_flight = false;
        state.completion = Some(completion);
        self.done.notify_all();
        true
    }

    /// Block until the in-flight transfer completes; `None` once aborted
    pub fn wait(&self) -> Option<Completion> {
        let mut state = self.state();
        loop {
            if let Some(completion) = state.completion.take() {
                return Some(completion);
            }
            if state.aborted {
                return None;
            }
            state = self.done.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Permanently end all current and future waits
    pub fn abort(&self) {
        self.state().aborted = true;
        self.done.notify_all();
    }

    pub fn in_flight(&self) -> bool {
        self.state().in_flight
    }
}
