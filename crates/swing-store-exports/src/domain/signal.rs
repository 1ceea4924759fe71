//! Write-once signal shared between an operation's worker and its waiters.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Single-assignment value with blocking reads.
///
/// The first `resolve` wins. Every `wait` after that returns a clone of the
/// same value without blocking.
#[derive(Debug)]
pub struct OneShot<T> {
    value: Mutex<Option<T>>,
    ready: Condvar,
}

impl<T> Default for OneShot<T> {
    fn default() -> Self {
        Self {
            value: Mutex::new(None),
            ready: Condvar::new(),
        }
    }
}

impl<T: Clone> OneShot<T> {
    /// Create an unresolved signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a signal that is already resolved.
    pub fn resolved(value: T) -> Self {
        Self {
            value: Mutex::new(Some(value)),
            ready: Condvar::new(),
        }
    }

    /// Set the value. Returns `false` if the signal was already resolved, in
    /// which case `value` is dropped.
    pub fn resolve(&self, value: T) -> bool {
        let mut slot = self.value.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(value);
        self.ready.notify_all();
        true
    }

    /// Block until resolved.
    pub fn wait(&self) -> T {
        let mut slot = self.value.lock();
        loop {
            if let Some(value) = slot.as_ref() {
                return value.clone();
            }
            self.ready.wait(&mut slot);
        }
    }

    /// Block until resolved or until `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        let mut slot = self.value.lock();
        if slot.is_none() {
            let _ = self
                .ready
                .wait_while_for(&mut slot, |value| value.is_none(), timeout);
        }
        slot.clone()
    }

    /// Current value, if resolved.
    pub fn try_get(&self) -> Option<T> {
        self.value.lock().clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.value.lock().is_some()
    }
}
