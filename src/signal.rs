//! Single-slot task synchronisation.
//!
//! [`Mailbox`] holds at most one value: posting overwrites whatever the
//! consumer has not taken yet, so a slow consumer always sees the latest
//! value and never a backlog. [`Signal`] is the value-less form used for
//! "new data" notifications.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Single-slot mailbox with overwrite semantics.
#[derive(Debug)]
pub struct Mailbox<T> {
    slot: Mutex<Option<T>>,
    ready: Condvar,
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Mailbox<T> {
    /// Create an empty mailbox.
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a value, replacing any value not yet taken.
    ///
    /// Returns `true` if an untaken value was overwritten.
    pub fn post(&self, value: T) -> bool {
        let replaced = self.lock().replace(value).is_some();
        self.ready.notify_all();
        replaced
    }

    /// Take the value without waiting.
    pub fn take(&self) -> Option<T> {
        self.lock().take()
    }

    /// Check whether a value is waiting.
    pub fn is_full(&self) -> bool {
        self.lock().is_some()
    }

    /// Wait up to `timeout` for a value and take it.
    pub fn wait_take(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.lock();
        loop {
            if let Some(value) = slot.take() {
                return Some(value);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            slot = self
                .ready
                .wait_timeout(slot, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

/// One-shot "new data" flag: set/clear, never counting.
#[derive(Debug, Default)]
pub struct Signal(Mailbox<()>);

impl Signal {
    /// Create a cleared signal.
    pub fn new() -> Self {
        Self(Mailbox::new())
    }

    /// Raise the signal. Raising an already raised signal is a no-op.
    pub fn set(&self) {
        self.0.post(());
    }

    /// Consume the signal if raised.
    pub fn take(&self) -> bool {
        self.0.take().is_some()
    }

    /// Check the signal without consuming it.
    pub fn is_set(&self) -> bool {
        self.0.is_full()
    }

    /// Wait up to `timeout` for the signal and consume it.
    pub fn wait(&self, timeout: Duration) -> bool {
        self.0.wait_take(timeout).is_some()
    }
}
