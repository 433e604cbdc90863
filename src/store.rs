//! Most recent validated reading, shared between tasks.
//!
//! The acquisition task is the only writer. Readers (radio notify, display,
//! HTTP snapshot) copy the sample out by value. The slot is a `Copy` value
//! swapped inside a scoped critical section, so a reader sees either the
//! previous complete sample or the new one, and never waits on a lock held
//! across I/O.
//!
//! Consumers that react to new data call [`ReadingStore::subscribe`] to get
//! their own single-slot [`Signal`]; every replace raises all of them.

use crate::sensor::Sample;
use crate::signal::Signal;
use std::cell::Cell;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    sample: Option<Sample>,
    generation: u32,
}

/// Single-value reading store with replace-then-signal semantics.
pub struct ReadingStore {
    slot: critical_section::Mutex<Cell<Slot>>,
    subscribers: Mutex<Vec<Arc<Signal>>>,
}

impl Default for ReadingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadingStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            slot: critical_section::Mutex::new(Cell::new(Slot::default())),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Store `sample` and raise every subscriber's signal.
    ///
    /// Returns the new generation number.
    pub fn replace(&self, sample: Sample) -> u32 {
        let generation = critical_section::with(|cs| {
            let cell = self.slot.borrow(cs);
            let slot = Slot {
                sample: Some(sample),
                generation: cell.get().generation.wrapping_add(1),
            };
            cell.set(slot);
            slot.generation
        });

        for signal in self.lock_subscribers().iter() {
            signal.set();
        }
        generation
    }

    /// Latest sample, if any cycle has succeeded yet.
    pub fn current(&self) -> Option<Sample> {
        self.snapshot().0
    }

    /// Latest sample together with its generation.
    pub fn snapshot(&self) -> (Option<Sample>, u32) {
        let slot = critical_section::with(|cs| self.slot.borrow(cs).get());
        (slot.sample, slot.generation)
    }

    /// Number of successful replaces so far (wrapping).
    pub fn generation(&self) -> u32 {
        self.snapshot().1
    }

    /// Register a new-data signal.
    ///
    /// The signal starts raised if the store already holds a sample, so a
    /// late subscriber still renders the current value once.
    pub fn subscribe(&self) -> Arc<Signal> {
        let signal = Arc::new(Signal::new());
        if self.current().is_some() {
            signal.set();
        }
        self.lock_subscribers().push(signal.clone());
        signal
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Vec<Arc<Signal>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
