//! Module `ring_buffer`
//!
//! Fixed-capacity, time-stamped circular buffer used as the per-realm log
//! store. Writers (the realm connection) and readers (the harvester) share
//! one buffer through an internal mutex.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// An item together with the instant it was written into the buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Timed<T> {
    pub at: Instant,
    pub item: T,
}

struct Slots<T> {
    slots: Vec<Option<Timed<T>>>,
    // next slot to write
    first: usize,
    // oldest retained slot
    last: usize,
    full: bool,
    // stamp of the most recent push, kept across `clear`
    latest: Option<Instant>,
}

impl<T> Slots<T> {
    fn len(&self) -> usize {
        let capacity = self.slots.len();
        if self.full {
            capacity
        } else if self.first >= self.last {
            self.first - self.last
        } else {
            capacity + self.first - self.last
        }
    }

    /// Stamp for an item pushed at `at`: strictly later than every earlier
    /// stamp.
    fn next_stamp(&mut self, at: Instant) -> Instant {
        let at = match self.latest {
            Some(latest) if latest >= at => latest + Duration::from_nanos(1),
            _ => at,
        };
        self.latest = Some(at);
        at
    }
}

/// Circular buffer retaining at most `capacity` items, ordered by write time.
///
/// Once full, each new item silently replaces the oldest one.
pub struct TimedRingBuffer<T> {
    inner: Mutex<Slots<T>>,
    capacity: usize,
}

impl<T: Clone> TimedRingBuffer<T> {
    /// Creates a buffer with all `capacity` slots allocated up front.
    ///
    /// A zero capacity is bumped to one so the index arithmetic stays valid.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            inner: Mutex::new(Slots {
                slots,
                first: 0,
                last: 0,
                full: false,
                latest: None,
            }),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends an item stamped with the current instant.
    pub fn push(&self, item: T) {
        self.push_at(item, Instant::now());
    }

    /// Appends an item stamped with `at`.
    ///
    /// Stamps are strictly increasing: an instant not later than the previous
    /// push is moved to just after it, so a checkpoint taken from a returned
    /// stamp never hides a later push.
    pub fn push_at(&self, item: T, at: Instant) {
        let mut slots = self.lock();
        let at = slots.next_stamp(at);

        let index = slots.first;
        slots.slots[index] = Some(Timed { at, item });
        slots.first = (slots.first + 1) % self.capacity;

        if slots.full {
            slots.last = (slots.last + 1) % self.capacity;
        } else {
            slots.full = slots.first == slots.last;
        }
    }

    /// Number of retained items.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns every retained item stamped strictly after `after`, newest first.
    ///
    /// The scan walks backward from the newest slot and stops at the first
    /// item that is not newer than `after`.
    pub fn get_all_after(&self, after: Instant) -> Vec<Timed<T>> {
        self.collect_newer(Some(after))
    }

    /// Returns every retained item, newest first.
    pub fn get_all(&self) -> Vec<Timed<T>> {
        self.collect_newer(None)
    }

    fn collect_newer(&self, after: Option<Instant>) -> Vec<Timed<T>> {
        let slots = self.lock();
        let count = slots.len();
        let mut result = Vec::with_capacity(count);

        for step in 1..=count {
            let index = (slots.first + self.capacity - step) % self.capacity;
            match &slots.slots[index] {
                Some(timed) if after.is_none_or(|after| timed.at > after) => {
                    result.push(timed.clone())
                }
                _ => break,
            }
        }

        result
    }

    /// Forgets every item without releasing the slot storage.
    pub fn clear(&self) {
        let mut slots = self.lock();
        slots.first = 0;
        slots.last = 0;
        slots.full = false;
    }

    fn lock(&self) -> MutexGuard<'_, Slots<T>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
