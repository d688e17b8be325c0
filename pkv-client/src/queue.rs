//! # Pending-Request Queue
//!
//! Requests written to the socket but not yet answered, in send order.
//! Position in this queue is what ties a response to its caller; the
//! correlation id only validates the pairing.

use std::collections::VecDeque;

/// One request awaiting its response.
#[derive(Debug)]
pub(crate) struct PendingEntry<T> {
    pub id: u32,
    pub caller: T,
}

/// FIFO of outstanding requests.
///
/// Entries leave only through `pop_front` or `drain_with`.
#[derive(Debug)]
pub(crate) struct PendingQueue<T> {
    entries: VecDeque<PendingEntry<T>>,
}

impl<T> PendingQueue<T> {
    pub fn new() -> Self {
        PendingQueue {
            entries: VecDeque::new(),
        }
    }

    pub fn push_back(&mut self, id: u32, caller: T) {
        self.entries.push_back(PendingEntry { id, caller });
    }

    pub fn pop_front(&mut self) -> Option<PendingEntry<T>> {
        self.entries.pop_front()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Removes every entry in send order, handing each to `notify`.
    ///
    /// Returns how many entries were drained.
    pub fn drain_with<F>(&mut self, mut notify: F) -> usize
    where
        F: FnMut(PendingEntry<T>),
    {
        let count = self.entries.len();
        for entry in self.entries.drain(..) {
            notify(entry);
        }
        count
    }
}
