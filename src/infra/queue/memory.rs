//! In-memory pending queue with two priority classes.

use std::collections::VecDeque;

use crate::util::serde::Priority;

/// Pending queue ordered by priority class, FIFO within a class.
///
/// Every `High` entry is dequeued before any `Normal` entry. A new `High`
/// entry lands behind previously queued `High` entries, which is the same
/// ordering as inserting it at the front of the `Normal` section.
/// All operations are O(1) except [`ClassQueue::truncate`] and
/// [`ClassQueue::drain`], which are linear in the removed count.
#[derive(Debug)]
pub struct ClassQueue<T> {
    high: VecDeque<T>,
    normal: VecDeque<T>,
}

impl<T> ClassQueue<T> {
    /// Create an empty queue.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            high: VecDeque::new(),
            normal: VecDeque::new(),
        }
    }

    /// Append an entry to the tail of its class.
    pub fn push(&mut self, priority: Priority, item: T) {
        match priority {
            Priority::High => self.high.push_back(item),
            Priority::Normal => self.normal.push_back(item),
        }
    }

    /// Remove the next entry to admit.
    pub fn pop(&mut self) -> Option<T> {
        self.high.pop_front().or_else(|| self.normal.pop_front())
    }

    /// Total pending entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.high.len() + self.normal.len()
    }

    /// True when nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.high.is_empty() && self.normal.is_empty()
    }

    /// Pending entries of one class.
    #[must_use]
    pub fn len_of(&self, priority: Priority) -> usize {
        match priority {
            Priority::High => self.high.len(),
            Priority::Normal => self.normal.len(),
        }
    }

    /// Keep the first `keep` entries in admission order and return the rest.
    ///
    /// Newest `Normal` entries go first, then newest `High` entries.
    pub fn truncate(&mut self, keep: usize) -> Vec<T> {
        if self.len() <= keep {
            return Vec::new();
        }
        let keep_high = keep.min(self.high.len());
        let keep_normal = keep - keep_high;
        let mut removed: Vec<T> = self.high.split_off(keep_high).into();
        removed.extend(self.normal.split_off(keep_normal));
        removed
    }

    /// Remove every entry in admission order.
    pub fn drain(&mut self) -> Vec<T> {
        let mut all: Vec<T> = self.high.drain(..).collect();
        all.extend(self.normal.drain(..));
        all
    }
}

impl<T> Default for ClassQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
