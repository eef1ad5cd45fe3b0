//! Bounded, round-oriented conversation history.
//!
//! Capacity is expressed in whole rounds (`max_rounds * messages_per_round`
//! messages) and enforced on every write by dropping the oldest entries, so a
//! reader never sees more than the configured capacity. All operations run
//! under one lock and never hold it across I/O.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::core::message::Message;

pub const DEFAULT_MAX_ROUNDS: i64 = 10;
pub const DEFAULT_MESSAGES_PER_ROUND: i64 = 2;

#[derive(Debug)]
pub struct ConversationHistory<T = Message> {
    max_rounds: usize,
    messages_per_round: usize,
    capacity: usize,
    entries: Mutex<VecDeque<T>>,
}

impl<T: Clone> ConversationHistory<T> {
    /// Negative `max_rounds` clamps to 0 (nothing is retained) and
    /// `messages_per_round` below 1 clamps to 1.
    pub fn new(max_rounds: i64, messages_per_round: i64) -> Self {
        let max_rounds = clamp_non_negative(max_rounds);
        let messages_per_round = clamp_non_negative(messages_per_round).max(1);
        let capacity = max_rounds.saturating_mul(messages_per_round);
        Self {
            max_rounds,
            messages_per_round,
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    pub fn messages_per_round(&self) -> usize {
        self.messages_per_round
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends the batch and trims from the front in one critical section.
    ///
    /// A batch larger than the capacity leaves only its own tail.
    pub fn add_messages<I>(&self, batch: I)
    where
        I: IntoIterator<Item = T>,
    {
        let mut entries = self.lock();
        if self.capacity == 0 {
            return;
        }
        entries.extend(batch);
        let excess = entries.len().saturating_sub(self.capacity);
        if excess > 0 {
            entries.drain(..excess);
        }
    }

    /// Returns the last `rounds * messages_per_round` messages, oldest first.
    ///
    /// `None` means the full configured capacity. Asking for more rounds than
    /// are stored returns everything without padding.
    pub fn get_recent_messages(&self, rounds: Option<i64>) -> Vec<T> {
        let rounds = rounds.map_or(self.max_rounds, clamp_non_negative);
        let wanted = rounds.saturating_mul(self.messages_per_round);
        if wanted == 0 {
            return Vec::new();
        }

        let entries = self.lock();
        let skip = entries.len().saturating_sub(wanted);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn get_all_messages(&self) -> Vec<T> {
        self.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn size(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A writer that panicked mid-call cannot leave the deque over capacity:
    // the trim runs before the guard is released and every write re-trims.
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> Default for ConversationHistory<T> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ROUNDS, DEFAULT_MESSAGES_PER_ROUND)
    }
}

fn clamp_non_negative(value: i64) -> usize {
    usize::try_from(value.max(0)).unwrap_or(usize::MAX)
}
