//! Delay queue: tasks waiting out a retry backoff.

use std::collections::BinaryHeap;
use std::time::Instant;

use crate::domain::TaskId;

/// Min-heap entry keyed by due time.
///
/// `Ord` is reversed so `BinaryHeap` yields the earliest due time first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DueEntry {
    pub due: Instant,
    pub task_id: TaskId,
}

impl PartialOrd for DueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.task_id.cmp(&self.task_id))
    }
}

#[derive(Default)]
pub(crate) struct DelayQueue {
    heap: BinaryHeap<DueEntry>,
}

impl DelayQueue {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    pub fn push(&mut self, task_id: TaskId, due: Instant) {
        self.heap.push(DueEntry { due, task_id });
    }

    /// Earliest due time, if any — used to bound the workers' sleep.
    pub fn next_due(&self) -> Option<Instant> {
        self.heap.peek().map(|e| e.due)
    }

    /// Pop one entry if it is due at `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<TaskId> {
        if self.heap.peek().is_some_and(|e| e.due <= now) {
            return self.heap.pop().map(|e| e.task_id);
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}
