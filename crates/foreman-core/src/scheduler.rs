//! Time and interval triggers.
//!
//! The schedule board keeps one entry per scheduled task in a time-ordered
//! heap. A periodic tick (driven by the engine) pops everything due and
//! promotes the associated tasks into the ready queue.
//!
//! Catch-up policy: an entry arbitrarily far in the past fires exactly once
//! per tick, and an interval's next firing is always computed relative to
//! `now` — a stalled scheduler never produces a burst of missed firings.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::domain::TaskId;
use crate::engine::core::EngineInner;
use crate::error::EngineError;
use crate::queue::DueEntry;

/// What causes a scheduled task to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// One-shot: fire at an absolute time, then drop the entry.
    At(DateTime<Utc>),

    /// Repeating: fire every interval; the entry persists until cancelled.
    Every(Duration),
}

/// A trigger bound to a task. One entry per task.
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    pub task_id: TaskId,
    pub trigger: Trigger,
    pub next_run_at: Instant,
}

impl ScheduleEntry {
    /// One-shot entry. A `when` already in the past is due immediately
    /// (it will fire once on the next tick).
    pub fn one_shot(task_id: TaskId, when: DateTime<Utc>) -> Self {
        let delay = (when - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        Self {
            task_id,
            trigger: Trigger::At(when),
            next_run_at: Instant::now() + delay,
        }
    }

    /// Repeating entry; the first firing is one interval from now.
    pub fn repeating(task_id: TaskId, every: Duration) -> Self {
        Self {
            task_id,
            trigger: Trigger::Every(every),
            next_run_at: Instant::now() + every,
        }
    }
}

/// All active schedule entries.
///
/// The timeline heap may hold stale keys (cancelled entries, superseded
/// interval firings); `fire_due` skips anything that no longer matches the
/// entry map, so removal stays O(1).
#[derive(Default)]
pub(crate) struct ScheduleBoard {
    entries: HashMap<TaskId, ScheduleEntry>,
    timeline: std::collections::BinaryHeap<DueEntry>,
}

impl ScheduleBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: ScheduleEntry) -> Result<(), EngineError> {
        if self.entries.contains_key(&entry.task_id) {
            return Err(EngineError::AlreadyScheduled(entry.task_id));
        }
        self.timeline.push(DueEntry {
            due: entry.next_run_at,
            task_id: entry.task_id,
        });
        self.entries.insert(entry.task_id, entry);
        Ok(())
    }

    pub fn remove(&mut self, task_id: TaskId) -> Option<ScheduleEntry> {
        // The timeline key is left behind and skipped lazily.
        self.entries.remove(&task_id)
    }

    pub fn contains(&self, task_id: TaskId) -> bool {
        self.entries.contains_key(&task_id)
    }

    pub fn get(&self, task_id: TaskId) -> Option<&ScheduleEntry> {
        self.entries.get(&task_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Pop every entry due at `now` and return the tasks to promote.
    ///
    /// One-shot entries are dropped; interval entries are re-inserted with
    /// `next_run_at = now + interval`.
    pub fn fire_due(&mut self, now: Instant) -> Vec<TaskId> {
        let mut fired = Vec::new();

        while let Some(key) = self.timeline.peek().copied() {
            if key.due > now {
                break; // Heap is time-ordered, nothing further is due.
            }
            self.timeline.pop();

            let Some(entry) = self.entries.get_mut(&key.task_id) else {
                continue; // Cancelled; stale key.
            };
            if entry.next_run_at != key.due {
                continue; // Superseded by a later re-insertion.
            }

            match entry.trigger {
                Trigger::At(_) => {
                    self.entries.remove(&key.task_id);
                }
                Trigger::Every(interval) => {
                    entry.next_run_at = now + interval;
                    self.timeline.push(DueEntry {
                        due: entry.next_run_at,
                        task_id: key.task_id,
                    });
                }
            }
            fired.push(key.task_id);
        }

        fired
    }

    /// Remove every entry, returning the affected task ids (shutdown path).
    pub fn drain_all(&mut self) -> Vec<TaskId> {
        self.timeline.clear();
        self.entries.drain().map(|(id, _)| id).collect()
    }
}

/// Periodic tick driving the schedule board.
///
/// `MissedTickBehavior::Skip` backs the catch-up policy: a stalled tick
/// resumes with a single firing pass instead of replaying the missed ones.
pub(crate) async fn tick_loop(
    inner: Arc<EngineInner>,
    tick: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                inner.fire_due_schedules().await;
            }
        }
    }
    tracing::debug!("scheduler tick stopped");
}
