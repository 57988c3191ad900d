//! Task registry: the authoritative store of task records.
//!
//! Queues and the schedule board hold only `TaskId`s; every read or mutation
//! of task state goes through here. The registry itself is plain data — the
//! engine serializes access with its state lock.

use std::collections::HashMap;

use crate::domain::{TaskId, TaskRecord, TaskState, TaskStatus};
use crate::error::EngineError;
use crate::stats::StateCounts;

#[derive(Default)]
pub struct TaskRegistry {
    tasks: HashMap<TaskId, TaskRecord>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
        }
    }

    pub fn insert(&mut self, record: TaskRecord) {
        self.tasks.insert(record.id, record);
    }

    pub fn get(&self, id: TaskId) -> Result<&TaskRecord, EngineError> {
        self.tasks.get(&id).ok_or(EngineError::UnknownTask(id))
    }

    pub fn get_mut(&mut self, id: TaskId) -> Result<&mut TaskRecord, EngineError> {
        self.tasks.get_mut(&id).ok_or(EngineError::UnknownTask(id))
    }

    /// Non-failing lookup for internal paths that tolerate missing ids
    /// (stale queue entries and the like).
    pub fn record_mut(&mut self, id: TaskId) -> Option<&mut TaskRecord> {
        self.tasks.get_mut(&id)
    }

    pub fn record(&self, id: TaskId) -> Option<&TaskRecord> {
        self.tasks.get(&id)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.tasks.keys().copied()
    }

    /// Status views for all tasks, optionally filtered by state.
    pub fn statuses(&self, filter: Option<TaskState>) -> Vec<TaskStatus> {
        let mut out: Vec<TaskStatus> = self
            .tasks
            .values()
            .filter(|r| filter.is_none_or(|s| r.state == s))
            .map(TaskStatus::from_record)
            .collect();
        // Stable, creation-ordered output (ids are time-sortable).
        out.sort_by_key(|s| s.id);
        out
    }

    /// Per-state counts for observability.
    pub fn counts_by_state(&self) -> StateCounts {
        let mut counts = StateCounts::default();
        for record in self.tasks.values() {
            match record.state {
                TaskState::Pending => counts.pending += 1,
                TaskState::Scheduled => counts.scheduled += 1,
                TaskState::Running => counts.running += 1,
                TaskState::Retrying => counts.retrying += 1,
                TaskState::Completed => counts.completed += 1,
                TaskState::Failed => counts.failed += 1,
                TaskState::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }
}
