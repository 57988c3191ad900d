//! Serializable status views.
//!
//! Records own payloads and live bookkeeping, so they are not serializable
//! themselves; these views are the read-only snapshots handed to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::TaskRecord;
use super::{Priority, TaskId, TaskState, WorkflowId};

/// Point-in-time view of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub id: TaskId,
    pub name: String,
    pub state: TaskState,
    pub priority: Priority,
    pub attempts: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub workflow: Option<WorkflowId>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl TaskStatus {
    pub(crate) fn from_record(record: &TaskRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            state: record.state,
            priority: record.priority,
            attempts: record.attempts,
            max_retries: record.max_retries,
            created_at: record.created_at,
            scheduled_at: record.scheduled_at,
            started_at: record.started_at,
            finished_at: record.finished_at,
            workflow: record.workflow,
            result: record.result.clone(),
            error: record.error.clone(),
        }
    }
}
