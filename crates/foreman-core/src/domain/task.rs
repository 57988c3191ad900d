//! Task spec and task record.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::payload::Payload;
use super::{Priority, TaskId, TaskState, WorkflowId};
use crate::error::EngineError;
use crate::queue::RetryPolicy;

/// Upper bound on `max_retries` accepted at creation. High enough for any
/// sane policy, low enough to catch a caller passing garbage.
pub const MAX_RETRIES_LIMIT: u32 = 100;

/// Input spec for creating a task.
///
/// Only `name` and `payload` are required; the rest defaults to medium
/// priority, three retries and the engine-wide retry policy.
#[derive(Clone)]
pub struct TaskSpec {
    pub name: String,
    pub payload: Arc<dyn Payload>,
    pub priority: Priority,
    pub max_retries: u32,
    pub retry: Option<RetryPolicy>,
    pub timeout: Option<Duration>,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, payload: impl Payload + 'static) -> Self {
        Self {
            name: name.into(),
            payload: Arc::new(payload),
            priority: Priority::default(),
            max_retries: 3,
            retry: None,
            timeout: None,
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Per-task backoff policy, overriding the engine default.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Per-attempt execution deadline, enforced by the worker. Without one,
    /// a payload may run for an unbounded duration.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), EngineError> {
        if self.name.trim().is_empty() {
            return Err(EngineError::InvalidConfiguration(
                "task name must not be empty".to_string(),
            ));
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(EngineError::InvalidConfiguration(format!(
                "max_retries must be <= {MAX_RETRIES_LIMIT} (got {})",
                self.max_retries
            )));
        }
        if let Some(policy) = &self.retry {
            policy.validate()?;
        }
        if let Some(timeout) = self.timeout
            && timeout.is_zero()
        {
            return Err(EngineError::InvalidConfiguration(
                "timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// A task record.
///
/// Design:
/// - This is the single source of truth for task state. The ready queue, the
///   delay queue and the schedule board hold `TaskId` only.
/// - All state transitions go through the methods below, which enforce the
///   transition table and keep timestamps consistent.
pub struct TaskRecord {
    pub id: TaskId,
    pub name: String,
    pub payload: Arc<dyn Payload>,
    pub priority: Priority,
    pub state: TaskState,

    /// Number of execution attempts made (including the current one while
    /// Running). Never exceeds `max_retries + 1`.
    pub attempts: u32,
    pub max_retries: u32,
    pub retry: RetryPolicy,
    pub timeout: Option<Duration>,

    /// Populated only on Completed.
    pub result: Option<serde_json::Value>,

    /// Populated on Failed and while Retrying.
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Workflow membership, set when the task is submitted as part of one.
    pub workflow: Option<WorkflowId>,

    /// True while an entry for this task sits in the ready or delay queue.
    /// Queue entries are removed lazily, so dispatch re-checks this flag.
    pub queued: bool,

    /// Cooperative cancellation flag, shared with the execution context.
    pub cancel_flag: Arc<AtomicBool>,
}

impl TaskRecord {
    pub(crate) fn new(id: TaskId, spec: TaskSpec, default_retry: &RetryPolicy) -> Self {
        Self {
            id,
            name: spec.name,
            payload: spec.payload,
            priority: spec.priority,
            state: TaskState::Pending,
            attempts: 0,
            max_retries: spec.max_retries,
            retry: spec.retry.unwrap_or_else(|| default_retry.clone()),
            timeout: spec.timeout,
            result: None,
            error: None,
            created_at: Utc::now(),
            scheduled_at: None,
            started_at: None,
            finished_at: None,
            workflow: None,
            queued: false,
            cancel_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    fn transition(&mut self, to: TaskState) -> Result<(), EngineError> {
        if !self.state.can_transition(to) {
            return Err(EngineError::InvalidTransition {
                task_id: self.id,
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// Bind to a trigger: Pending -> Scheduled.
    pub(crate) fn mark_scheduled(&mut self, at: DateTime<Utc>) -> Result<(), EngineError> {
        self.transition(TaskState::Scheduled)?;
        self.scheduled_at = Some(at);
        Ok(())
    }

    /// Dispatch: Pending | Scheduled | Retrying -> Running.
    pub(crate) fn start_attempt(&mut self) -> Result<(), EngineError> {
        self.transition(TaskState::Running)?;
        self.attempts += 1;
        self.started_at = Some(Utc::now());
        self.queued = false;
        Ok(())
    }

    /// Running -> Completed.
    pub(crate) fn complete(&mut self, result: serde_json::Value) -> Result<(), EngineError> {
        self.transition(TaskState::Completed)?;
        self.result = Some(result);
        self.error = None;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Running -> Retrying.
    pub(crate) fn schedule_retry(&mut self, error: String) -> Result<(), EngineError> {
        self.transition(TaskState::Retrying)?;
        self.error = Some(error);
        Ok(())
    }

    /// Running -> Failed.
    pub(crate) fn fail(&mut self, error: String) -> Result<(), EngineError> {
        self.transition(TaskState::Failed)?;
        self.error = Some(error);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Pending | Scheduled | Retrying -> Cancelled.
    pub(crate) fn cancel(&mut self) -> Result<(), EngineError> {
        self.transition(TaskState::Cancelled)?;
        self.finished_at = Some(Utc::now());
        self.queued = false;
        Ok(())
    }

    /// Reset a terminal interval task for its next firing:
    /// Completed | Failed -> Scheduled.
    ///
    /// This deliberately sidesteps the public transition table; it is only
    /// reachable from the scheduler, and only for tasks that still hold an
    /// active interval trigger.
    pub(crate) fn rearm(&mut self, next_at: DateTime<Utc>) {
        debug_assert!(matches!(
            self.state,
            TaskState::Completed | TaskState::Failed
        ));
        self.state = TaskState::Scheduled;
        self.attempts = 0;
        self.result = None;
        self.error = None;
        self.started_at = None;
        self.finished_at = None;
        self.scheduled_at = Some(next_at);
    }

    /// Duration of the finished run, when both endpoints exist.
    pub fn run_duration(&self) -> Option<Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => (end - start).to_std().ok(),
            _ => None,
        }
    }
}
