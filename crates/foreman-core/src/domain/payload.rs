//! Payload: the invokable unit a task carries.
//!
//! The engine never inspects payload semantics. A payload runs, and either
//! returns a JSON result or an [`ExecutionError`]; everything else (retry,
//! state, bookkeeping) is the engine's job.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::TaskId;

/// Classification of a payload failure.
///
/// - `Transient`: worth retrying (drives the backoff policy).
/// - `Permanent`: retrying is pointless; the task fails terminally even if
///   retry budget remains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transient,
    Permanent,
}

/// Error produced by a payload run.
///
/// Execution errors never propagate out of a worker; they are recorded on the
/// task and fed to the retry policy.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ExecutionError {
    pub message: String,
    pub kind: FailureKind,
}

impl ExecutionError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: FailureKind::Transient,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: FailureKind::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == FailureKind::Transient
    }
}

impl From<String> for ExecutionError {
    fn from(message: String) -> Self {
        Self::transient(message)
    }
}

impl From<&str> for ExecutionError {
    fn from(message: &str) -> Self {
        Self::transient(message)
    }
}

/// Per-attempt context handed to the payload.
///
/// Carries the task identity, the attempt number (1-based) and the
/// cooperative cancellation flag. The engine guarantees no new dispatch after
/// a cancel request; stopping an in-flight run is up to the payload.
#[derive(Debug, Clone)]
pub struct TaskContext {
    task_id: TaskId,
    attempt: u32,
    cancelled: Arc<AtomicBool>,
}

impl TaskContext {
    pub(crate) fn new(task_id: TaskId, attempt: u32, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            task_id,
            attempt,
            cancelled,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// 1 for the first run, 2 for the first retry, and so on.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// True once cancellation has been requested for this task.
    ///
    /// Long-running payloads should poll this at convenient checkpoints and
    /// bail out early; ignoring it is allowed, just unhelpful.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// An invokable unit of work.
///
/// Design intent: this is the seam between the engine and its callers.
/// Implementations own all domain semantics; the engine only sees
/// `Ok(result)` or `Err(error)`.
#[async_trait]
pub trait Payload: Send + Sync {
    async fn run(&self, ctx: &TaskContext) -> Result<serde_json::Value, ExecutionError>;
}
