//! Control-plane error taxonomy.
//!
//! These errors are returned synchronously from engine calls. Payload
//! failures are not here on purpose: they are execution-plane values recorded
//! on the task (see `domain::payload::ExecutionError`), never thrown at the
//! caller.

use thiserror::Error;

use crate::domain::{TaskId, TaskState, WorkflowId};

#[derive(Debug, Error)]
pub enum EngineError {
    /// Rejected at creation/construction time: bad worker count, retry or
    /// trigger values out of range, zero timeouts, and the like.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("unknown task: {0}")]
    UnknownTask(TaskId),

    #[error("unknown workflow: {0}")]
    UnknownWorkflow(WorkflowId),

    /// The task is already queued or bound to an active trigger.
    #[error("task {0} is already queued or scheduled")]
    AlreadyScheduled(TaskId),

    /// A transition outside the state machine table was requested. Callers
    /// going through the public API should never see this for their own
    /// operations on live tasks; it is the registry refusing to corrupt
    /// state.
    #[error("invalid state transition for task {task_id}: {from:?} -> {to:?}")]
    InvalidTransition {
        task_id: TaskId,
        from: TaskState,
        to: TaskState,
    },

    /// The declared workflow dependencies are not a DAG. Carries the tasks
    /// stuck on a cycle.
    #[error("workflow dependencies contain a cycle involving {0:?}")]
    DependencyCycle(Vec<TaskId>),

    /// The engine no longer accepts work (shutdown in progress or complete).
    #[error("engine is shutting down")]
    ShuttingDown,
}
