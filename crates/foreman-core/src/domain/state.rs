//! Task lifecycle state machine.

use serde::{Deserialize, Serialize};

/// Task state.
///
/// State transitions:
/// - Pending -> Scheduled (time/interval trigger registered)
/// - Pending -> Running (dequeued by a worker)
/// - Scheduled -> Running (trigger fired, dequeued)
/// - Running -> Completed | Retrying | Failed
/// - Retrying -> Running (backoff elapsed, re-dequeued)
/// - Pending | Scheduled | Retrying -> Cancelled (cancel before dispatch)
///
/// Completed, Failed and Cancelled are terminal. Running has no edge to
/// Cancelled: in-flight work is only cancelled cooperatively via a flag the
/// payload may observe.
///
/// Design note: using an enum plus an explicit transition table keeps every
/// transition exhaustive and makes invalid ones a rejected operation rather
/// than silent state corruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Registered, not yet queued or scheduled.
    Pending,

    /// Bound to a time or interval trigger, waiting for it to fire.
    Scheduled,

    /// Currently executing on a worker.
    Running,

    /// Failed, waiting out the retry backoff.
    Retrying,

    /// Payload returned normally; result recorded.
    Completed,

    /// Failed permanently (retries exhausted or permanent error).
    Failed,

    /// Cancelled before dispatch.
    Cancelled,
}

impl TaskState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }

    /// Is a task in this state eligible for dispatch by a worker?
    pub fn is_dispatchable(self) -> bool {
        matches!(
            self,
            TaskState::Pending | TaskState::Scheduled | TaskState::Retrying
        )
    }

    /// Whether `self -> to` is a legal transition.
    pub fn can_transition(self, to: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, to),
            (Pending, Scheduled)
                | (Pending, Running)
                | (Pending, Cancelled)
                | (Scheduled, Running)
                | (Scheduled, Cancelled)
                | (Running, Completed)
                | (Running, Retrying)
                | (Running, Failed)
                | (Retrying, Running)
                | (Retrying, Cancelled)
        )
    }
}
