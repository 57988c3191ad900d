//! foreman-core
//!
//! In-process task automation engine: a priority-aware ready queue, a fixed
//! worker pool, exponential-backoff retries, time/interval triggers, and
//! multi-step workflows with declared dependencies.
//!
//! # Module map
//! - **domain**: ids, priority, the task state machine, payload trait,
//!   records and status views
//! - **registry**: authoritative task store + transition validation
//! - **queue**: ready queue (priority/arrival order), retry delay queue,
//!   backoff policy
//! - **scheduler**: one-shot and interval triggers, fired by a periodic tick
//! - **workflow**: dependency DAG and derived workflow state
//! - **worker**: the worker pool and its dispatch loop
//! - **stats**: counters and duration percentiles
//! - **engine**: the `TaskEngine` facade tying it all together

pub mod domain;
pub mod engine;
pub mod error;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod stats;
pub mod workflow;

pub(crate) mod worker;

pub use domain::{
    ExecutionError, FailureKind, Payload, Priority, TaskContext, TaskId, TaskSpec, TaskState,
    TaskStatus, WorkflowId,
};
pub use engine::{EngineBuilder, ShutdownMode, TaskEngine};
pub use error::EngineError;
pub use queue::RetryPolicy;
pub use scheduler::Trigger;
pub use stats::{StateCounts, StatsSnapshot};
pub use workflow::{WorkflowSpec, WorkflowState, WorkflowStatus};
