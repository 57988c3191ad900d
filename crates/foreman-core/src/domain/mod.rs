//! Domain model (ids, priority, state machine, payloads, records, views).

pub mod ids;
pub mod payload;
pub mod priority;
pub mod state;
pub mod status;
pub mod task;

pub use ids::{Id, IdKind, TaskId, WorkflowId};
pub use payload::{ExecutionError, FailureKind, Payload, TaskContext};
pub use priority::Priority;
pub use state::TaskState;
pub use status::TaskStatus;
pub use task::{MAX_RETRIES_LIMIT, TaskRecord, TaskSpec};
