//! Strongly-typed identifiers (ULID-backed).
//!
//! ULIDs are time-prefixed, so ids sort by creation order and are unique for
//! the process lifetime without coordination. A phantom marker type keeps
//! `TaskId` and `WorkflowId` distinct at compile time while sharing one
//! implementation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Marker trait for id namespaces. Supplies the `Display` prefix.
pub trait IdKind: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic id. `K` is zero-sized and only exists at compile time, so a
/// `TaskId` can never be passed where a `WorkflowId` is expected.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<K: IdKind> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<K>,
}

impl<K: IdKind> Id<K> {
    /// Mint a fresh id.
    pub fn generate() -> Self {
        Self::from_ulid(Ulid::new())
    }

    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<K: IdKind> From<Ulid> for Id<K> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<K: IdKind> fmt::Display for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", K::prefix(), self.ulid)
    }
}

/// Marker for task ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskMarker {}

impl IdKind for TaskMarker {
    fn prefix() -> &'static str {
        "task-"
    }
}

/// Marker for workflow ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WorkflowMarker {}

impl IdKind for WorkflowMarker {
    fn prefix() -> &'static str {
        "wf-"
    }
}

/// Identifier of a Task (the unit of execution).
pub type TaskId = Id<TaskMarker>;

/// Identifier of a Workflow (a set of tasks with declared ordering).
pub type WorkflowId = Id<WorkflowMarker>;
