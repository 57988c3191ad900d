//! Workflows: sets of tasks with declared execution ordering.
//!
//! A workflow drives its members through the normal submit/dispatch path; it
//! adds only the ordering constraint (submit a member once everything it
//! depends on has completed) and the abort-on-failure policy.

mod graph;

pub use graph::DependencyGraph;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{TaskId, TaskState, WorkflowId};

/// Input spec for a workflow.
///
/// Dependencies are an explicit DAG keyed by task id, not implied by list
/// position; `sequential` is a convenience constructor that builds the chain
/// for you.
#[derive(Clone)]
pub struct WorkflowSpec {
    pub name: String,
    pub members: Vec<TaskId>,
    pub dependencies: HashMap<TaskId, Vec<TaskId>>,
    pub abort_on_failure: bool,
}

impl WorkflowSpec {
    /// Each member waits for the previous one to complete.
    pub fn sequential(name: impl Into<String>, members: Vec<TaskId>) -> Self {
        let mut dependencies: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        for pair in members.windows(2) {
            dependencies.insert(pair[1], vec![pair[0]]);
        }
        Self {
            name: name.into(),
            members,
            dependencies,
            abort_on_failure: true,
        }
    }

    /// Explicit dependency sets (fan-out/fan-in). Members without an entry
    /// have no dependencies and are submitted immediately.
    pub fn with_dependencies(
        name: impl Into<String>,
        members: Vec<TaskId>,
        dependencies: HashMap<TaskId, Vec<TaskId>>,
    ) -> Self {
        Self {
            name: name.into(),
            members,
            dependencies,
            abort_on_failure: true,
        }
    }

    pub fn abort_on_failure(mut self, abort: bool) -> Self {
        self.abort_on_failure = abort;
        self
    }
}

/// Workflow state, derived from member task states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, WorkflowState::Running)
    }
}

/// Workflow record: membership, ordering, and derived state.
pub struct WorkflowRecord {
    pub id: WorkflowId,
    pub name: String,
    pub members: Vec<TaskId>,
    pub graph: DependencyGraph,
    pub abort_on_failure: bool,
    pub state: WorkflowState,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowRecord {
    pub(crate) fn new(id: WorkflowId, spec: &WorkflowSpec) -> Self {
        let mut graph = DependencyGraph::new();
        for (&task, deps) in &spec.dependencies {
            for &dep in deps {
                graph.add_dependency(task, dep);
            }
        }
        Self {
            id,
            name: spec.name.clone(),
            members: spec.members.clone(),
            graph,
            abort_on_failure: spec.abort_on_failure,
            state: WorkflowState::Running,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Recompute the derived state from the members' task states.
    ///
    /// - any Failed member (once nothing is left in flight, or immediately
    ///   when abort_on_failure is set) -> Failed
    /// - all members Completed -> Completed
    /// - all members terminal with cancellations but no failures -> Cancelled
    /// - otherwise -> Running
    pub(crate) fn update_state(&mut self, member_states: &[(TaskId, TaskState)]) {
        let any_failed = member_states
            .iter()
            .any(|&(_, s)| s == TaskState::Failed);
        let all_terminal = member_states.iter().all(|&(_, s)| s.is_terminal());

        let next = if any_failed && (self.abort_on_failure || all_terminal) {
            WorkflowState::Failed
        } else if all_terminal {
            if member_states
                .iter()
                .all(|&(_, s)| s == TaskState::Completed)
            {
                WorkflowState::Completed
            } else {
                WorkflowState::Cancelled
            }
        } else {
            WorkflowState::Running
        };

        if next.is_terminal() && self.finished_at.is_none() {
            self.finished_at = Some(Utc::now());
        }
        self.state = next;
    }
}

/// Point-in-time view of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub id: WorkflowId,
    pub name: String,
    pub state: WorkflowState,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total_members: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub running: usize,
}

impl WorkflowStatus {
    pub(crate) fn from_record(
        record: &WorkflowRecord,
        member_states: &[(TaskId, TaskState)],
    ) -> Self {
        let count = |wanted: TaskState| member_states.iter().filter(|&&(_, s)| s == wanted).count();
        Self {
            id: record.id,
            name: record.name.clone(),
            state: record.state,
            created_at: record.created_at,
            finished_at: record.finished_at,
            total_members: record.members.len(),
            completed: count(TaskState::Completed),
            failed: count(TaskState::Failed),
            cancelled: count(TaskState::Cancelled),
            running: count(TaskState::Running),
        }
    }
}
