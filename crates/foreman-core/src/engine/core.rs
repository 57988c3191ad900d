//! Locked engine state and its mutation paths.
//!
//! Design (mirrors the single-lock queue layout):
//! - `CoreState` owns the registry, both queues, the schedule board, workflow
//!   records and stats. Plain methods, no locking.
//! - `EngineInner` wraps it in a `Mutex` + `Notify` pair. Enqueue paths
//!   signal waiting workers; dequeue blocks when nothing is ready.
//! - Notifications are always sent after the lock is released.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify, oneshot};

use crate::domain::{
    ExecutionError, Payload, TaskId, TaskRecord, TaskSpec, TaskState, TaskStatus, WorkflowId,
};
use crate::error::EngineError;
use crate::queue::{DelayQueue, ReadyQueue, RetryPolicy};
use crate::registry::TaskRegistry;
use crate::scheduler::{ScheduleBoard, ScheduleEntry};
use crate::stats::{StatsCollector, StatsSnapshot};
use crate::workflow::{WorkflowRecord, WorkflowSpec, WorkflowStatus};

/// Everything a worker needs to run one attempt, cloned out of the record so
/// no lock is held during execution.
pub(crate) struct Dispatch {
    pub task_id: TaskId,
    pub attempt: u32,
    pub payload: Arc<dyn Payload>,
    pub timeout: Option<Duration>,
    pub cancel_flag: Arc<std::sync::atomic::AtomicBool>,
}

pub(crate) struct CoreState {
    registry: TaskRegistry,
    ready: ReadyQueue,
    delayed: DelayQueue,
    schedules: ScheduleBoard,
    workflows: HashMap<WorkflowId, WorkflowRecord>,
    stats: StatsCollector,
    waiters: HashMap<TaskId, Vec<oneshot::Sender<TaskStatus>>>,
    default_retry: RetryPolicy,
    shutting_down: bool,
}

impl CoreState {
    fn new(default_retry: RetryPolicy) -> Self {
        Self {
            registry: TaskRegistry::new(),
            ready: ReadyQueue::new(),
            delayed: DelayQueue::new(),
            schedules: ScheduleBoard::new(),
            workflows: HashMap::new(),
            stats: StatsCollector::default(),
            waiters: HashMap::new(),
            default_retry,
            shutting_down: false,
        }
    }

    // ---- control plane ----------------------------------------------------

    fn create_task(&mut self, spec: TaskSpec) -> Result<TaskId, EngineError> {
        if self.shutting_down {
            return Err(EngineError::ShuttingDown);
        }
        spec.validate()?;
        let id = TaskId::generate();
        tracing::info!(task = %id, name = %spec.name, priority = %spec.priority, "task created");
        let record = TaskRecord::new(id, spec, &self.default_retry);
        self.registry.insert(record);
        Ok(id)
    }

    fn submit_task(&mut self, id: TaskId) -> Result<(), EngineError> {
        if self.shutting_down {
            return Err(EngineError::ShuttingDown);
        }
        if self.schedules.contains(id) {
            return Err(EngineError::AlreadyScheduled(id));
        }
        let rec = self.registry.get_mut(id)?;
        if rec.queued {
            return Err(EngineError::AlreadyScheduled(id));
        }
        if rec.workflow.is_some() {
            return Err(EngineError::InvalidConfiguration(format!(
                "task {id} is driven by its workflow"
            )));
        }
        if rec.state != TaskState::Pending {
            return Err(EngineError::InvalidTransition {
                task_id: id,
                from: rec.state,
                to: TaskState::Running,
            });
        }
        rec.queued = true;
        let priority = rec.priority;
        self.ready.push(id, priority);
        tracing::debug!(task = %id, "task submitted");
        Ok(())
    }

    fn schedule_one_shot(&mut self, id: TaskId, when: DateTime<Utc>) -> Result<(), EngineError> {
        self.check_schedulable(id)?;
        self.registry.get_mut(id)?.mark_scheduled(when)?;
        self.schedules.insert(ScheduleEntry::one_shot(id, when))?;
        tracing::info!(task = %id, at = %when, "one-shot trigger registered");
        Ok(())
    }

    fn schedule_repeating(&mut self, id: TaskId, every: Duration) -> Result<(), EngineError> {
        if every.is_zero() {
            return Err(EngineError::InvalidConfiguration(
                "interval must be non-zero".to_string(),
            ));
        }
        let span = chrono::Duration::from_std(every).map_err(|_| {
            EngineError::InvalidConfiguration(format!("interval out of range: {every:?}"))
        })?;
        self.check_schedulable(id)?;
        self.registry.get_mut(id)?.mark_scheduled(Utc::now() + span)?;
        self.schedules.insert(ScheduleEntry::repeating(id, every))?;
        tracing::info!(task = %id, every_ms = every.as_millis() as u64, "interval trigger registered");
        Ok(())
    }

    fn check_schedulable(&self, id: TaskId) -> Result<(), EngineError> {
        if self.shutting_down {
            return Err(EngineError::ShuttingDown);
        }
        if self.schedules.contains(id) || self.registry.get(id)?.queued {
            return Err(EngineError::AlreadyScheduled(id));
        }
        if self.registry.get(id)?.workflow.is_some() {
            return Err(EngineError::InvalidConfiguration(format!(
                "task {id} is driven by its workflow"
            )));
        }
        Ok(())
    }

    fn cancel_task(&mut self, id: TaskId) -> Result<TaskState, EngineError> {
        let current = self.registry.get(id)?.state;
        match current {
            TaskState::Pending | TaskState::Scheduled | TaskState::Retrying => {
                self.cancel_record(id);
                self.propagate_terminal(id);
                tracing::info!(task = %id, "task cancelled");
                Ok(TaskState::Cancelled)
            }
            TaskState::Running => {
                // Cooperative only: no new dispatch will happen, and the
                // payload may observe the flag; the run itself is not stopped.
                // Dropping the trigger here keeps an interval task from
                // re-arming after the in-flight run finishes.
                self.schedules.remove(id);
                self.registry
                    .get(id)?
                    .cancel_flag
                    .store(true, Ordering::Relaxed);
                tracing::debug!(task = %id, "cancellation requested for running task");
                Ok(TaskState::Running)
            }
            terminal => {
                // Already terminal: the record is untouched, but an interval
                // task sitting between firings still holds a trigger —
                // dropping it is the only effect left.
                if self.schedules.remove(id).is_some() {
                    tracing::info!(task = %id, "interval trigger removed");
                }
                Ok(terminal)
            }
        }
    }

    /// Cancel one record and do the shared bookkeeping. Returns false when
    /// the record is missing or not cancellable from its current state.
    fn cancel_record(&mut self, id: TaskId) -> bool {
        let Some(rec) = self.registry.record_mut(id) else {
            return false;
        };
        if rec.cancel().is_err() {
            return false;
        }
        self.schedules.remove(id);
        self.stats.record_cancelled();
        self.resolve_waiters(id);
        true
    }

    fn status(&self, id: TaskId) -> Result<TaskStatus, EngineError> {
        Ok(TaskStatus::from_record(self.registry.get(id)?))
    }

    fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot(
            self.registry.len(),
            self.registry.counts_by_state(),
            self.ready.len(),
            self.schedules.len(),
        )
    }

    fn submit_workflow(&mut self, spec: WorkflowSpec) -> Result<(WorkflowId, usize), EngineError> {
        if self.shutting_down {
            return Err(EngineError::ShuttingDown);
        }
        validate_workflow_shape(&spec)?;

        for &m in &spec.members {
            let rec = self.registry.get(m)?;
            if rec.queued || self.schedules.contains(m) {
                return Err(EngineError::AlreadyScheduled(m));
            }
            if rec.workflow.is_some() {
                return Err(EngineError::InvalidConfiguration(format!(
                    "task {m} already belongs to a workflow"
                )));
            }
            if rec.state != TaskState::Pending {
                return Err(EngineError::InvalidTransition {
                    task_id: m,
                    from: rec.state,
                    to: TaskState::Running,
                });
            }
        }

        let wf_id = WorkflowId::generate();
        let record = WorkflowRecord::new(wf_id, &spec);
        if let Some(cycle) = record.graph.find_cycle(&record.members) {
            return Err(EngineError::DependencyCycle(cycle));
        }

        let mut enqueued = 0;
        for &m in &record.members {
            let has_deps = record.graph.has_dependencies(m);
            let rec = self.registry.get_mut(m)?;
            rec.workflow = Some(wf_id);
            if !has_deps {
                rec.queued = true;
                let priority = rec.priority;
                self.ready.push(m, priority);
                enqueued += 1;
            }
        }
        tracing::info!(
            workflow = %wf_id,
            name = %record.name,
            members = record.members.len(),
            "workflow submitted"
        );
        self.workflows.insert(wf_id, record);
        Ok((wf_id, enqueued))
    }

    fn workflow_status(&self, id: WorkflowId) -> Result<WorkflowStatus, EngineError> {
        let wf = self
            .workflows
            .get(&id)
            .ok_or(EngineError::UnknownWorkflow(id))?;
        let states = member_states(&self.registry, &wf.members);
        Ok(WorkflowStatus::from_record(wf, &states))
    }

    // ---- dispatch path ----------------------------------------------------

    /// Move due retries from the delay queue into the ready set.
    fn promote_due_retries(&mut self, now: Instant) {
        while let Some(id) = self.delayed.pop_due(now) {
            if let Some(rec) = self.registry.record_mut(id)
                && rec.state == TaskState::Retrying
                && rec.queued
            {
                let priority = rec.priority;
                self.ready.push(id, priority);
            }
            // Anything else (cancelled while waiting) is simply dropped.
        }
    }

    /// Pop the next dispatchable task, skipping stale entries.
    fn try_dispatch(&mut self) -> Option<Dispatch> {
        while let Some(task_id) = self.ready.pop() {
            let Some(rec) = self.registry.record_mut(task_id) else {
                continue;
            };
            if !rec.queued || !rec.state.is_dispatchable() {
                continue; // Cancelled (or otherwise superseded) after enqueue.
            }
            if let Err(err) = rec.start_attempt() {
                tracing::warn!(%err, "refusing dispatch");
                continue;
            }
            return Some(Dispatch {
                task_id,
                attempt: rec.attempts,
                payload: Arc::clone(&rec.payload),
                timeout: rec.timeout,
                cancel_flag: Arc::clone(&rec.cancel_flag),
            });
        }
        None
    }

    fn has_ready_work(&self) -> bool {
        !self.ready.is_empty()
    }

    /// Shutdown has been requested and nothing is left to dispatch.
    fn is_drained(&self) -> bool {
        self.shutting_down && self.ready.is_empty() && self.delayed.is_empty()
    }

    fn next_retry_due(&self) -> Option<Instant> {
        self.delayed.next_due()
    }

    // ---- completion path --------------------------------------------------

    /// Record a successful run. Returns how many tasks became ready.
    fn complete_task(&mut self, id: TaskId, result: serde_json::Value) -> usize {
        let Some(rec) = self.registry.record_mut(id) else {
            tracing::warn!(task = %id, "completion reported for unknown task");
            return 0;
        };
        if let Err(err) = rec.complete(result) {
            tracing::warn!(%err, "dropping completion report");
            return 0;
        }
        let duration = rec.run_duration();
        self.stats.record_completed(duration);
        tracing::info!(
            task = %id,
            elapsed_ms = duration.map(|d| d.as_millis() as u64),
            "task completed"
        );
        self.resolve_waiters(id);
        self.propagate_terminal(id)
    }

    /// Record a failed run: either schedule the retry or fail terminally.
    /// Returns how many wakeups the caller should signal.
    fn fail_task(&mut self, id: TaskId, error: &ExecutionError) -> usize {
        let Some(rec) = self.registry.record_mut(id) else {
            tracing::warn!(task = %id, "failure reported for unknown task");
            return 0;
        };
        let attempts = rec.attempts;

        if error.is_transient() && attempts <= rec.max_retries {
            let delay = rec.retry.next_delay(attempts);
            if let Err(err) = rec.schedule_retry(error.message.clone()) {
                tracing::warn!(%err, "dropping failure report");
                return 0;
            }
            rec.queued = true;
            self.delayed.push(id, Instant::now() + delay);
            self.stats.record_retry();
            tracing::warn!(
                task = %id,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error.message,
                "task failed, retry scheduled"
            );
            // One wakeup so a sleeping worker re-reads the earliest due time.
            1
        } else {
            if let Err(err) = rec.fail(error.message.clone()) {
                tracing::warn!(%err, "dropping failure report");
                return 0;
            }
            let duration = rec.run_duration();
            self.stats.record_failed(duration);
            tracing::error!(
                task = %id,
                attempts,
                error = %error.message,
                "task failed permanently"
            );
            self.resolve_waiters(id);
            self.propagate_terminal(id)
        }
    }

    // ---- scheduler path ---------------------------------------------------

    /// Fire every due trigger. Returns how many tasks were promoted.
    fn fire_schedules(&mut self, now: Instant) -> usize {
        let fired = self.schedules.fire_due(now);
        let mut promoted = 0;

        for task_id in fired {
            let repeating = self.schedules.contains(task_id);
            let Some(rec) = self.registry.record_mut(task_id) else {
                continue;
            };
            match rec.state {
                TaskState::Scheduled => {
                    if !rec.queued {
                        rec.queued = true;
                        let priority = rec.priority;
                        self.ready.push(task_id, priority);
                        promoted += 1;
                        tracing::debug!(task = %task_id, "trigger fired");
                    }
                }
                // Interval task whose previous run finished: reset it for
                // the next run.
                TaskState::Completed | TaskState::Failed if repeating => {
                    rec.rearm(Utc::now());
                    rec.queued = true;
                    let priority = rec.priority;
                    self.ready.push(task_id, priority);
                    promoted += 1;
                    tracing::debug!(task = %task_id, "interval task re-armed");
                }
                TaskState::Running | TaskState::Retrying => {
                    // Previous firing still in flight; this one is dropped,
                    // never queued up behind it.
                    tracing::debug!(task = %task_id, "firing skipped, previous run in flight");
                }
                _ => {}
            }
        }
        promoted
    }

    // ---- shutdown ---------------------------------------------------------

    fn begin_shutdown(&mut self, cancel_pending: bool) {
        self.shutting_down = true;

        // Unfired triggers die with the engine in both modes.
        for id in self.schedules.drain_all() {
            let unfired = self
                .registry
                .record(id)
                .is_some_and(|r| r.state == TaskState::Scheduled && !r.queued);
            if unfired {
                self.cancel_record(id);
            }
        }

        if cancel_pending {
            let ids: Vec<TaskId> = self.registry.ids().collect();
            for &id in &ids {
                let probe = self.registry.record(id).map(|r| (r.state, r.queued));
                match probe {
                    Some((
                        TaskState::Pending | TaskState::Scheduled | TaskState::Retrying,
                        true,
                    )) => {
                        self.cancel_record(id);
                    }
                    Some((TaskState::Running, _)) => {
                        if let Some(rec) = self.registry.record(id) {
                            rec.cancel_flag.store(true, Ordering::Relaxed);
                        }
                    }
                    _ => {}
                }
            }
            self.ready.clear();
            self.delayed.clear();
        }
        tracing::info!(cancel_pending, "engine shutdown started");
    }

    /// Drop any waiters left after shutdown; their `wait_for` calls resolve
    /// to a shutdown error instead of hanging on the dead engine.
    fn drop_unresolved_waiters(&mut self) {
        if !self.waiters.is_empty() {
            tracing::debug!(count = self.waiters.len(), "dropping unresolved waiters");
            self.waiters.clear();
        }
    }

    // ---- shared bookkeeping -----------------------------------------------

    /// Resolve `wait_for` callers once a task is terminal.
    fn resolve_waiters(&mut self, id: TaskId) {
        let Some(senders) = self.waiters.remove(&id) else {
            return;
        };
        let Some(rec) = self.registry.record(id) else {
            return;
        };
        let status = TaskStatus::from_record(rec);
        for tx in senders {
            let _ = tx.send(status.clone());
        }
    }

    /// Workflow bookkeeping after a member reached a terminal state.
    ///
    /// - Completed: enqueue dependents whose dependencies are all complete.
    /// - Failed + abort_on_failure: cancel every not-yet-started member.
    /// - Failed without abort: cancel (transitively) only the dependents —
    ///   they can never start; independent branches continue.
    /// - Cancelled: cancel dependents transitively, same reasoning.
    ///
    /// Returns how many tasks became ready.
    fn propagate_terminal(&mut self, start: TaskId) -> usize {
        let mut enqueued = 0;
        let mut events = vec![start];

        while let Some(id) = events.pop() {
            let Some(rec) = self.registry.record(id) else {
                continue;
            };
            let Some(wf_id) = rec.workflow else {
                continue;
            };
            let terminal = rec.state;
            let Some(wf) = self.workflows.get(&wf_id) else {
                continue;
            };
            let abort = wf.abort_on_failure;
            let members = wf.members.clone();
            let dependents: Vec<(TaskId, Vec<TaskId>)> = wf
                .graph
                .dependents(id)
                .into_iter()
                .map(|d| (d, wf.graph.dependencies(d)))
                .collect();

            match terminal {
                TaskState::Completed => {
                    for (dependent, deps) in dependents {
                        let satisfied = deps.iter().all(|&d| {
                            self.registry
                                .record(d)
                                .is_some_and(|r| r.state == TaskState::Completed)
                        });
                        if !satisfied {
                            continue;
                        }
                        if let Some(r) = self.registry.record_mut(dependent)
                            && r.state == TaskState::Pending
                            && !r.queued
                        {
                            r.queued = true;
                            let priority = r.priority;
                            self.ready.push(dependent, priority);
                            enqueued += 1;
                            tracing::debug!(
                                task = %dependent,
                                workflow = %wf_id,
                                "dependencies satisfied, task queued"
                            );
                        }
                    }
                }
                TaskState::Failed if abort => {
                    for &m in &members {
                        let cancellable = self
                            .registry
                            .record(m)
                            .is_some_and(|r| {
                                matches!(r.state, TaskState::Pending | TaskState::Retrying)
                            });
                        if cancellable && self.cancel_record(m) {
                            tracing::debug!(
                                task = %m,
                                workflow = %wf_id,
                                "cancelled by aborting workflow"
                            );
                        }
                    }
                }
                TaskState::Failed | TaskState::Cancelled => {
                    for (dependent, _) in dependents {
                        let pending = self
                            .registry
                            .record(dependent)
                            .is_some_and(|r| r.state == TaskState::Pending);
                        if pending && self.cancel_record(dependent) {
                            events.push(dependent);
                        }
                    }
                }
                _ => {}
            }

            let states = member_states(&self.registry, &members);
            if let Some(wf) = self.workflows.get_mut(&wf_id) {
                let before = wf.state;
                wf.update_state(&states);
                if wf.state != before && wf.state.is_terminal() {
                    tracing::info!(workflow = %wf_id, state = ?wf.state, "workflow finished");
                }
            }
        }

        enqueued
    }
}

fn member_states(registry: &TaskRegistry, members: &[TaskId]) -> Vec<(TaskId, TaskState)> {
    members
        .iter()
        .filter_map(|&m| registry.record(m).map(|r| (m, r.state)))
        .collect()
}

fn validate_workflow_shape(spec: &WorkflowSpec) -> Result<(), EngineError> {
    if spec.members.is_empty() {
        return Err(EngineError::InvalidConfiguration(
            "workflow needs at least one member task".to_string(),
        ));
    }
    let mut seen = std::collections::HashSet::new();
    for &m in &spec.members {
        if !seen.insert(m) {
            return Err(EngineError::InvalidConfiguration(format!(
                "duplicate workflow member {m}"
            )));
        }
    }
    for (task, deps) in &spec.dependencies {
        if !seen.contains(task) {
            return Err(EngineError::InvalidConfiguration(format!(
                "dependency declared for non-member task {task}"
            )));
        }
        for dep in deps {
            if !seen.contains(dep) {
                return Err(EngineError::InvalidConfiguration(format!(
                    "dependency on non-member task {dep}"
                )));
            }
        }
    }
    Ok(())
}

/// Shared engine internals: the locked state plus the worker wakeup signal.
pub(crate) struct EngineInner {
    state: Mutex<CoreState>,
    notify: Notify,
}

impl EngineInner {
    pub fn new(default_retry: RetryPolicy) -> Self {
        Self {
            state: Mutex::new(CoreState::new(default_retry)),
            notify: Notify::new(),
        }
    }

    // ---- control plane ----------------------------------------------------

    pub async fn create(&self, spec: TaskSpec) -> Result<TaskId, EngineError> {
        self.state.lock().await.create_task(spec)
    }

    pub async fn submit(&self, id: TaskId) -> Result<(), EngineError> {
        self.state.lock().await.submit_task(id)?;
        self.notify.notify_one();
        Ok(())
    }

    pub async fn schedule_at(&self, id: TaskId, when: DateTime<Utc>) -> Result<(), EngineError> {
        self.state.lock().await.schedule_one_shot(id, when)
    }

    pub async fn schedule_every(&self, id: TaskId, every: Duration) -> Result<(), EngineError> {
        self.state.lock().await.schedule_repeating(id, every)
    }

    pub async fn cancel(&self, id: TaskId) -> Result<TaskState, EngineError> {
        self.state.lock().await.cancel_task(id)
    }

    pub async fn status(&self, id: TaskId) -> Result<TaskStatus, EngineError> {
        self.state.lock().await.status(id)
    }

    pub async fn list_tasks(&self, filter: Option<TaskState>) -> Vec<TaskStatus> {
        self.state.lock().await.registry.statuses(filter)
    }

    pub async fn stats(&self) -> StatsSnapshot {
        self.state.lock().await.snapshot()
    }

    pub async fn submit_workflow(&self, spec: WorkflowSpec) -> Result<WorkflowId, EngineError> {
        let (wf_id, enqueued) = self.state.lock().await.submit_workflow(spec)?;
        for _ in 0..enqueued {
            self.notify.notify_one();
        }
        Ok(wf_id)
    }

    pub async fn workflow_status(&self, id: WorkflowId) -> Result<WorkflowStatus, EngineError> {
        self.state.lock().await.workflow_status(id)
    }

    /// Resolve once the task reaches a terminal state.
    pub async fn wait_for(&self, id: TaskId) -> Result<TaskStatus, EngineError> {
        let rx = {
            let mut state = self.state.lock().await;
            let rec = state.registry.get(id)?;
            if rec.state.is_terminal() {
                return Ok(TaskStatus::from_record(rec));
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.entry(id).or_default().push(tx);
            rx
        };
        rx.await.map_err(|_| EngineError::ShuttingDown)
    }

    // ---- worker side ------------------------------------------------------

    /// Block until a task can be dispatched, or return None once shutdown
    /// has begun and the queues are drained.
    pub(crate) async fn acquire(&self) -> Option<Dispatch> {
        loop {
            let wake = {
                let mut state = self.state.lock().await;
                state.promote_due_retries(Instant::now());

                if let Some(dispatch) = state.try_dispatch() {
                    let more = state.has_ready_work();
                    drop(state);
                    if more {
                        // Chain the wakeup while work remains so one enqueue
                        // signal fans out across idle workers.
                        self.notify.notify_one();
                    }
                    return Some(dispatch);
                }

                if state.is_drained() {
                    drop(state);
                    // Pass the shutdown wakeup along so every blocked worker
                    // gets its turn to observe the drained state.
                    self.notify.notify_one();
                    return None;
                }
                state.next_retry_due()
            };

            match wake {
                Some(at) => {
                    tokio::select! {
                        _ = self.notify.notified() => {}
                        _ = tokio::time::sleep_until(at.into()) => {}
                    }
                }
                None => self.notify.notified().await,
            }
        }
    }

    pub(crate) async fn report_success(&self, id: TaskId, result: serde_json::Value) {
        let woken = self.state.lock().await.complete_task(id, result);
        for _ in 0..woken {
            self.notify.notify_one();
        }
    }

    pub(crate) async fn report_failure(&self, id: TaskId, error: ExecutionError) {
        let woken = self.state.lock().await.fail_task(id, &error);
        for _ in 0..woken {
            self.notify.notify_one();
        }
    }

    // ---- scheduler side ---------------------------------------------------

    pub(crate) async fn fire_due_schedules(&self) -> usize {
        let promoted = self.state.lock().await.fire_schedules(Instant::now());
        for _ in 0..promoted {
            self.notify.notify_one();
        }
        promoted
    }

    // ---- shutdown ---------------------------------------------------------

    pub(crate) async fn begin_shutdown(&self, cancel_pending: bool) {
        self.state.lock().await.begin_shutdown(cancel_pending);
        // Wake every currently-blocked worker, plus one stored permit for a
        // worker racing between its queue check and its sleep —
        // notify_waiters alone does not reach it.
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub(crate) async fn finish_shutdown(&self) {
        self.state.lock().await.drop_unresolved_waiters();
    }
}
