//! The task engine facade.
//!
//! `TaskEngine` is the single entry point: create and submit tasks, bind
//! triggers, drive workflows, query status, take a stats snapshot, shut
//! down. Control-plane calls return synchronously after a short state-lock
//! hold; payload execution happens asynchronously on the worker pool.

pub(crate) mod core;

mod builder;

pub use builder::EngineBuilder;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::domain::{TaskId, TaskSpec, TaskState, TaskStatus, WorkflowId};
use crate::error::EngineError;
use crate::stats::StatsSnapshot;
use crate::worker::WorkerGroup;
use crate::workflow::{WorkflowSpec, WorkflowStatus};

use self::core::EngineInner;

/// What to do with not-yet-dispatched tasks at shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Run everything already queued (and awaiting retry) to a terminal
    /// state, then stop.
    Drain,

    /// Cancel everything not yet dispatched; only in-flight runs finish.
    CancelPending,
}

pub(crate) struct Handles {
    pub(crate) workers: WorkerGroup,
    pub(crate) scheduler_tx: watch::Sender<bool>,
    pub(crate) scheduler: JoinHandle<()>,
}

/// A running task engine.
///
/// Constructed via [`TaskEngine::builder`]; workers and the scheduler tick
/// are live for the whole lifetime of the value, until [`shutdown`] is
/// called.
///
/// [`shutdown`]: TaskEngine::shutdown
pub struct TaskEngine {
    inner: Arc<EngineInner>,
    handles: Mutex<Option<Handles>>,
}

impl std::fmt::Debug for TaskEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskEngine").finish_non_exhaustive()
    }
}

impl TaskEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub(crate) fn assemble(inner: Arc<EngineInner>, handles: Handles) -> Self {
        Self {
            inner,
            handles: Mutex::new(Some(handles)),
        }
    }

    /// Register a new task. The task is `Pending` until submitted or
    /// scheduled.
    pub async fn create(&self, spec: TaskSpec) -> Result<TaskId, EngineError> {
        self.inner.create(spec).await
    }

    /// Queue a pending task for immediate execution. Never blocks on worker
    /// availability.
    pub async fn submit(&self, id: TaskId) -> Result<(), EngineError> {
        self.inner.submit(id).await
    }

    /// Bind a one-shot trigger: run once at `when`. A time already in the
    /// past fires on the next scheduler tick.
    pub async fn schedule_at(&self, id: TaskId, when: DateTime<Utc>) -> Result<(), EngineError> {
        self.inner.schedule_at(id, when).await
    }

    /// Bind a repeating trigger: run every `every`, first firing one
    /// interval from now. Firings that come due while a previous run is
    /// still in flight are skipped, never queued up.
    pub async fn schedule_every(&self, id: TaskId, every: Duration) -> Result<(), EngineError> {
        self.inner.schedule_every(id, every).await
    }

    /// Cancel a task. Pre-dispatch tasks go straight to `Cancelled` and
    /// their payload is guaranteed never to run. For a running task this
    /// only raises the cooperative flag. Terminal tasks are untouched.
    /// Returns the task's state after the call.
    pub async fn cancel(&self, id: TaskId) -> Result<TaskState, EngineError> {
        self.inner.cancel(id).await
    }

    pub async fn status(&self, id: TaskId) -> Result<TaskStatus, EngineError> {
        self.inner.status(id).await
    }

    /// All tasks, optionally filtered by state, in creation order.
    pub async fn list_tasks(&self, filter: Option<TaskState>) -> Vec<TaskStatus> {
        self.inner.list_tasks(filter).await
    }

    /// Block until the task reaches a terminal state and return its status.
    pub async fn wait_for(&self, id: TaskId) -> Result<TaskStatus, EngineError> {
        self.inner.wait_for(id).await
    }

    /// Submit a set of tasks with declared ordering. Members without
    /// dependencies are queued immediately; the rest follow as their
    /// dependencies complete.
    pub async fn submit_workflow(&self, spec: WorkflowSpec) -> Result<WorkflowId, EngineError> {
        self.inner.submit_workflow(spec).await
    }

    pub async fn workflow_status(&self, id: WorkflowId) -> Result<WorkflowStatus, EngineError> {
        self.inner.workflow_status(id).await
    }

    /// Counters, queue depth and duration percentiles.
    pub async fn stats(&self) -> StatsSnapshot {
        self.inner.stats().await
    }

    /// Stop the engine. Idempotent; the second call is a no-op.
    ///
    /// New submissions are refused immediately; outstanding triggers are
    /// dropped; queued work is drained or cancelled per `mode`; then the
    /// scheduler and all workers are joined.
    pub async fn shutdown(&self, mode: ShutdownMode) {
        let Some(handles) = self.handles.lock().await.take() else {
            return;
        };

        let cancel_pending = mode == ShutdownMode::CancelPending;
        self.inner.begin_shutdown(cancel_pending).await;

        let _ = handles.scheduler_tx.send(true);
        let _ = handles.scheduler.await;

        if cancel_pending {
            handles.workers.request_shutdown();
        }
        handles.workers.join_all().await;

        self.inner.finish_shutdown().await;
        tracing::info!("engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExecutionError, Payload, Priority, TaskContext};
    use crate::queue::RetryPolicy;
    use crate::workflow::WorkflowState;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};
    use tokio::sync::Semaphore;
    use tokio::time::{sleep, timeout};

    const WAIT: Duration = Duration::from_secs(5);

    fn quick_retry() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(10),
            multiplier: 2.0,
            max_delay: Duration::from_millis(40),
            jitter: 0.0,
        }
    }

    fn engine(workers: usize) -> TaskEngine {
        TaskEngine::builder()
            .max_workers(workers)
            .tick_interval(Duration::from_millis(20))
            .default_retry_policy(quick_retry())
            .build()
            .unwrap()
    }

    async fn wait(engine: &TaskEngine, id: TaskId) -> TaskStatus {
        timeout(WAIT, engine.wait_for(id)).await.unwrap().unwrap()
    }

    /// Returns its configured value.
    struct Echo(serde_json::Value);

    #[async_trait]
    impl Payload for Echo {
        async fn run(&self, _ctx: &TaskContext) -> Result<serde_json::Value, ExecutionError> {
            Ok(self.0.clone())
        }
    }

    /// Appends its label to a shared log.
    struct Recorder {
        label: &'static str,
        log: Arc<StdMutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Payload for Recorder {
        async fn run(&self, _ctx: &TaskContext) -> Result<serde_json::Value, ExecutionError> {
            self.log.lock().unwrap().push(self.label);
            Ok(json!(self.label))
        }
    }

    /// Blocks the worker until the gate hands out a permit.
    struct Gate(Arc<Semaphore>);

    #[async_trait]
    impl Payload for Gate {
        async fn run(&self, _ctx: &TaskContext) -> Result<serde_json::Value, ExecutionError> {
            self.0
                .acquire()
                .await
                .map_err(|_| ExecutionError::transient("gate closed"))?
                .forget();
            Ok(serde_json::Value::Null)
        }
    }

    /// Fails `n` times, then succeeds.
    struct Flaky(AtomicU32);

    #[async_trait]
    impl Payload for Flaky {
        async fn run(&self, _ctx: &TaskContext) -> Result<serde_json::Value, ExecutionError> {
            let left = self.0.load(Ordering::Relaxed);
            if left > 0 {
                self.0.fetch_sub(1, Ordering::Relaxed);
                return Err(ExecutionError::transient(format!(
                    "intentional failure (left={left})"
                )));
            }
            Ok(json!("recovered"))
        }
    }

    /// Always fails, transiently or permanently.
    struct AlwaysFails {
        permanent: bool,
    }

    #[async_trait]
    impl Payload for AlwaysFails {
        async fn run(&self, _ctx: &TaskContext) -> Result<serde_json::Value, ExecutionError> {
            if self.permanent {
                Err(ExecutionError::permanent("no point retrying"))
            } else {
                Err(ExecutionError::transient("boom"))
            }
        }
    }

    /// Sets a flag if it ever runs.
    struct Tripwire(Arc<AtomicBool>);

    #[async_trait]
    impl Payload for Tripwire {
        async fn run(&self, _ctx: &TaskContext) -> Result<serde_json::Value, ExecutionError> {
            self.0.store(true, Ordering::Relaxed);
            Ok(serde_json::Value::Null)
        }
    }

    /// Tracks how many instances run at once.
    struct Gauge {
        current: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Payload for Gauge {
        async fn run(&self, _ctx: &TaskContext) -> Result<serde_json::Value, ExecutionError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            sleep(Duration::from_millis(20)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(serde_json::Value::Null)
        }
    }

    /// Counts invocations.
    struct Counter(Arc<AtomicU32>);

    #[async_trait]
    impl Payload for Counter {
        async fn run(&self, _ctx: &TaskContext) -> Result<serde_json::Value, ExecutionError> {
            let n = self.0.fetch_add(1, Ordering::Relaxed) + 1;
            Ok(json!(n))
        }
    }

    /// Sleeps, then completes.
    struct Sleeper(Duration);

    #[async_trait]
    impl Payload for Sleeper {
        async fn run(&self, _ctx: &TaskContext) -> Result<serde_json::Value, ExecutionError> {
            sleep(self.0).await;
            Ok(serde_json::Value::Null)
        }
    }

    // ---- end to end --------------------------------------------------------

    #[tokio::test]
    async fn echo_task_completes_with_its_input() {
        let engine = engine(2);
        let input = json!({"message": "hello"});

        let id = engine
            .create(TaskSpec::new("echo", Echo(input.clone())).priority(Priority::Medium))
            .await
            .unwrap();
        engine.submit(id).await.unwrap();

        let status = wait(&engine, id).await;
        assert_eq!(status.state, TaskState::Completed);
        assert_eq!(status.result, Some(input));
        assert_eq!(status.attempts, 1);
        assert!(status.error.is_none());

        engine.shutdown(ShutdownMode::Drain).await;
    }

    // ---- ordering ----------------------------------------------------------

    #[tokio::test]
    async fn higher_priority_dispatches_first() {
        let engine = engine(1);
        let gate = Arc::new(Semaphore::new(0));
        let log = Arc::new(StdMutex::new(Vec::new()));

        let blocker = engine
            .create(TaskSpec::new("blocker", Gate(gate.clone())))
            .await
            .unwrap();
        engine.submit(blocker).await.unwrap();
        sleep(Duration::from_millis(50)).await; // the only worker is now busy

        let low = engine
            .create(TaskSpec::new("low", Recorder { label: "low", log: log.clone() }).priority(Priority::Low))
            .await
            .unwrap();
        let high = engine
            .create(TaskSpec::new("high", Recorder { label: "high", log: log.clone() }).priority(Priority::High))
            .await
            .unwrap();
        engine.submit(low).await.unwrap();
        engine.submit(high).await.unwrap();

        gate.add_permits(1);
        wait(&engine, low).await;
        wait(&engine, high).await;

        assert_eq!(*log.lock().unwrap(), vec!["high", "low"]);
    }

    #[tokio::test]
    async fn equal_priority_dispatches_fifo() {
        let engine = engine(1);
        let gate = Arc::new(Semaphore::new(0));
        let log = Arc::new(StdMutex::new(Vec::new()));

        let blocker = engine
            .create(TaskSpec::new("blocker", Gate(gate.clone())))
            .await
            .unwrap();
        engine.submit(blocker).await.unwrap();
        sleep(Duration::from_millis(50)).await;

        let mut ids = Vec::new();
        for label in ["first", "second", "third"] {
            let id = engine
                .create(TaskSpec::new(label, Recorder { label, log: log.clone() }))
                .await
                .unwrap();
            engine.submit(id).await.unwrap();
            ids.push(id);
        }

        gate.add_permits(1);
        for id in ids {
            wait(&engine, id).await;
        }

        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    // ---- retries -----------------------------------------------------------

    #[tokio::test]
    async fn exhausted_retries_end_failed() {
        let engine = engine(1);
        let id = engine
            .create(
                TaskSpec::new("always-fails", AlwaysFails { permanent: false })
                    .max_retries(2)
                    .retry_policy(quick_retry()),
            )
            .await
            .unwrap();
        engine.submit(id).await.unwrap();

        let status = wait(&engine, id).await;
        assert_eq!(status.state, TaskState::Failed);
        assert_eq!(status.attempts, 3); // max_retries + 1 runs
        assert_eq!(status.error.as_deref(), Some("boom"));

        let stats = engine.stats().await;
        assert_eq!(stats.retries, 2);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn flaky_task_recovers_within_budget() {
        let engine = engine(1);
        let id = engine
            .create(
                TaskSpec::new("flaky", Flaky(AtomicU32::new(2)))
                    .max_retries(3)
                    .retry_policy(quick_retry()),
            )
            .await
            .unwrap();
        engine.submit(id).await.unwrap();

        let status = wait(&engine, id).await;
        assert_eq!(status.state, TaskState::Completed);
        assert_eq!(status.attempts, 3);
        assert_eq!(status.result, Some(json!("recovered")));
    }

    #[tokio::test]
    async fn permanent_failure_skips_retries() {
        let engine = engine(1);
        let id = engine
            .create(TaskSpec::new("doomed", AlwaysFails { permanent: true }).max_retries(5))
            .await
            .unwrap();
        engine.submit(id).await.unwrap();

        let status = wait(&engine, id).await;
        assert_eq!(status.state, TaskState::Failed);
        assert_eq!(status.attempts, 1);
    }

    // ---- cancellation ------------------------------------------------------

    #[tokio::test]
    async fn cancelled_pending_task_never_runs() {
        let engine = engine(1);
        let gate = Arc::new(Semaphore::new(0));
        let tripped = Arc::new(AtomicBool::new(false));

        let blocker = engine
            .create(TaskSpec::new("blocker", Gate(gate.clone())))
            .await
            .unwrap();
        engine.submit(blocker).await.unwrap();
        sleep(Duration::from_millis(50)).await;

        let victim = engine
            .create(TaskSpec::new("victim", Tripwire(tripped.clone())))
            .await
            .unwrap();
        engine.submit(victim).await.unwrap();

        assert_eq!(engine.cancel(victim).await.unwrap(), TaskState::Cancelled);

        gate.add_permits(1);
        wait(&engine, blocker).await;
        sleep(Duration::from_millis(50)).await;

        assert!(!tripped.load(Ordering::Relaxed));
        assert_eq!(
            engine.status(victim).await.unwrap().state,
            TaskState::Cancelled
        );
    }

    #[tokio::test]
    async fn cancel_is_a_noop_on_terminal_tasks() {
        let engine = engine(1);
        let id = engine
            .create(TaskSpec::new("echo", Echo(json!(1))))
            .await
            .unwrap();
        engine.submit(id).await.unwrap();
        wait(&engine, id).await;

        assert_eq!(engine.cancel(id).await.unwrap(), TaskState::Completed);
    }

    #[tokio::test]
    async fn running_task_observes_the_cancel_flag() {
        struct PollsCancel;

        #[async_trait]
        impl Payload for PollsCancel {
            async fn run(
                &self,
                ctx: &TaskContext,
            ) -> Result<serde_json::Value, ExecutionError> {
                for _ in 0..200 {
                    if ctx.is_cancelled() {
                        return Ok(json!("stopped early"));
                    }
                    sleep(Duration::from_millis(5)).await;
                }
                Ok(json!("ran to the end"))
            }
        }

        let engine = engine(1);
        let id = engine
            .create(TaskSpec::new("poller", PollsCancel))
            .await
            .unwrap();
        engine.submit(id).await.unwrap();
        sleep(Duration::from_millis(30)).await;

        // Cancelling a running task only raises the flag.
        assert_eq!(engine.cancel(id).await.unwrap(), TaskState::Running);

        let status = wait(&engine, id).await;
        assert_eq!(status.state, TaskState::Completed);
        assert_eq!(status.result, Some(json!("stopped early")));
    }

    // ---- worker pool -------------------------------------------------------

    #[tokio::test]
    async fn parallelism_is_bounded_by_max_workers() {
        let engine = engine(2);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut ids = Vec::new();
        for i in 0..8 {
            let id = engine
                .create(TaskSpec::new(
                    format!("gauge-{i}"),
                    Gauge {
                        current: current.clone(),
                        peak: peak.clone(),
                    },
                ))
                .await
                .unwrap();
            engine.submit(id).await.unwrap();
            ids.push(id);
        }
        for id in ids {
            wait(&engine, id).await;
        }

        let observed = peak.load(Ordering::SeqCst);
        assert!(observed <= 2, "observed {observed} concurrent runs");
        assert!(observed >= 1);
    }

    // ---- workflows ---------------------------------------------------------

    #[tokio::test]
    async fn sequential_workflow_runs_in_declared_order() {
        let engine = engine(2);
        let log = Arc::new(StdMutex::new(Vec::new()));

        let mut members = Vec::new();
        for label in ["one", "two", "three"] {
            let id = engine
                .create(TaskSpec::new(label, Recorder { label, log: log.clone() }))
                .await
                .unwrap();
            members.push(id);
        }

        let wf = engine
            .submit_workflow(WorkflowSpec::sequential("chain", members.clone()))
            .await
            .unwrap();

        for &id in &members {
            wait(&engine, id).await;
        }
        assert_eq!(*log.lock().unwrap(), vec!["one", "two", "three"]);
        assert_eq!(
            engine.workflow_status(wf).await.unwrap().state,
            WorkflowState::Completed
        );
    }

    #[tokio::test]
    async fn aborting_workflow_cancels_unstarted_members() {
        let engine = engine(2);
        let log = Arc::new(StdMutex::new(Vec::new()));

        let t1 = engine
            .create(
                TaskSpec::new("fails", AlwaysFails { permanent: false }).max_retries(0),
            )
            .await
            .unwrap();
        let t2 = engine
            .create(TaskSpec::new("two", Recorder { label: "two", log: log.clone() }))
            .await
            .unwrap();
        let t3 = engine
            .create(TaskSpec::new("three", Recorder { label: "three", log: log.clone() }))
            .await
            .unwrap();

        let wf = engine
            .submit_workflow(WorkflowSpec::sequential("chain", vec![t1, t2, t3]))
            .await
            .unwrap();

        assert_eq!(wait(&engine, t1).await.state, TaskState::Failed);
        assert_eq!(wait(&engine, t2).await.state, TaskState::Cancelled);
        assert_eq!(wait(&engine, t3).await.state, TaskState::Cancelled);
        assert!(log.lock().unwrap().is_empty());

        let status = engine.workflow_status(wf).await.unwrap();
        assert_eq!(status.state, WorkflowState::Failed);
        assert_eq!(status.cancelled, 2);
    }

    #[tokio::test]
    async fn workflow_without_abort_runs_independent_branches() {
        let engine = engine(2);
        let log = Arc::new(StdMutex::new(Vec::new()));

        let failing = engine
            .create(
                TaskSpec::new("fails", AlwaysFails { permanent: false }).max_retries(0),
            )
            .await
            .unwrap();
        let independent = engine
            .create(TaskSpec::new("free", Recorder { label: "free", log: log.clone() }))
            .await
            .unwrap();
        let dependent = engine
            .create(TaskSpec::new("stuck", Recorder { label: "stuck", log: log.clone() }))
            .await
            .unwrap();

        let mut deps = HashMap::new();
        deps.insert(dependent, vec![failing]);
        let wf = engine
            .submit_workflow(
                WorkflowSpec::with_dependencies(
                    "branches",
                    vec![failing, independent, dependent],
                    deps,
                )
                .abort_on_failure(false),
            )
            .await
            .unwrap();

        assert_eq!(wait(&engine, failing).await.state, TaskState::Failed);
        assert_eq!(wait(&engine, independent).await.state, TaskState::Completed);
        assert_eq!(wait(&engine, dependent).await.state, TaskState::Cancelled);
        assert_eq!(*log.lock().unwrap(), vec!["free"]);

        assert_eq!(
            engine.workflow_status(wf).await.unwrap().state,
            WorkflowState::Failed
        );
    }

    #[tokio::test]
    async fn fan_in_waits_for_every_dependency() {
        let engine = engine(2);
        let log = Arc::new(StdMutex::new(Vec::new()));

        let a = engine
            .create(TaskSpec::new("a", Recorder { label: "a", log: log.clone() }))
            .await
            .unwrap();
        let b = engine
            .create(TaskSpec::new("b", Recorder { label: "b", log: log.clone() }))
            .await
            .unwrap();
        let join = engine
            .create(TaskSpec::new("join", Recorder { label: "join", log: log.clone() }))
            .await
            .unwrap();

        let mut deps = HashMap::new();
        deps.insert(join, vec![a, b]);
        engine
            .submit_workflow(WorkflowSpec::with_dependencies(
                "fan-in",
                vec![a, b, join],
                deps,
            ))
            .await
            .unwrap();

        wait(&engine, join).await;
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log[2], "join");
    }

    #[tokio::test]
    async fn workflow_cycles_are_rejected() {
        let engine = engine(1);
        let a = engine
            .create(TaskSpec::new("a", Echo(json!(null))))
            .await
            .unwrap();
        let b = engine
            .create(TaskSpec::new("b", Echo(json!(null))))
            .await
            .unwrap();

        let mut deps = HashMap::new();
        deps.insert(a, vec![b]);
        deps.insert(b, vec![a]);
        let err = engine
            .submit_workflow(WorkflowSpec::with_dependencies("cyclic", vec![a, b], deps))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DependencyCycle(_)));

        // Rejection leaves the members untouched and individually usable.
        assert_eq!(engine.status(a).await.unwrap().state, TaskState::Pending);
        engine.submit(a).await.unwrap();
        assert_eq!(wait(&engine, a).await.state, TaskState::Completed);
    }

    #[tokio::test]
    async fn workflow_members_cannot_be_submitted_directly() {
        let engine = engine(1);
        let a = engine
            .create(TaskSpec::new("a", Sleeper(Duration::from_millis(50))))
            .await
            .unwrap();
        let b = engine
            .create(TaskSpec::new("b", Echo(json!(null))))
            .await
            .unwrap();
        engine
            .submit_workflow(WorkflowSpec::sequential("chain", vec![a, b]))
            .await
            .unwrap();

        let err = engine.submit(b).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfiguration(_)));
    }

    // ---- scheduling --------------------------------------------------------

    #[tokio::test]
    async fn one_shot_trigger_fires_once() {
        let engine = engine(1);
        let count = Arc::new(AtomicU32::new(0));
        let id = engine
            .create(TaskSpec::new("once", Counter(count.clone())))
            .await
            .unwrap();

        engine
            .schedule_at(id, Utc::now() + chrono::Duration::milliseconds(50))
            .await
            .unwrap();
        assert_eq!(engine.status(id).await.unwrap().state, TaskState::Scheduled);

        let status = wait(&engine, id).await;
        assert_eq!(status.state, TaskState::Completed);
        assert!(status.scheduled_at.is_some());
        assert_eq!(count.load(Ordering::Relaxed), 1);

        // The entry is gone; no further firings.
        sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::Relaxed), 1);
        assert_eq!(engine.stats().await.scheduled_entries, 0);
    }

    #[tokio::test]
    async fn past_one_shot_fires_exactly_once() {
        let engine = engine(1);
        let count = Arc::new(AtomicU32::new(0));
        let id = engine
            .create(TaskSpec::new("overdue", Counter(count.clone())))
            .await
            .unwrap();

        engine
            .schedule_at(id, Utc::now() - chrono::Duration::hours(3))
            .await
            .unwrap();

        wait(&engine, id).await;
        sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn interval_trigger_repeats_and_stops_on_cancel() {
        let engine = engine(1);
        let count = Arc::new(AtomicU32::new(0));
        let id = engine
            .create(TaskSpec::new("heartbeat", Counter(count.clone())))
            .await
            .unwrap();

        engine
            .schedule_every(id, Duration::from_millis(60))
            .await
            .unwrap();

        sleep(Duration::from_millis(400)).await;
        engine.cancel(id).await.unwrap();
        sleep(Duration::from_millis(50)).await; // let any in-flight run finish
        let fired = count.load(Ordering::Relaxed);
        assert!(
            (2..=9).contains(&fired),
            "expected a steady cadence, saw {fired} firings"
        );

        // Cancellation removed the trigger; the count stays put.
        sleep(Duration::from_millis(150)).await;
        assert_eq!(count.load(Ordering::Relaxed), fired);
        assert_eq!(engine.stats().await.scheduled_entries, 0);
    }

    #[tokio::test]
    async fn rescheduling_an_active_schedule_is_rejected() {
        let engine = engine(1);
        let id = engine
            .create(TaskSpec::new("t", Sleeper(Duration::from_secs(5))))
            .await
            .unwrap();

        engine
            .schedule_every(id, Duration::from_secs(10))
            .await
            .unwrap();
        let err = engine
            .schedule_at(id, Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::AlreadyScheduled(_)));
    }

    #[tokio::test]
    async fn double_submit_is_rejected() {
        let engine = engine(1);
        let gate = Arc::new(Semaphore::new(0));

        let blocker = engine
            .create(TaskSpec::new("blocker", Gate(gate.clone())))
            .await
            .unwrap();
        engine.submit(blocker).await.unwrap();
        sleep(Duration::from_millis(30)).await;

        let id = engine
            .create(TaskSpec::new("t", Echo(json!(null))))
            .await
            .unwrap();
        engine.submit(id).await.unwrap();
        let err = engine.submit(id).await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadyScheduled(_)));

        gate.add_permits(1);
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let engine = engine(1);
        let id = engine
            .create(TaskSpec::new("t", Echo(json!(null))))
            .await
            .unwrap();
        let err = engine.schedule_every(id, Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfiguration(_)));
    }

    // ---- errors ------------------------------------------------------------

    #[tokio::test]
    async fn operations_on_unknown_ids_fail() {
        let engine = engine(1);
        let ghost = TaskId::generate();

        assert!(matches!(
            engine.submit(ghost).await.unwrap_err(),
            EngineError::UnknownTask(_)
        ));
        assert!(matches!(
            engine.status(ghost).await.unwrap_err(),
            EngineError::UnknownTask(_)
        ));
        assert!(matches!(
            engine.wait_for(ghost).await.unwrap_err(),
            EngineError::UnknownTask(_)
        ));
        assert!(matches!(
            engine.cancel(ghost).await.unwrap_err(),
            EngineError::UnknownTask(_)
        ));
    }

    #[tokio::test]
    async fn out_of_range_retry_config_is_rejected_at_creation() {
        let engine = engine(1);
        let err = engine
            .create(TaskSpec::new("t", Echo(json!(null))).max_retries(5000))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfiguration(_)));
    }

    // ---- observability -----------------------------------------------------

    #[tokio::test]
    async fn stats_snapshot_reflects_outcomes() {
        let engine = engine(2);

        for i in 0..2 {
            let id = engine
                .create(TaskSpec::new(
                    format!("sleep-{i}"),
                    Sleeper(Duration::from_millis(15)),
                ))
                .await
                .unwrap();
            engine.submit(id).await.unwrap();
            wait(&engine, id).await;
        }

        let failing = engine
            .create(
                TaskSpec::new("fails", AlwaysFails { permanent: false })
                    .max_retries(1)
                    .retry_policy(quick_retry()),
            )
            .await
            .unwrap();
        engine.submit(failing).await.unwrap();
        wait(&engine, failing).await;

        let doomed = engine
            .create(TaskSpec::new("never-runs", Echo(json!(null))))
            .await
            .unwrap();
        engine.cancel(doomed).await.unwrap();

        let stats = engine.stats().await;
        assert_eq!(stats.total_tasks, 4);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.retries, 1);
        assert_eq!(stats.states.completed, 2);
        assert!(stats.average_duration_ms > 0.0);
        assert!(stats.p50_duration_ms.is_some());
    }

    #[tokio::test]
    async fn list_tasks_filters_by_state() {
        let engine = engine(1);
        let done = engine
            .create(TaskSpec::new("done", Echo(json!(null))))
            .await
            .unwrap();
        engine.submit(done).await.unwrap();
        wait(&engine, done).await;

        engine
            .create(TaskSpec::new("idle", Echo(json!(null))))
            .await
            .unwrap();

        let completed = engine.list_tasks(Some(TaskState::Completed)).await;
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, done);
        assert_eq!(engine.list_tasks(None).await.len(), 2);
    }

    // ---- shutdown ----------------------------------------------------------

    #[tokio::test]
    async fn drain_shutdown_finishes_queued_work() {
        let engine = engine(2);
        let mut ids = Vec::new();
        for i in 0..5 {
            let id = engine
                .create(TaskSpec::new(format!("t-{i}"), Echo(json!(i))))
                .await
                .unwrap();
            engine.submit(id).await.unwrap();
            ids.push(id);
        }

        engine.shutdown(ShutdownMode::Drain).await;

        for id in ids {
            assert_eq!(engine.status(id).await.unwrap().state, TaskState::Completed);
        }

        let err = engine
            .create(TaskSpec::new("late", Echo(json!(null))))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ShuttingDown));
    }

    #[tokio::test]
    async fn cancel_pending_shutdown_drops_queued_work() {
        let engine = engine(1);
        let tripped = Arc::new(AtomicBool::new(false));

        let slow = engine
            .create(TaskSpec::new("slow", Sleeper(Duration::from_millis(80))))
            .await
            .unwrap();
        engine.submit(slow).await.unwrap();
        sleep(Duration::from_millis(30)).await; // the worker is mid-run

        let mut victims = Vec::new();
        for i in 0..3 {
            let id = engine
                .create(TaskSpec::new(format!("victim-{i}"), Tripwire(tripped.clone())))
                .await
                .unwrap();
            engine.submit(id).await.unwrap();
            victims.push(id);
        }

        engine.shutdown(ShutdownMode::CancelPending).await;

        assert_eq!(engine.status(slow).await.unwrap().state, TaskState::Completed);
        for id in victims {
            assert_eq!(engine.status(id).await.unwrap().state, TaskState::Cancelled);
        }
        assert!(!tripped.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn shutdown_cancels_unfired_triggers() {
        let engine = engine(1);
        let tripped = Arc::new(AtomicBool::new(false));
        let id = engine
            .create(TaskSpec::new("later", Tripwire(tripped.clone())))
            .await
            .unwrap();
        engine
            .schedule_at(id, Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();

        engine.shutdown(ShutdownMode::Drain).await;

        assert_eq!(engine.status(id).await.unwrap().state, TaskState::Cancelled);
        assert!(!tripped.load(Ordering::Relaxed));
    }
}
