//! Worker pool: fixed-size set of concurrent executors.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::domain::{ExecutionError, TaskContext};
use crate::engine::core::{Dispatch, EngineInner};

/// Worker group handle.
/// - `request_shutdown()` stops workers from taking new dispatches
/// - `join_all()` waits for every worker to exit on its own (drain)
pub(crate) struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers against the shared engine state.
    pub fn spawn(n: usize, inner: Arc<EngineInner>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let engine = Arc::clone(&inner);
            let mut rx = shutdown_rx.clone();

            let join = tokio::spawn(async move {
                worker_loop(worker_id, engine, &mut rx).await;
            });
            joins.push(join);
        }

        Self { shutdown_tx, joins }
    }

    /// Stop taking new dispatches. In-flight payload execution is not
    /// interrupted; it finishes and its outcome is recorded.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for all workers to exit. Workers leave on their own once the
    /// engine reports itself drained, so a drain-mode shutdown just joins.
    pub async fn join_all(self) {
        for j in self.joins {
            let _ = j.await;
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    engine: Arc<EngineInner>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    loop {
        // shutdown が来ていたら新しい dispatch は取らない
        if *shutdown_rx.borrow() {
            break;
        }

        // acquire は待つ可能性があるので shutdown シグナルと select する
        let dispatch = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break; // Sender gone; nothing will ever signal again.
                }
                continue;
            }
            dispatch = engine.acquire() => dispatch,
        };

        let Some(dispatch) = dispatch else {
            // Engine is shutting down and the queues are drained.
            break;
        };

        run_one(worker_id, &engine, dispatch).await;
    }
    tracing::debug!(worker_id, "worker stopped");
}

/// Execute a single dispatch and report the outcome. No lock is held here;
/// payload execution may block for as long as it likes (bounded only by the
/// task's own timeout, when it has one).
async fn run_one(worker_id: usize, engine: &EngineInner, dispatch: Dispatch) {
    let Dispatch {
        task_id,
        attempt,
        payload,
        timeout,
        cancel_flag,
    } = dispatch;

    tracing::debug!(worker_id, task = %task_id, attempt, "executing task");
    let ctx = TaskContext::new(task_id, attempt, cancel_flag);

    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, payload.run(&ctx)).await {
            Ok(result) => result,
            Err(_) => Err(ExecutionError::transient(format!(
                "timed out after {}ms",
                limit.as_millis()
            ))),
        },
        None => payload.run(&ctx).await,
    };

    match outcome {
        Ok(result) => engine.report_success(task_id, result).await,
        Err(error) => engine.report_failure(task_id, error).await,
    }
}
