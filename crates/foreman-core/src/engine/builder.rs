//! Engine construction and fail-fast validation.
//!
//! Everything that can be rejected is rejected at `build()` time, with a
//! message naming the offending value — misconfiguration should fail the
//! process at startup, not a task at 3am.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::core::EngineInner;
use super::{Handles, TaskEngine};
use crate::error::EngineError;
use crate::queue::RetryPolicy;
use crate::scheduler;
use crate::worker::WorkerGroup;

/// Builder for [`TaskEngine`].
///
/// # Example
/// ```ignore
/// let engine = TaskEngine::builder()
///     .max_workers(4)
///     .tick_interval(Duration::from_millis(500))
///     .build()?;
/// ```
pub struct EngineBuilder {
    max_workers: usize,
    tick_interval: Duration,
    default_retry: RetryPolicy,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            max_workers: 5,
            tick_interval: Duration::from_secs(1),
            default_retry: RetryPolicy::default(),
        }
    }

    /// Number of concurrent workers. Bounds true parallelism; submission
    /// never blocks on it.
    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Cadence of the scheduler tick that fires time/interval triggers.
    pub fn tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    /// Backoff policy for tasks that do not carry their own.
    pub fn default_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.default_retry = policy;
        self
    }

    /// Validate the configuration and start the engine. Workers and the
    /// scheduler tick are live when this returns, so it must be called from
    /// within a tokio runtime.
    pub fn build(self) -> Result<TaskEngine, EngineError> {
        if self.max_workers == 0 {
            return Err(EngineError::InvalidConfiguration(
                "max_workers must be at least 1".to_string(),
            ));
        }
        if self.tick_interval.is_zero() {
            return Err(EngineError::InvalidConfiguration(
                "tick_interval must be non-zero".to_string(),
            ));
        }
        self.default_retry.validate()?;

        let inner = Arc::new(EngineInner::new(self.default_retry));
        let workers = WorkerGroup::spawn(self.max_workers, Arc::clone(&inner));

        let (scheduler_tx, scheduler_rx) = watch::channel(false);
        let scheduler = tokio::spawn(scheduler::tick_loop(
            Arc::clone(&inner),
            self.tick_interval,
            scheduler_rx,
        ));

        tracing::info!(
            max_workers = self.max_workers,
            tick_ms = self.tick_interval.as_millis() as u64,
            "engine started"
        );

        Ok(TaskEngine::assemble(
            inner,
            Handles {
                workers,
                scheduler_tx,
                scheduler,
            },
        ))
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
