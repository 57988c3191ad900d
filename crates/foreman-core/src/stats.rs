//! Execution statistics.
//!
//! Counters are bumped on terminal transitions and retries, under the same
//! state lock as the transition itself; snapshots copy everything out so
//! readers never contend with workers beyond that lock.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Live per-state task counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    pub pending: usize,
    pub scheduled: usize,
    pub running: usize,
    pub retrying: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// Cumulative counters and duration samples.
#[derive(Default)]
pub(crate) struct StatsCollector {
    completed: u64,
    failed: u64,
    cancelled: u64,
    retries: u64,
    durations_ms: Vec<u64>,
}

impl StatsCollector {
    pub fn record_completed(&mut self, duration: Option<Duration>) {
        self.completed += 1;
        if let Some(d) = duration {
            self.durations_ms.push(d.as_millis() as u64);
        }
    }

    pub fn record_failed(&mut self, duration: Option<Duration>) {
        self.failed += 1;
        if let Some(d) = duration {
            self.durations_ms.push(d.as_millis() as u64);
        }
    }

    pub fn record_cancelled(&mut self) {
        self.cancelled += 1;
    }

    pub fn record_retry(&mut self) {
        self.retries += 1;
    }

    pub fn snapshot(
        &self,
        total_tasks: usize,
        states: StateCounts,
        queue_depth: usize,
        scheduled_entries: usize,
    ) -> StatsSnapshot {
        let mut sorted = self.durations_ms.clone();
        sorted.sort_unstable();

        let average = if sorted.is_empty() {
            0.0
        } else {
            sorted.iter().sum::<u64>() as f64 / sorted.len() as f64
        };

        StatsSnapshot {
            total_tasks,
            states,
            queue_depth,
            scheduled_entries,
            completed: self.completed,
            failed: self.failed,
            cancelled: self.cancelled,
            retries: self.retries,
            average_duration_ms: average,
            p50_duration_ms: percentile(&sorted, 50.0),
            p90_duration_ms: percentile(&sorted, 90.0),
            p99_duration_ms: percentile(&sorted, 99.0),
        }
    }
}

/// Nearest-rank percentile over a sorted slice.
fn percentile(sorted: &[u64], p: f64) -> Option<u64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    let idx = rank.max(1) - 1;
    Some(sorted[idx.min(sorted.len() - 1)])
}

/// Read-only statistics snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total_tasks: usize,
    pub states: StateCounts,
    pub queue_depth: usize,
    pub scheduled_entries: usize,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub retries: u64,
    pub average_duration_ms: f64,
    pub p50_duration_ms: Option<u64>,
    pub p90_duration_ms: Option<u64>,
    pub p99_duration_ms: Option<u64>,
}
