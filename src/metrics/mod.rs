//! Per-hook-type execution metrics
//!
//! Counters plus a bounded window of recent durations for percentile
//! reporting. Mutated only from the scheduler's decision path; external
//! consumers read serializable snapshots through the engine's query
//! interface.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::record::HookStatus;
use crate::core::request::HookType;

/// How many recent durations each counter retains
pub const DURATION_WINDOW: usize = 100;

/// Live counter state for one hook type
#[derive(Debug, Default, Clone)]
pub struct MetricsCounter {
    /// Terminal outcomes observed
    pub total: u64,
    /// Successful executions
    pub succeeded: u64,
    /// Terminal failures (permanent or attempts exhausted)
    pub failed: u64,
    /// Terminal timeouts
    pub timed_out: u64,
    /// Cancellations (queue removal, shutdown, forced reclaim)
    pub cancelled: u64,
    /// Ring buffer of the most recent execution durations
    durations: VecDeque<Duration>,
}

impl MetricsCounter {
    /// Record one terminal outcome with its duration
    pub fn record(&mut self, status: HookStatus, duration: Duration) {
        debug_assert!(status.is_terminal());
        self.total += 1;
        match status {
            HookStatus::Succeeded => self.succeeded += 1,
            HookStatus::Failed => self.failed += 1,
            HookStatus::TimedOut => self.timed_out += 1,
            HookStatus::Cancelled => self.cancelled += 1,
            _ => {}
        }

        if self.durations.len() == DURATION_WINDOW {
            self.durations.pop_front();
        }
        self.durations.push_back(duration);
    }

    /// Percentile over the retained duration window (p in 0.0..=1.0)
    pub fn percentile(&self, p: f64) -> Option<Duration> {
        if self.durations.is_empty() {
            return None;
        }
        let mut sorted: Vec<Duration> = self.durations.iter().copied().collect();
        sorted.sort();
        let rank = ((sorted.len() as f64 - 1.0) * p.clamp(0.0, 1.0)).round() as usize;
        Some(sorted[rank])
    }

    /// Immutable snapshot for reporting
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total: self.total,
            succeeded: self.succeeded,
            failed: self.failed,
            timed_out: self.timed_out,
            cancelled: self.cancelled,
            recent_samples: self.durations.len(),
            p50: self.percentile(0.50),
            p90: self.percentile(0.90),
            p99: self.percentile(0.99),
        }
    }
}

/// Point-in-time view of one hook type's metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Terminal outcomes observed
    pub total: u64,
    /// Successful executions
    pub succeeded: u64,
    /// Terminal failures
    pub failed: u64,
    /// Terminal timeouts
    pub timed_out: u64,
    /// Cancellations
    pub cancelled: u64,
    /// Durations currently in the percentile window
    pub recent_samples: usize,
    /// Median duration
    pub p50: Option<Duration>,
    /// 90th percentile duration
    pub p90: Option<Duration>,
    /// 99th percentile duration
    pub p99: Option<Duration>,
}

/// Counters for every hook type
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: HashMap<HookType, MetricsCounter>,
}

impl MetricsRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a terminal outcome for `hook_type`
    pub fn record(&mut self, hook_type: HookType, status: HookStatus, duration: Duration) {
        self.counters
            .entry(hook_type)
            .or_default()
            .record(status, duration);
    }

    /// Snapshot for one hook type, if it has ever recorded an outcome
    pub fn snapshot(&self, hook_type: HookType) -> Option<MetricsSnapshot> {
        self.counters.get(&hook_type).map(MetricsCounter::snapshot)
    }

    /// Snapshots for every hook type that has recorded an outcome
    pub fn all_snapshots(&self) -> Vec<(HookType, MetricsSnapshot)> {
        let mut all: Vec<_> = self
            .counters
            .iter()
            .map(|(t, c)| (*t, c.snapshot()))
            .collect();
        all.sort_by_key(|(t, _)| t.as_str());
        all
    }
}
