//! Fire-and-forget metrics for restart flows.
//!
//! Correctness never depends on a sink; the default implementation of every
//! method is a no-op.

use crate::options::RestartSource;
use crate::result::OpResult;
use crate::types::RestartStage;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Filesystem corruption classification observed while starting the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Corruption {
    /// The user disk failed to mount.
    MountFailed,
    /// The mount was rolled back with partial data loss; the VM still came up.
    MountRolledBack,
    /// Corruption reported outside the mount path.
    Other,
}

/// Sink for restart telemetry. All methods default to no-ops.
pub trait MetricsSink: Send + Sync {
    fn restart_started(&self, source: RestartSource) {
        let _ = source;
    }

    fn restart_result(&self, source: RestartSource, result: OpResult) {
        let _ = (source, result);
    }

    fn stage_duration(&self, stage: RestartStage, elapsed: Duration) {
        let _ = (stage, elapsed);
    }

    fn corruption(&self, state: Corruption) {
        let _ = state;
    }
}

/// Sink that drops every sample.
pub struct NullMetrics;

impl MetricsSink for NullMetrics {}

/// In-memory sink counting every sample.
///
/// Counters are lock-free where a single value suffices; keyed counts sit
/// behind one mutex since they are written once per restart, not per stage.
#[derive(Default)]
pub struct MetricsRecorder {
    restarts_started: AtomicU64,
    results: Mutex<HashMap<(RestartSource, OpResult), u64>>,
    stage_samples: Mutex<HashMap<RestartStage, u64>>,
    corruption: Mutex<HashMap<Corruption, u64>>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restarts_started(&self) -> u64 {
        self.restarts_started.load(Ordering::Relaxed)
    }

    pub fn result_count(&self, source: RestartSource, result: OpResult) -> u64 {
        *self.results.lock().get(&(source, result)).unwrap_or(&0)
    }

    /// Total results recorded across sources and outcomes.
    pub fn total_results(&self) -> u64 {
        self.results.lock().values().sum()
    }

    pub fn stage_sample_count(&self, stage: RestartStage) -> u64 {
        *self.stage_samples.lock().get(&stage).unwrap_or(&0)
    }

    pub fn corruption_count(&self, state: Corruption) -> u64 {
        *self.corruption.lock().get(&state).unwrap_or(&0)
    }
}

impl MetricsSink for MetricsRecorder {
    fn restart_started(&self, _source: RestartSource) {
        self.restarts_started.fetch_add(1, Ordering::Relaxed);
    }

    fn restart_result(&self, source: RestartSource, result: OpResult) {
        *self.results.lock().entry((source, result)).or_insert(0) += 1;
    }

    fn stage_duration(&self, stage: RestartStage, _elapsed: Duration) {
        *self.stage_samples.lock().entry(stage).or_insert(0) += 1;
    }

    fn corruption(&self, state: Corruption) {
        *self.corruption.lock().entry(state).or_insert(0) += 1;
    }
}
