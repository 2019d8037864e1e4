//! Persistence and run tracing for evalloop.
//!
//! [`MonitorStore`] keeps scored-table artifacts, monitoring results and
//! pipeline run traces in SQLite. Engines report step executions through the
//! [`RunObserver`] trait; [`RunCollector`] persists them, [`InMemoryObserver`]
//! only aggregates.

mod collector;
mod store;
mod trace;

pub use collector::RunCollector;
pub use store::{MonitorStore, MonitorSummary, StoreError};
pub use trace::{
    DatasetArtifact, DatasetSummary, ResultQuery, ResultRecord, RunQuery, RunRecord, RunStatus,
    StepRecord, StepStatus,
};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Outcome of a single step execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepMetrics {
    pub step_id: String,
    pub function: String,
    pub status: StepStatus,
    /// Unix timestamp (milliseconds).
    pub start_time: i64,
    pub end_time: i64,
    #[serde(default)]
    pub outputs: HashMap<String, String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl StepMetrics {
    pub fn new(step_id: impl Into<String>, function: impl Into<String>, status: StepStatus) -> Self {
        let now = now_ms();
        Self {
            step_id: step_id.into(),
            function: function.into(),
            status,
            start_time: now,
            end_time: now,
            outputs: HashMap::new(),
            error: None,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        (self.end_time - self.start_time).max(0) as u64
    }
}

/// Aggregated step outcomes for one pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub pipeline_id: String,
    pub steps_succeeded: u32,
    pub steps_failed: u32,
    pub steps_skipped: u32,
    /// Sum of step durations in milliseconds.
    pub total_step_ms: u64,
    pub steps: Vec<StepMetrics>,
}

impl RunSummary {
    fn from_steps(pipeline_id: &str, steps: Vec<StepMetrics>) -> Self {
        let mut summary = Self {
            pipeline_id: pipeline_id.to_string(),
            ..Default::default()
        };
        for s in &steps {
            match s.status {
                StepStatus::Succeeded => summary.steps_succeeded += 1,
                StepStatus::Failed => summary.steps_failed += 1,
                StepStatus::Skipped => summary.steps_skipped += 1,
            }
            summary.total_step_ms += s.elapsed_ms();
        }
        summary.steps = steps;
        summary
    }

    /// Status of a step, if it was recorded.
    pub fn status_of(&self, step_id: &str) -> Option<StepStatus> {
        self.steps.iter().find(|s| s.step_id == step_id).map(|s| s.status)
    }
}

/// Receives step outcomes as a pipeline run progresses.
pub trait RunObserver: Send + Sync {
    /// Record the outcome of one step.
    fn record_step(&self, step: StepMetrics);
    /// Aggregate everything recorded so far.
    fn summary(&self) -> RunSummary;
}

/// Observer that only keeps step outcomes in memory.
pub struct InMemoryObserver {
    pipeline_id: String,
    steps: Mutex<Vec<StepMetrics>>,
}

impl InMemoryObserver {
    pub fn new(pipeline_id: impl Into<String>) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            steps: Mutex::new(Vec::new()),
        }
    }
}

impl RunObserver for InMemoryObserver {
    fn record_step(&self, step: StepMetrics) {
        let Ok(mut guard) = self.steps.lock() else {
            tracing::warn!("Failed to acquire step lock");
            return;
        };
        tracing::debug!(
            step_id = %step.step_id,
            status = step.status.as_str(),
            elapsed_ms = step.elapsed_ms(),
            "Recorded step"
        );
        guard.push(step);
    }

    fn summary(&self) -> RunSummary {
        let steps = self.steps.lock().map(|g| g.clone()).unwrap_or_default();
        RunSummary::from_steps(&self.pipeline_id, steps)
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, status: StepStatus, start: i64, end: i64) -> StepMetrics {
        StepMetrics {
            start_time: start,
            end_time: end,
            ..StepMetrics::new(id, id, status)
        }
    }

    #[test]
    fn test_in_memory_observer() {
        let observer = InMemoryObserver::new("llm-feedback-loop");

        observer.record_step(step("metric-sample", StepStatus::Succeeded, 0, 200));
        observer.record_step(step("generate-ds", StepStatus::Skipped, 200, 200));
        observer.record_step(step("train", StepStatus::Skipped, 200, 200));

        let summary = observer.summary();
        assert_eq!(summary.pipeline_id, "llm-feedback-loop");
        assert_eq!(summary.steps_succeeded, 1);
        assert_eq!(summary.steps_skipped, 2);
        assert_eq!(summary.steps_failed, 0);
        assert_eq!(summary.total_step_ms, 200);
        assert_eq!(summary.status_of("train"), Some(StepStatus::Skipped));
        assert_eq!(summary.status_of("deploy"), None);
    }

    #[test]
    fn test_elapsed_never_negative() {
        assert_eq!(step("s", StepStatus::Failed, 10, 5).elapsed_ms(), 0);
    }
}
