//! Run collector that persists to MonitorStore.

use std::sync::{Arc, Mutex};

use crate::store::MonitorStore;
use crate::trace::{RunRecord, RunStatus, StepRecord};
use crate::{now_ms, RunObserver, RunSummary, StepMetrics};

/// Observer that persists a run and its steps to a [`MonitorStore`].
pub struct RunCollector {
    store: Arc<MonitorStore>,
    run_id: String,
    pipeline_id: String,
    pipeline_name: String,
    args: serde_json::Value,
    start_time: i64,
    steps: Mutex<Vec<StepMetrics>>,
}

impl RunCollector {
    /// Creates a collector and inserts a run record with status `running`.
    pub fn new(
        store: Arc<MonitorStore>,
        pipeline_id: impl Into<String>,
        pipeline_name: impl Into<String>,
        args: serde_json::Value,
    ) -> Self {
        let run_id = uuid::Uuid::new_v4().to_string();
        let start_time = now_ms();
        let pipeline_id = pipeline_id.into();
        let pipeline_name = pipeline_name.into();

        let run = RunRecord {
            run_id: run_id.clone(),
            pipeline_id: pipeline_id.clone(),
            pipeline_name: pipeline_name.clone(),
            timestamp: start_time,
            args: args.clone(),
            total_elapsed_ms: 0,
            steps_succeeded: 0,
            steps_failed: 0,
            steps_skipped: 0,
            status: RunStatus::Running,
            error: None,
        };

        if let Err(e) = store.insert_run(&run) {
            tracing::warn!("Failed to insert run: {}", e);
        }

        Self {
            store,
            run_id,
            pipeline_id,
            pipeline_name,
            args,
            start_time,
            steps: Mutex::new(Vec::new()),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Writes the final counts and status to the run record.
    pub fn finalize(&self, status: RunStatus, error: Option<&str>) {
        let summary = self.summary();

        let run = RunRecord {
            run_id: self.run_id.clone(),
            pipeline_id: self.pipeline_id.clone(),
            pipeline_name: self.pipeline_name.clone(),
            timestamp: self.start_time,
            args: self.args.clone(),
            total_elapsed_ms: (now_ms() - self.start_time).max(0) as u64,
            steps_succeeded: summary.steps_succeeded,
            steps_failed: summary.steps_failed,
            steps_skipped: summary.steps_skipped,
            status,
            error: error.map(String::from),
        };

        if let Err(e) = self.store.update_run(&run) {
            tracing::warn!("Failed to update run: {}", e);
        }
    }

    pub fn success(&self) {
        self.finalize(RunStatus::Succeeded, None);
    }

    pub fn error(&self, error: &str) {
        self.finalize(RunStatus::Failed, Some(error));
    }
}

impl RunObserver for RunCollector {
    fn record_step(&self, step: StepMetrics) {
        let record = StepRecord {
            record_id: uuid::Uuid::new_v4().to_string(),
            run_id: self.run_id.clone(),
            step_id: step.step_id.clone(),
            function: step.function.clone(),
            status: step.status,
            start_time: step.start_time,
            end_time: step.end_time,
            outputs: step.outputs.clone(),
            error: step.error.clone(),
        };

        if let Err(e) = self.store.insert_step(&record) {
            tracing::warn!("Failed to insert step: {}", e);
        }

        let Ok(mut guard) = self.steps.lock() else {
            tracing::warn!("Failed to acquire step lock");
            return;
        };
        guard.push(step);
    }

    fn summary(&self) -> RunSummary {
        let steps = self.steps.lock().map(|g| g.clone()).unwrap_or_default();
        RunSummary::from_steps(&self.pipeline_id, steps)
    }
}
