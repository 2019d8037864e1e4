//! Pipeline execution service.

use std::sync::Arc;

use evalloop_engine::{
    Args, HttpStepRunner, MetricSampleRunner, PipelineEngine, RunReport, StepRunnerRegistry,
};
use tracing::info;

use crate::error::AppError;
use crate::ServerState;

pub const METRIC_SAMPLE_FUNCTION: &str = "metric-sample";

/// Built-in metric sampling plus HTTP dispatch for every project function.
pub fn runners(state: &ServerState) -> Result<StepRunnerRegistry, AppError> {
    Ok(StepRunnerRegistry::new()
        .register(
            METRIC_SAMPLE_FUNCTION,
            Arc::new(MetricSampleRunner::new(state.store.clone())),
        )
        .with_fallback(Arc::new(HttpStepRunner::new(&state.project)?)))
}

/// Runs a registered pipeline and traces it to the store.
pub async fn run_pipeline(state: &ServerState, id: &str, args: Args) -> Result<RunReport, AppError> {
    let config = state.presets.get(id)?.clone();
    let engine = PipelineEngine::new(config, runners(state)?)?.with_store(state.store.clone());

    let report = engine.run(args).await?;
    info!(pipeline = id, status = report.status.as_str(), "Pipeline run finished");
    Ok(report)
}
