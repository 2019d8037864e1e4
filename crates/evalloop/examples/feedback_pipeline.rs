//! Runs the feedback loop against a local store with stub runners for the
//! external functions.
//!
//! Run with: cargo run --example feedback_pipeline

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use evalloop::engine::{StepOutputs, StepRequest};
use evalloop::prelude::*;
use serde_json::json;

/// Pretends to run an external function and echoes its params.
struct EchoRunner;

#[async_trait]
impl StepRunner for EchoRunner {
    async fn run(&self, request: &StepRequest) -> Result<StepOutputs, EngineError> {
        println!("  {} <- {}", request.function, serde_json::Value::Object(request.params.clone()));
        Ok(HashMap::from([("status".to_string(), "ok".to_string())]))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().compact().init();

    let store = Arc::new(MonitorStore::in_memory()?);
    store.insert_result(
        &ApplicationResult {
            name: "deepeval-correctness".into(),
            value: 0.2,
            kind: ResultKind::ModelPerformance,
            status: ResultStatus::Detected,
            extra_data: Default::default(),
        },
        "2024-01-01 12:00:00+00:00",
    )?;

    let runners = StepRunnerRegistry::new()
        .register("metric-sample", Arc::new(MetricSampleRunner::new(store.clone())))
        .with_fallback(Arc::new(EchoRunner));

    let engine = PipelineEngine::new(feedback_loop("banking"), runners)?.with_store(store.clone());

    let args = json!({
        "metric_name": "deepeval-correctness",
        "input_ds": "store://datasets/banking/input-ds",
    });
    let Some(args) = args.as_object().cloned() else {
        return Ok(());
    };

    let report = engine.run(args).await?;
    println!("\nRun {:?}: {}", report.run_id, report.status.as_str());
    for step in &report.steps {
        println!("  {:<14} {:<10} {:?}", step.step_id, step.status.as_str(), step.outputs);
    }

    Ok(())
}
