//! Conditional pipeline execution for evalloop.
//!
//! [`PipelineEngine`] runs a [`PipelineConfig`] in topological waves. Steps in
//! the same wave run concurrently. A step runs only when every predecessor
//! succeeded and every condition on its incoming edges holds; otherwise it is
//! skipped, and so are its dependents. The first failing step ends the run.

mod args;
mod runner;

pub use args::{resolve_args, substitute, substitute_map, Args};
pub use runner::{
    outputs_from_json, HttpStepRunner, MetricSampleRunner, StepOutputs, StepRequest, StepRunner,
    StepRunnerRegistry, ALERT_TRIGGERED,
};

use std::collections::HashMap;
use std::sync::Arc;

use evalloop_config::{ConfigError, PipelineConfig, StepConfig};
use evalloop_monitor::{
    now_ms, InMemoryObserver, MonitorStore, RunCollector, RunObserver, RunStatus, StepMetrics,
    StepStatus, StoreError,
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid pipeline: {0}")]
    Config(#[from] ConfigError),

    /// A required pipeline argument or a referenced placeholder has no value.
    #[error("Missing pipeline argument: {0}")]
    MissingArg(String),

    #[error("No runner for function: {0}")]
    NoRunner(String),

    #[error("No endpoint registered for function: {0}")]
    NoEndpoint(String),

    #[error("Invalid params for step {step}: {message}")]
    InvalidParams { step: String, message: String },

    #[error("Invalid response from step {step}: {message}")]
    InvalidResponse { step: String, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Set when the run was traced to a store.
    pub run_id: Option<String>,
    pub pipeline_id: String,
    pub status: RunStatus,
    pub steps: Vec<StepMetrics>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RunReport {
    pub fn step(&self, step_id: &str) -> Option<&StepMetrics> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    pub fn status_of(&self, step_id: &str) -> Option<StepStatus> {
        self.step(step_id).map(|s| s.status)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline Engine
// ─────────────────────────────────────────────────────────────────────────────

pub struct PipelineEngine {
    config: PipelineConfig,
    runners: StepRunnerRegistry,
    store: Option<Arc<MonitorStore>>,
}

enum Gate {
    Run,
    Skip(String),
}

impl PipelineEngine {
    pub fn new(config: PipelineConfig, runners: StepRunnerRegistry) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self { config, runners, store: None })
    }

    /// Traces every run to `store`.
    pub fn with_store(mut self, store: Arc<MonitorStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the pipeline. Errors are returned only when the run cannot start;
    /// step failures are reported in the [`RunReport`].
    pub async fn run(&self, args: Args) -> Result<RunReport, EngineError> {
        let args = resolve_args(&self.config.params, &args)?;

        match &self.store {
            Some(store) => {
                let collector = RunCollector::new(
                    store.clone(),
                    &self.config.id,
                    &self.config.name,
                    serde_json::Value::Object(args.clone()),
                );
                let mut report = self.execute(&args, &collector).await?;
                match &report.error {
                    Some(e) => collector.error(e),
                    None => collector.success(),
                }
                report.run_id = Some(collector.run_id().to_string());
                Ok(report)
            }
            None => {
                let observer = InMemoryObserver::new(&self.config.id);
                self.execute(&args, &observer).await
            }
        }
    }

    /// Runs the pipeline reporting each step to `observer`.
    pub async fn execute(&self, args: &Args, observer: &dyn RunObserver) -> Result<RunReport, EngineError> {
        let waves = self.waves()?;

        info!("╔══════════════════════════════════════════════════════════════");
        info!("║ PIPELINE: {}", self.config.name);
        info!("║ Steps: {} in {} waves", self.config.steps.len(), waves.len());
        info!("╠══════════════════════════════════════════════════════════════");

        let mut statuses: HashMap<&str, StepStatus> = HashMap::new();
        let mut outputs: HashMap<&str, StepOutputs> = HashMap::new();
        let mut steps = Vec::new();
        let mut failure: Option<String> = None;

        for wave in waves {
            let mut runnable = Vec::new();
            for step in wave {
                match self.gate(step, &statuses, &outputs) {
                    Gate::Run => runnable.push(step),
                    Gate::Skip(reason) => {
                        info!("║ [{}] skipped: {}", step.id, reason);
                        let mut metrics = StepMetrics::new(&step.id, &step.function, StepStatus::Skipped);
                        metrics.error = Some(reason);
                        statuses.insert(&step.id, StepStatus::Skipped);
                        observer.record_step(metrics.clone());
                        steps.push(metrics);
                    }
                }
            }

            if runnable.len() > 1 {
                info!("║ PARALLEL EXECUTION: {:?}", runnable.iter().map(|s| &s.id).collect::<Vec<_>>());
            }

            let results = join_all(runnable.iter().map(|step| self.run_step(step, args))).await;

            for (step, metrics) in runnable.into_iter().zip(results) {
                statuses.insert(&step.id, metrics.status);
                if metrics.status == StepStatus::Failed && failure.is_none() {
                    failure = Some(format!(
                        "step {} failed: {}",
                        step.id,
                        metrics.error.as_deref().unwrap_or("unknown error")
                    ));
                }
                outputs.insert(&step.id, metrics.outputs.clone());
                observer.record_step(metrics.clone());
                steps.push(metrics);
            }

            if failure.is_some() {
                break;
            }
        }

        let status = match failure {
            Some(ref e) => {
                error!("║ Pipeline aborted: {}", e);
                RunStatus::Failed
            }
            None => {
                info!("║ Pipeline complete");
                RunStatus::Succeeded
            }
        };
        info!("╚══════════════════════════════════════════════════════════════");

        Ok(RunReport {
            run_id: None,
            pipeline_id: self.config.id.clone(),
            status,
            steps,
            error: failure,
        })
    }

    /// Groups steps by their longest distance from a root.
    fn waves(&self) -> Result<Vec<Vec<&StepConfig>>, EngineError> {
        let order = self.config.topological_order()?;
        let mut depth: HashMap<&str, usize> = HashMap::new();
        let mut waves: Vec<Vec<&StepConfig>> = Vec::new();

        for id in order {
            let d = self
                .config
                .incoming(id)
                .filter_map(|e| depth.get(e.from.as_str()))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(id, d);

            let Some(step) = self.config.step(id) else { continue };
            if waves.len() <= d {
                waves.resize_with(d + 1, Vec::new);
            }
            waves[d].push(step);
        }

        Ok(waves)
    }

    fn gate(
        &self,
        step: &StepConfig,
        statuses: &HashMap<&str, StepStatus>,
        outputs: &HashMap<&str, StepOutputs>,
    ) -> Gate {
        for edge in self.config.incoming(&step.id) {
            match statuses.get(edge.from.as_str()) {
                Some(StepStatus::Succeeded) => {}
                _ => return Gate::Skip(format!("upstream {} did not succeed", edge.from)),
            }

            let Some(condition) = &edge.condition else { continue };
            let empty = StepOutputs::new();
            let upstream = outputs.get(edge.from.as_str()).unwrap_or(&empty);
            if !condition.holds(upstream) {
                return Gate::Skip(format!(
                    "condition {} == {:?} on {} not met",
                    condition.output, condition.equals, edge.from
                ));
            }
        }
        Gate::Run
    }

    async fn run_step(&self, step: &StepConfig, args: &Args) -> StepMetrics {
        let start = now_ms();
        info!("║ [{}] running function {}", step.id, step.function);

        let result = async {
            let params = substitute_map(&step.params, args)?;
            let runner = self.runners.get(&step.function)?;
            let request = StepRequest {
                step_id: step.id.clone(),
                function: step.function.clone(),
                handler: step.handler.clone(),
                params,
            };
            runner.run(&request).await
        }
        .await;

        let mut metrics = StepMetrics::new(&step.id, &step.function, StepStatus::Succeeded);
        metrics.start_time = start;
        metrics.end_time = now_ms();

        match result {
            Ok(outputs) => {
                for declared in &step.outputs {
                    if !outputs.contains_key(declared) {
                        warn!("║ [{}] missing declared output {}", step.id, declared);
                    }
                }
                info!("║ [{}] succeeded in {}ms, outputs: {:?}", step.id, metrics.elapsed_ms(), outputs);
                metrics.outputs = outputs;
            }
            Err(e) => {
                error!("║ [{}] failed: {}", step.id, e);
                metrics.status = StepStatus::Failed;
                metrics.error = Some(e.to_string());
            }
        }

        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use evalloop_config::feedback_loop;
    use serde_json::json;
    use std::sync::Mutex;

    /// Returns fixed outputs per function and records every request.
    #[derive(Default)]
    struct ScriptedRunner {
        outputs: HashMap<String, StepOutputs>,
        failing: Vec<String>,
        requests: Mutex<Vec<StepRequest>>,
    }

    impl ScriptedRunner {
        fn output(mut self, function: &str, key: &str, value: &str) -> Self {
            self.outputs
                .entry(function.to_string())
                .or_default()
                .insert(key.to_string(), value.to_string());
            self
        }

        fn fail(mut self, function: &str) -> Self {
            self.failing.push(function.to_string());
            self
        }

        fn ran(&self) -> Vec<String> {
            self.requests.lock().unwrap().iter().map(|r| r.step_id.clone()).collect()
        }
    }

    #[async_trait]
    impl StepRunner for ScriptedRunner {
        async fn run(&self, request: &StepRequest) -> Result<StepOutputs, EngineError> {
            self.requests.lock().unwrap().push(request.clone());
            if self.failing.contains(&request.function) {
                return Err(EngineError::InvalidResponse {
                    step: request.step_id.clone(),
                    message: "boom".into(),
                });
            }
            Ok(self.outputs.get(&request.function).cloned().unwrap_or_default())
        }
    }

    fn args() -> Args {
        json!({"metric_name": "deepeval-correctness", "input_ds": "store://datasets/banking/ds"})
            .as_object()
            .cloned()
            .unwrap()
    }

    fn engine(runner: Arc<ScriptedRunner>) -> PipelineEngine {
        PipelineEngine::new(
            feedback_loop("banking"),
            StepRunnerRegistry::new().with_fallback(runner),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_alert_runs_full_chain() {
        let runner = Arc::new(ScriptedRunner::default().output("metric-sample", "alert_triggered", "True"));
        let report = engine(runner.clone()).run(args()).await.unwrap();

        assert_eq!(report.status, RunStatus::Succeeded);
        assert_eq!(runner.ran(), vec!["metric-sample", "generate-ds", "train", "deploy"]);
        assert!(report.steps.iter().all(|s| s.status == StepStatus::Succeeded));
    }

    #[tokio::test]
    async fn test_no_alert_skips_downstream() {
        let runner = Arc::new(ScriptedRunner::default().output("metric-sample", "alert_triggered", "False"));
        let report = engine(runner.clone()).run(args()).await.unwrap();

        assert_eq!(report.status, RunStatus::Succeeded);
        assert_eq!(runner.ran(), vec!["metric-sample"]);
        assert_eq!(report.status_of("generate-ds"), Some(StepStatus::Skipped));
        assert_eq!(report.status_of("train"), Some(StepStatus::Skipped));
        assert_eq!(report.status_of("deploy"), Some(StepStatus::Skipped));
    }

    #[tokio::test]
    async fn test_condition_is_exact_string_match() {
        let runner = Arc::new(ScriptedRunner::default().output("metric-sample", "alert_triggered", "true"));
        let report = engine(runner.clone()).run(args()).await.unwrap();
        assert_eq!(report.status_of("generate-ds"), Some(StepStatus::Skipped));
    }

    #[tokio::test]
    async fn test_failure_aborts_run() {
        let runner = Arc::new(
            ScriptedRunner::default()
                .output("metric-sample", "alert_triggered", "True")
                .fail("train"),
        );
        let report = engine(runner.clone()).run(args()).await.unwrap();

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.status_of("train"), Some(StepStatus::Failed));
        assert_eq!(report.status_of("deploy"), None);
        assert!(report.error.unwrap().contains("train"));
        assert!(!runner.ran().contains(&"deploy".to_string()));
    }

    #[tokio::test]
    async fn test_placeholders_substituted() {
        let runner = Arc::new(ScriptedRunner::default().output("metric-sample", "alert_triggered", "True"));
        engine(runner.clone()).run(args()).await.unwrap();

        let requests = runner.requests.lock().unwrap();
        assert_eq!(requests[0].params["metric_name"], "deepeval-correctness");
        assert_eq!(requests[0].handler.as_deref(), Some("sample"));
        assert_eq!(requests[1].params["input_ds"], "store://datasets/banking/ds");
        assert_eq!(
            requests[3].params["model_path"],
            "store://models/banking/google-gemma-2b:latest"
        );
    }

    #[tokio::test]
    async fn test_missing_required_arg() {
        let runner = Arc::new(ScriptedRunner::default());
        let err = engine(runner.clone()).run(Args::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::MissingArg(_)));
        assert!(runner.ran().is_empty());
    }

    #[tokio::test]
    async fn test_missing_runner_fails_step() {
        let engine = PipelineEngine::new(feedback_loop("banking"), StepRunnerRegistry::new()).unwrap();
        let report = engine.run(args()).await.unwrap();
        assert_eq!(report.status, RunStatus::Failed);
        assert!(report.steps[0].error.as_deref().unwrap().contains("No runner"));
    }

    #[tokio::test]
    async fn test_parallel_wave_and_transitive_skip() {
        // a -> b, a -> c, b -> d, c -> d; c fails the condition so d is skipped
        let config = PipelineConfig::builder("diamond", "Diamond")
            .step("a", "a").outputs(["go"]).done()
            .step("b", "b").done()
            .step("c", "c").done()
            .step("d", "d").done()
            .edge("a", "b")
            .conditional_edge("a", "c", "go", "yes")
            .edge("b", "d")
            .edge("c", "d")
            .build();
        let runner = Arc::new(ScriptedRunner::default().output("a", "go", "no"));
        let engine =
            PipelineEngine::new(config, StepRunnerRegistry::new().with_fallback(runner.clone())).unwrap();

        let observer = InMemoryObserver::new("diamond");
        let report = engine.execute(&Args::new(), &observer).await.unwrap();

        assert_eq!(report.status_of("b"), Some(StepStatus::Succeeded));
        assert_eq!(report.status_of("c"), Some(StepStatus::Skipped));
        assert_eq!(report.status_of("d"), Some(StepStatus::Skipped));
        assert_eq!(runner.ran(), vec!["a", "b"]);

        let summary = observer.summary();
        assert_eq!(summary.steps_succeeded, 2);
        assert_eq!(summary.steps_skipped, 2);
    }

    #[tokio::test]
    async fn test_run_traced_to_store() {
        let store = Arc::new(MonitorStore::in_memory().unwrap());
        let runner = Arc::new(ScriptedRunner::default().output("metric-sample", "alert_triggered", "False"));
        let report = engine(runner).with_store(store.clone()).run(args()).await.unwrap();

        let run_id = report.run_id.unwrap();
        let run = store.get_run(&run_id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Succeeded);
        assert_eq!(run.steps_succeeded, 1);
        assert_eq!(run.steps_skipped, 3);
        assert_eq!(run.args["metric_name"], "deepeval-correctness");
        assert_eq!(store.get_steps(&run_id).unwrap().len(), 4);
    }
}
