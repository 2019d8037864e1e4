//! Step runners: what actually executes a pipeline step.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use evalloop_config::Project;
use evalloop_monitor::MonitorStore;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::args::Args;
use crate::EngineError;

/// Named string outputs of a step.
pub type StepOutputs = HashMap<String, String>;

pub const ALERT_TRIGGERED: &str = "alert_triggered";

/// A step with its params already substituted.
#[derive(Debug, Clone)]
pub struct StepRequest {
    pub step_id: String,
    pub function: String,
    pub handler: Option<String>,
    pub params: Args,
}

impl StepRequest {
    pub fn str_param(&self, name: &str) -> Result<&str, EngineError> {
        self.params
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::InvalidParams {
                step: self.step_id.clone(),
                message: format!("missing string param '{}'", name),
            })
    }
}

#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run(&self, request: &StepRequest) -> Result<StepOutputs, EngineError>;
}

/// Runners keyed by function name, with an optional fallback.
#[derive(Default, Clone)]
pub struct StepRunnerRegistry {
    runners: HashMap<String, Arc<dyn StepRunner>>,
    fallback: Option<Arc<dyn StepRunner>>,
}

impl StepRunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, function: impl Into<String>, runner: Arc<dyn StepRunner>) -> Self {
        self.runners.insert(function.into(), runner);
        self
    }

    /// Runner for functions with no registered runner.
    pub fn with_fallback(mut self, runner: Arc<dyn StepRunner>) -> Self {
        self.fallback = Some(runner);
        self
    }

    pub fn get(&self, function: &str) -> Result<Arc<dyn StepRunner>, EngineError> {
        self.runners
            .get(function)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| EngineError::NoRunner(function.to_string()))
    }

    pub fn functions(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.runners.keys().map(String::as_str).collect();
        names.sort();
        names
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Metric sample
// ─────────────────────────────────────────────────────────────────────────────

/// Reads the latest monitoring result for `metric_name` and raises
/// `alert_triggered = "True"` when it detected a problem.
pub struct MetricSampleRunner {
    store: Arc<MonitorStore>,
}

impl MetricSampleRunner {
    pub fn new(store: Arc<MonitorStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl StepRunner for MetricSampleRunner {
    async fn run(&self, request: &StepRequest) -> Result<StepOutputs, EngineError> {
        let metric_name = request.str_param("metric_name")?;
        let latest = self.store.latest_result(metric_name)?;

        let triggered = latest.as_ref().is_some_and(|r| r.result.status.is_detected());
        match &latest {
            Some(r) => info!(
                metric = metric_name,
                value = r.result.value,
                status = r.result.status.as_str(),
                "Sampled latest result"
            ),
            None => info!(metric = metric_name, "No monitoring result yet"),
        }

        Ok(HashMap::from([(ALERT_TRIGGERED.to_string(), bool_output(triggered))]))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP dispatch
// ─────────────────────────────────────────────────────────────────────────────

/// Dispatches steps to the endpoint registered for their function.
///
/// The endpoint receives `{"handler": ..., "params": {...}}` and must answer
/// with a JSON object of outputs.
pub struct HttpStepRunner {
    client: reqwest::Client,
    endpoints: HashMap<String, String>,
}

impl HttpStepRunner {
    pub fn new(project: &Project) -> Result<Self, EngineError> {
        let endpoints = project
            .functions()
            .filter_map(|f| f.endpoint.clone().map(|e| (f.name.clone(), e)))
            .collect();
        Self::with_endpoints(endpoints)
    }

    pub fn with_endpoints(endpoints: HashMap<String, String>) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(600))
            .build()?;
        Ok(Self { client, endpoints })
    }

    pub fn endpoint(&self, function: &str) -> Option<&str> {
        self.endpoints.get(function).map(String::as_str)
    }
}

#[async_trait]
impl StepRunner for HttpStepRunner {
    async fn run(&self, request: &StepRequest) -> Result<StepOutputs, EngineError> {
        let endpoint = self
            .endpoint(&request.function)
            .ok_or_else(|| EngineError::NoEndpoint(request.function.clone()))?;

        debug!(step = %request.step_id, endpoint, "Dispatching step");

        let body = json!({
            "handler": request.handler,
            "params": request.params,
        });

        let response = self
            .client
            .post(endpoint)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let value: Value = response.json().await?;
        outputs_from_json(&request.step_id, value)
    }
}

/// Converts a JSON object reply into string outputs. Booleans become
/// `"True"`/`"False"` so conditions can compare them as text.
pub fn outputs_from_json(step_id: &str, value: Value) -> Result<StepOutputs, EngineError> {
    let Value::Object(map) = value else {
        return Err(EngineError::InvalidResponse {
            step: step_id.to_string(),
            message: format!("expected a JSON object, got {}", value),
        });
    };

    Ok(map
        .into_iter()
        .map(|(k, v)| {
            let text = match v {
                Value::String(s) => s,
                Value::Bool(b) => bool_output(b),
                other => other.to_string(),
            };
            (k, text)
        })
        .collect())
}

fn bool_output(value: bool) -> String {
    if value { "True" } else { "False" }.to_string()
}
