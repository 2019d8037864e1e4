//! Built-in and on-disk pipeline presets.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde_json::json;
use tracing::{info, warn};

use crate::pipeline::PipelineConfig;
use crate::ConfigError;

pub const FEEDBACK_LOOP_ID: &str = "llm-feedback-loop";

/// Sample the judge's verdict and, if it raised an alert, regenerate the
/// training set, retrain the adapter and redeploy the model server with it.
pub fn feedback_loop(project: &str) -> PipelineConfig {
    PipelineConfig::builder(FEEDBACK_LOOP_ID, "LLM Feedback Loop")
        .description("Retrains and redeploys the served model when the judge raises an alert")
        .arg("metric_name", None)
        .arg("input_ds", None)
        .step("metric-sample", "metric-sample")
            .handler("sample")
            .param("metric_name", "{{metric_name}}")
            .outputs(["alert_triggered"])
            .done()
        .step("generate-ds", "generate-ds")
            .handler("generate_ds")
            .param("input_ds", "{{input_ds}}")
            .outputs(["new-train-ds", "dataset"])
            .done()
        .step("train", "train")
            .handler("train")
            .param("dataset", "mlrun/banking-orpo-opt")
            .param("base_model", "google/gemma-2b")
            .param("new_model", "mlrun/gemma-2b-bank-v0.2")
            .param("device", "cuda:0")
            .outputs(["model"])
            .done()
        .step("deploy", "llm-server")
            .handler("deploy")
            .param("model", "google-gemma-2b")
            .param("class_name", "LLMModelServer")
            .param("llm_type", "HuggingFace")
            .param("model_name", "google/gemma-2b")
            .param("adapter", "mlrun/gemma-2b-bank-v0.2")
            .param("model_path", format!("store://models/{}/google-gemma-2b:latest", project))
            .param(
                "generate_kwargs",
                json!({
                    "do_sample": true,
                    "top_p": 0.9,
                    "num_return_sequences": 1,
                    "max_length": 80,
                }),
            )
            .param("device_map", "cuda:0")
            .param("tracking", true)
            .done()
        .conditional_edge("metric-sample", "generate-ds", "alert_triggered", "True")
        .edge("generate-ds", "train")
        .edge("train", "deploy")
        .build()
}

#[derive(Debug, Default)]
pub struct PresetRegistry {
    presets: HashMap<String, PipelineConfig>,
}

impl PresetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding only the built-in feedback loop.
    pub fn builtin(project: &str) -> Self {
        let mut registry = Self::new();
        registry.insert(feedback_loop(project));
        registry
    }

    /// Loads every `*.json` pipeline in `dir`. Files that fail validation are
    /// skipped with a warning.
    pub fn load_from_dir(dir: &Path) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        registry.extend_from_dir(dir)?;
        Ok(registry)
    }

    pub fn extend_from_dir(&mut self, dir: &Path) -> Result<(), ConfigError> {
        let entries = fs::read_dir(dir)?;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            let content = fs::read_to_string(&path)?;
            match PipelineConfig::from_json(&content) {
                Ok(config) => {
                    info!("Loaded pipeline preset {} from {}", config.id, path.display());
                    self.insert(config);
                }
                Err(e) => warn!("Skipping invalid pipeline {}: {}", path.display(), e),
            }
        }
        Ok(())
    }

    pub fn insert(&mut self, config: PipelineConfig) {
        self.presets.insert(config.id.clone(), config);
    }

    pub fn get(&self, id: &str) -> Result<&PipelineConfig, ConfigError> {
        self.presets
            .get(id)
            .ok_or_else(|| ConfigError::PresetNotFound(id.to_string()))
    }

    pub fn list(&self) -> Vec<&PipelineConfig> {
        let mut list: Vec<_> = self.presets.values().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    pub fn ids(&self) -> Vec<&str> {
        self.presets.keys().map(|s| s.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::EdgeType;

    #[test]
    fn test_feedback_loop_shape() {
        let config = feedback_loop("banking");
        config.validate().unwrap();

        assert_eq!(
            config.topological_order().unwrap(),
            vec!["metric-sample", "generate-ds", "train", "deploy"]
        );

        let gate = config.incoming("generate-ds").next().unwrap();
        assert_eq!(gate.edge_type, EdgeType::Conditional);
        let cond = gate.condition.as_ref().unwrap();
        assert_eq!(cond.output, "alert_triggered");
        assert_eq!(cond.equals, "True");

        let deploy = config.step("deploy").unwrap();
        assert_eq!(deploy.function, "llm-server");
        assert_eq!(
            deploy.params["model_path"],
            "store://models/banking/google-gemma-2b:latest"
        );
    }

    #[test]
    fn test_load_from_dir_skips_invalid() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("good.json"),
            feedback_loop("p").to_json().unwrap(),
        )
        .unwrap();
        fs::write(dir.path().join("bad.json"), r#"{"id": "x", "name": "x", "steps": [], "edges": [{"from": "a", "to": "b"}]}"#).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let registry = PresetRegistry::load_from_dir(dir.path()).unwrap();
        assert_eq!(registry.ids(), vec![FEEDBACK_LOOP_ID]);
        assert!(matches!(registry.get("x"), Err(ConfigError::PresetNotFound(_))));
    }
}
