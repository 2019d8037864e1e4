//! Fluent builder for [`PipelineConfig`].
//!
//! ```rust
//! use evalloop_config::PipelineConfig;
//!
//! let config = PipelineConfig::builder("retrain", "Retrain on alert")
//!     .arg("metric_name", None)
//!     .step("sample", "metric-sample")
//!         .handler("sample")
//!         .param("metric_name", "{{metric_name}}")
//!         .outputs(["alert_triggered"])
//!         .done()
//!     .step("train", "train")
//!         .done()
//!     .conditional_edge("sample", "train", "alert_triggered", "True")
//!     .build();
//!
//! assert_eq!(config.steps.len(), 2);
//! assert!(config.validate().is_ok());
//! ```

use serde_json::Value;

use crate::pipeline::{Condition, EdgeConfig, EdgeType, PipelineConfig, StepConfig};

impl PipelineConfig {
    pub fn builder(id: impl Into<String>, name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder {
            config: PipelineConfig {
                id: id.into(),
                name: name.into(),
                description: String::new(),
                params: Default::default(),
                steps: Vec::new(),
                edges: Vec::new(),
            },
        }
    }
}

pub struct PipelineBuilder {
    config: PipelineConfig,
}

impl PipelineBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.config.description = description.into();
        self
    }

    /// Declares a pipeline argument; `None` marks it as required.
    pub fn arg(mut self, name: impl Into<String>, default: Option<Value>) -> Self {
        self.config.params.insert(name.into(), default.unwrap_or(Value::Null));
        self
    }

    pub fn step(self, id: impl Into<String>, function: impl Into<String>) -> StepBuilder {
        StepBuilder {
            parent: self,
            step: StepConfig {
                id: id.into(),
                function: function.into(),
                handler: None,
                params: Default::default(),
                outputs: Vec::new(),
            },
        }
    }

    /// `to` runs after `from`.
    pub fn edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.config.edges.push(EdgeConfig {
            from: from.into(),
            to: to.into(),
            edge_type: EdgeType::Direct,
            condition: None,
        });
        self
    }

    /// `to` runs after `from` only when `from`'s `output` equals `equals`.
    pub fn conditional_edge(
        mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        output: impl Into<String>,
        equals: impl Into<String>,
    ) -> Self {
        self.config.edges.push(EdgeConfig {
            from: from.into(),
            to: to.into(),
            edge_type: EdgeType::Conditional,
            condition: Some(Condition { output: output.into(), equals: equals.into() }),
        });
        self
    }

    pub fn build(self) -> PipelineConfig {
        self.config
    }
}

pub struct StepBuilder {
    parent: PipelineBuilder,
    step: StepConfig,
}

impl StepBuilder {
    pub fn handler(mut self, handler: impl Into<String>) -> Self {
        self.step.handler = Some(handler.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.step.params.insert(key.into(), value.into());
        self
    }

    pub fn outputs<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.step.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn done(mut self) -> PipelineBuilder {
        self.parent.config.steps.push(self.step);
        self.parent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_steps_and_edges() {
        let config = PipelineConfig::builder("p", "Pipeline")
            .description("desc")
            .step("a", "fn-a")
                .param("n", 3)
                .outputs(["x"])
                .done()
            .step("b", "fn-b")
                .done()
            .conditional_edge("a", "b", "x", "yes")
            .build();

        assert_eq!(config.description, "desc");
        assert_eq!(config.steps[0].params["n"], 3);
        assert_eq!(config.edges[0].edge_type, EdgeType::Conditional);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_required_arg_is_null() {
        let config = PipelineConfig::builder("p", "P")
            .arg("metric_name", None)
            .arg("limit", Some(10.into()))
            .build();

        assert!(config.params["metric_name"].is_null());
        assert_eq!(config.params["limit"], 10);
    }
}
