//! Pipeline DAG schema.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::ConfigError;

// ─────────────────────────────────────────────────────────────────────────────
// Edge Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    /// `to` runs after `from` succeeds.
    #[default]
    Direct,
    /// `to` runs after `from` succeeds and the condition holds on `from`'s outputs.
    Conditional,
}

/// Gate on a named output of the upstream step.
///
/// Outputs are strings; the comparison is exact, so a step emitting `"true"`
/// does not satisfy `equals: "True"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub output: String,
    pub equals: String,
}

impl Condition {
    pub fn holds(&self, outputs: &HashMap<String, String>) -> bool {
        outputs.get(&self.output).is_some_and(|v| v == &self.equals)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Config Structs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    pub id: String,
    /// Name of the registered function this step invokes.
    pub function: String,
    #[serde(default)]
    pub handler: Option<String>,
    /// Step parameters. String values may contain `{{arg}}` placeholders that
    /// are filled from the pipeline arguments at run time.
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
    /// Names of the outputs the step is expected to produce.
    #[serde(default)]
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConfig {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub edge_type: EdgeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Declared pipeline arguments and their defaults (`null` = required).
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
    pub steps: Vec<StepConfig>,
    #[serde(default)]
    pub edges: Vec<EdgeConfig>,
}

impl PipelineConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn step(&self, id: &str) -> Option<&StepConfig> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn incoming<'a>(&'a self, step_id: &'a str) -> impl Iterator<Item = &'a EdgeConfig> + 'a {
        self.edges.iter().filter(move |e| e.to == step_id)
    }

    pub fn outgoing<'a>(&'a self, step_id: &'a str) -> impl Iterator<Item = &'a EdgeConfig> + 'a {
        self.edges.iter().filter(move |e| e.from == step_id)
    }

    /// Checks step ids, edge endpoints, conditions and acyclicity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut ids = HashSet::new();
        for step in &self.steps {
            if !ids.insert(step.id.as_str()) {
                return Err(ConfigError::DuplicateStep(step.id.clone()));
            }
        }

        for edge in &self.edges {
            let Some(from) = self.step(&edge.from) else {
                return Err(ConfigError::UnknownStep(edge.from.clone()));
            };
            if !ids.contains(edge.to.as_str()) {
                return Err(ConfigError::UnknownStep(edge.to.clone()));
            }

            match (&edge.edge_type, &edge.condition) {
                (EdgeType::Conditional, None) => {
                    return Err(ConfigError::MissingCondition {
                        from: edge.from.clone(),
                        to: edge.to.clone(),
                    });
                }
                (EdgeType::Conditional, Some(cond)) if !from.outputs.contains(&cond.output) => {
                    return Err(ConfigError::UnknownOutput {
                        step: from.id.clone(),
                        output: cond.output.clone(),
                    });
                }
                _ => {}
            }
        }

        self.topological_order().map(|_| ())
    }

    /// Step ids in dependency order (Kahn's algorithm, ties broken by declaration order).
    pub fn topological_order(&self) -> Result<Vec<&str>, ConfigError> {
        let mut in_degree: HashMap<&str, usize> =
            self.steps.iter().map(|s| (s.id.as_str(), 0)).collect();
        for edge in &self.edges {
            if let Some(d) = in_degree.get_mut(edge.to.as_str()) {
                *d += 1;
            }
        }

        let mut queue: VecDeque<&str> = self
            .steps
            .iter()
            .map(|s| s.id.as_str())
            .filter(|id| in_degree[id] == 0)
            .collect();

        let mut order = Vec::with_capacity(self.steps.len());
        while let Some(id) = queue.pop_front() {
            order.push(id);
            for edge in self.outgoing(id) {
                let Some(d) = in_degree.get_mut(edge.to.as_str()) else { continue };
                *d -= 1;
                if *d == 0 {
                    queue.push_back(edge.to.as_str());
                }
            }
        }

        if order.len() != self.steps.len() {
            let stuck = self
                .steps
                .iter()
                .map(|s| s.id.as_str())
                .filter(|id| !order.contains(id))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(ConfigError::Cycle(stuck));
        }

        Ok(order)
    }
}
