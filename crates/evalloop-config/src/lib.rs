//! Configuration schema for evalloop pipelines and projects.
//!
//! - [`PipelineConfig`] describes a conditional DAG of external function calls.
//! - [`Project`] is the registry of functions those steps invoke.
//! - [`SecretSource`] resolves credentials explicitly instead of through
//!   process-wide environment mutation.

mod builder;
mod pipeline;
mod presets;
mod project;
mod secrets;

pub use builder::{PipelineBuilder, StepBuilder};
pub use pipeline::{Condition, EdgeConfig, EdgeType, PipelineConfig, StepConfig};
pub use presets::{feedback_loop, PresetRegistry, FEEDBACK_LOOP_ID};
pub use project::{
    setup_project, FunctionKind, FunctionSpec, Project, ProjectParams, ResourceLimits,
    REQUIRED_SECRETS,
};
pub use secrets::{ChainedSecrets, EnvSecrets, MapSecrets, SecretSource};

use thiserror::Error;

/// Errors raised while loading, validating or applying configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Preset not found: {0}")]
    PresetNotFound(String),

    /// A secret the project needs is neither in the secret store nor the environment.
    #[error("Missing secret: {0}")]
    MissingSecret(String),

    /// No default image was configured and building one is not supported.
    #[error("Project has no default image")]
    NoDefaultImage,

    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    #[error("Duplicate step id: {0}")]
    DuplicateStep(String),

    #[error("Edge references unknown step: {0}")]
    UnknownStep(String),

    #[error("Conditional edge {from} -> {to} has no condition")]
    MissingCondition { from: String, to: String },

    #[error("Step {step} has no output named {output}")]
    UnknownOutput { step: String, output: String },

    #[error("Pipeline graph contains a cycle through: {0}")]
    Cycle(String),
}
