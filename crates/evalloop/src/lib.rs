//! # evalloop
//!
//! LLM-as-judge monitoring with a conditional retraining feedback loop.
//!
//! A monitoring window of (question, answer) pairs is scored by an
//! LLM-graded metric, the scored table is logged as an artifact tagged by
//! the window's end time, and the mean score becomes a `detected` or
//! `no_detection` result. The feedback pipeline samples that result and,
//! when it detected a problem, regenerates the training set, retrains and
//! redeploys.
//!
//! # Quick Start
//!
//! ```rust
//! use evalloop::prelude::*;
//!
//! let pipeline = feedback_loop("banking");
//! let order = pipeline.topological_order().unwrap();
//! assert_eq!(order, vec!["metric-sample", "generate-ds", "train", "deploy"]);
//!
//! assert_eq!(StatusPolicy::Rounded.status(0.5).unwrap(), ResultStatus::NoDetection);
//! ```
//!
//! # Crates
//!
//! - [`core`]: domain types, errors and the `Grader` seam
//! - [`config`]: pipeline DAG, project registry, secrets
//! - [`llm`]: OpenAI-compatible client and the G-Eval metric
//! - [`judge`]: the judging pass and monitoring application
//! - [`monitor`]: SQLite artifacts, results and run traces
//! - [`engine`]: conditional pipeline execution

pub use evalloop_config as config;
pub use evalloop_core as core;
pub use evalloop_engine as engine;
pub use evalloop_judge as judge;
pub use evalloop_llm as llm;
pub use evalloop_monitor as monitor;

/// Prelude for convenient imports.
pub mod prelude {
    pub use evalloop_config::{
        feedback_loop, setup_project, ConfigError, EnvSecrets, MapSecrets, PipelineConfig,
        PresetRegistry, Project, ProjectParams, SecretSource,
    };
    pub use evalloop_core::{
        AgentError, ApplicationResult, Grade, Grader, ModelConfig, ResultKind, ResultStatus,
        SampleRow, ScoredRow, ScoredTable, TestCase,
    };
    pub use evalloop_engine::{
        Args, EngineError, HttpStepRunner, MetricSampleRunner, PipelineEngine, RunReport,
        StepRunner, StepRunnerRegistry,
    };
    pub use evalloop_judge::{
        aggregate, sanitize_tag, Judge, JudgeApplication, JudgeError, MonitoringApplication,
        MonitoringContext, RowFailurePolicy, StatusPolicy, StoreContext,
    };
    pub use evalloop_llm::{ChatModel, Credentials, GEvalMetric, LlmClient};
    pub use evalloop_monitor::{MonitorStore, RunCollector, RunStatus, StepStatus};
}
