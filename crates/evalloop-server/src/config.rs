//! Server configuration from environment variables.

use std::path::PathBuf;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_DB_PATH: &str = "data/evalloop.db";
const DEFAULT_METRIC_NAME: &str = "deepeval-correctness";
const DEFAULT_JUDGE_MODEL: &str = "gpt-4o";
const DEFAULT_PROJECT_NAME: &str = "evalloop";

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub db_path: PathBuf,
    /// Project registry JSON; an empty project is used when unset.
    pub project_path: Option<PathBuf>,
    /// Project parameters JSON. When set, the project is built with its
    /// secrets provisioned at startup and `project_path` is ignored.
    pub project_params_path: Option<PathBuf>,
    /// Extra pipeline definitions loaded next to the built-in presets.
    pub pipelines_dir: Option<PathBuf>,
    pub metric_name: String,
    pub judge_model: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            bind_addr: get("EVALLOOP_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into()),
            db_path: get("EVALLOOP_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            project_path: get("EVALLOOP_PROJECT").map(PathBuf::from),
            project_params_path: get("EVALLOOP_PROJECT_PARAMS").map(PathBuf::from),
            pipelines_dir: get("EVALLOOP_PIPELINES_DIR").map(PathBuf::from),
            metric_name: get("EVALLOOP_METRIC_NAME").unwrap_or_else(|| DEFAULT_METRIC_NAME.into()),
            judge_model: get("EVALLOOP_JUDGE_MODEL").unwrap_or_else(|| DEFAULT_JUDGE_MODEL.into()),
        }
    }

    pub fn default_project_name() -> &'static str {
        DEFAULT_PROJECT_NAME
    }
}
