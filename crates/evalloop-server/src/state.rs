//! Shared server state.

use std::sync::Arc;

use anyhow::Context;
use evalloop_config::{
    setup_project, ChainedSecrets, EnvSecrets, PresetRegistry, Project, ProjectParams, SecretSource,
};
use evalloop_core::{Grader, ModelConfig};
use evalloop_llm::{Credentials, GEvalMetric, LlmClient};
use evalloop_monitor::MonitorStore;
use tokio::sync::OnceCell;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::AppError;

pub struct ServerState {
    pub config: ServerConfig,
    pub store: Arc<MonitorStore>,
    pub project: Project,
    pub presets: PresetRegistry,
    secrets: Box<dyn SecretSource>,
    grader: OnceCell<Arc<dyn Grader>>,
}

impl ServerState {
    pub fn new(
        config: ServerConfig,
        store: Arc<MonitorStore>,
        project: Project,
        presets: PresetRegistry,
        secrets: impl SecretSource + 'static,
    ) -> Self {
        Self {
            config,
            store,
            project,
            presets,
            secrets: Box::new(secrets),
            grader: OnceCell::new(),
        }
    }

    /// Opens the store, loads the project and collects pipeline presets.
    pub fn load(config: ServerConfig) -> anyhow::Result<Self> {
        Self::load_with_secrets(config, EnvSecrets)
    }

    /// Like [`ServerState::load`], with secrets resolved from `secrets`
    /// rather than the process environment.
    pub fn load_with_secrets<S>(config: ServerConfig, secrets: S) -> anyhow::Result<Self>
    where
        S: SecretSource + Clone + 'static,
    {
        if let Some(parent) = config.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let store = MonitorStore::new(&config.db_path)
            .with_context(|| format!("opening {}", config.db_path.display()))?;
        info!("Monitor store: {}", config.db_path.display());

        let project = match (&config.project_params_path, &config.project_path) {
            (Some(path), _) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                let params: ProjectParams = serde_json::from_str(&content)
                    .with_context(|| format!("parsing {}", path.display()))?;
                setup_project(&params, &secrets).context("setting up project")?
            }
            (None, Some(path)) => {
                Project::load(path).with_context(|| format!("loading {}", path.display()))?
            }
            (None, None) => Project::new(ServerConfig::default_project_name()),
        };
        info!("Project {}: {} functions", project.name, project.functions.len());

        let mut presets = PresetRegistry::builtin(&project.name);
        if let Some(dir) = &config.pipelines_dir {
            presets.extend_from_dir(dir)?;
        }
        info!("Pipelines: {:?}", presets.ids());

        info!("Project secrets: {:?}", project.secrets());
        let secrets = ChainedSecrets::new()
            .then(project.secrets().clone())
            .then(secrets);

        Ok(Self::new(config, Arc::new(store), project, presets, secrets))
    }

    /// Uses `grader` instead of building the LLM-backed one.
    pub fn with_grader(self, grader: Arc<dyn Grader>) -> Self {
        Self { grader: OnceCell::new_with(Some(grader)), ..self }
    }

    /// The judge's grader, built on first use from the configured credentials.
    pub async fn grader(&self) -> Result<Arc<dyn Grader>, AppError> {
        self.grader
            .get_or_try_init(|| async {
                let credentials = Credentials::from_secrets(&*self.secrets)?;
                let model = ModelConfig::named(&self.config.judge_model);
                let client = LlmClient::new(&model, credentials);
                info!("Judge grader ready: model={}", self.config.judge_model);
                Ok::<Arc<dyn Grader>, AppError>(Arc::new(GEvalMetric::correctness(Arc::new(client))))
            })
            .await
            .cloned()
    }
}
