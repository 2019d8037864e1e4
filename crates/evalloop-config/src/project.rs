//! Project setup: secret provisioning and the function registry.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::secrets::{MapSecrets, SecretSource};
use crate::ConfigError;

/// Secrets every project provisions, as `(project key, lookup key)` pairs.
pub const REQUIRED_SECRETS: [(&str, &str); 3] = [
    ("OPENAI_API_KEY", "OPENAI_API_KEY"),
    ("OPENAI_API_BASE", "OPENAI_BASE_URL"),
    ("HF_TOKEN", "HF_TOKEN"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    /// Long-running model server.
    Serving,
    /// Batch job run to completion.
    Job,
    /// Monitoring application.
    Application,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    #[serde(default)]
    pub gpus: u32,
}

/// A function the orchestrator can run, with its runtime and placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    /// Source file the function is built from.
    pub func: String,
    pub kind: FunctionKind,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub limits: ResourceLimits,
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default)]
    pub node_name: Option<String>,
    #[serde(default)]
    pub min_replicas: Option<u32>,
    #[serde(default)]
    pub max_replicas: Option<u32>,
    /// Where the orchestrator accepts invocations of this function.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl FunctionSpec {
    pub fn new(name: impl Into<String>, func: impl Into<String>, kind: FunctionKind) -> Self {
        Self {
            name: name.into(),
            func: func.into(),
            kind,
            image: None,
            requirements: Vec::new(),
            limits: ResourceLimits::default(),
            node_selector: BTreeMap::new(),
            node_name: None,
            min_replicas: None,
            max_replicas: None,
            endpoint: None,
        }
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn requirements<I, S>(mut self, reqs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requirements = reqs.into_iter().map(Into::into).collect();
        self
    }

    pub fn gpus(mut self, gpus: u32) -> Self {
        self.limits.gpus = gpus;
        self
    }

    pub fn node_selector(mut self, selector: BTreeMap<String, String>) -> Self {
        self.node_selector = selector;
        self
    }

    pub fn node_name(mut self, node_name: Option<String>) -> Self {
        self.node_name = node_name;
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// GPU functions are pinned by node selector to a single replica; other
    /// functions are only placed by node name.
    fn apply_placement(&mut self) {
        if self.limits.gpus >= 1 {
            self.node_name = None;
            self.min_replicas = Some(1);
            self.max_replicas = Some(1);
        } else {
            self.node_selector.clear();
        }
    }
}

/// Inputs to [`setup_project`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectParams {
    pub name: String,
    /// Git source pulled by functions at runtime.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub default_image: Option<String>,
    /// Image tag to build when there is no default image.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default)]
    pub node_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub pull_at_runtime: bool,
    #[serde(default)]
    pub default_image: Option<String>,
    #[serde(default)]
    pub functions: BTreeMap<String, FunctionSpec>,
    #[serde(skip)]
    secrets: MapSecrets,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Copies every [`REQUIRED_SECRETS`] entry into the project, failing on the
    /// first one that cannot be resolved.
    pub fn provision_secrets(&mut self, source: &dyn SecretSource) -> Result<(), ConfigError> {
        let mut provisioned = MapSecrets::new();
        for (key, lookup) in REQUIRED_SECRETS {
            provisioned.insert(key, source.require(lookup)?);
        }
        self.secrets = provisioned;
        Ok(())
    }

    pub fn secrets(&self) -> &MapSecrets {
        &self.secrets
    }

    /// Registers (or replaces) a function, filling in the default image and
    /// normalizing placement.
    pub fn set_function(&mut self, mut spec: FunctionSpec) -> &FunctionSpec {
        if spec.image.is_none() {
            spec.image = self.default_image.clone();
        }
        spec.apply_placement();
        info!(function = %spec.name, kind = ?spec.kind, gpus = spec.limits.gpus, "Registered function");

        let name = spec.name.clone();
        self.functions.insert(name.clone(), spec);
        &self.functions[&name]
    }

    pub fn get_function(&self, name: &str) -> Result<&FunctionSpec, ConfigError> {
        self.functions
            .get(name)
            .ok_or_else(|| ConfigError::FunctionNotFound(name.to_string()))
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionSpec> {
        self.functions.values()
    }
}

/// Builds the project used by the feedback loop: provisions secrets, sets the
/// source and default image, and registers the serving, training and
/// dataset-generation functions.
pub fn setup_project(params: &ProjectParams, secrets: &dyn SecretSource) -> Result<Project, ConfigError> {
    let mut project = Project::new(&params.name);
    project.provision_secrets(secrets)?;

    if let Some(source) = &params.source {
        info!("Project source: {}", source);
        project.source = Some(source.clone());
        project.pull_at_runtime = true;
    }

    let Some(default_image) = &params.default_image else {
        return Err(ConfigError::NoDefaultImage);
    };
    project.default_image = Some(default_image.clone());

    project.set_function(
        FunctionSpec::new("llm-server", "model_server.py", FunctionKind::Serving)
            .gpus(1)
            .node_selector(params.node_selector.clone())
            .requirements([
                "torch>=2.0.0",
                "transformers>=4.36.0",
                "accelerate>=0.25.0",
                "peft>=0.7.0",
                "sentencepiece>=0.1.99",
            ]),
    );

    project.set_function(
        FunctionSpec::new("train", "train.py", FunctionKind::Job)
            .image(default_image.clone())
            .gpus(1)
            .node_selector(params.node_selector.clone())
            .node_name(params.node_name.clone())
            .requirements(["transformers==4.56.1", "peft==0.17.1"]),
    );

    project.set_function(
        FunctionSpec::new("generate-ds", "generate_ds.py", FunctionKind::Job)
            .image("mlrun/mlrun")
            .node_selector(params.node_selector.clone())
            .node_name(params.node_name.clone())
            .requirements(["openai==1.77.0", "huggingface-hub==0.31.1"]),
    );

    info!(project = %project.name, functions = project.functions.len(), "Project ready");
    Ok(project)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_secrets() -> MapSecrets {
        MapSecrets::new()
            .with("OPENAI_API_KEY", "sk-test")
            .with("OPENAI_BASE_URL", "https://llm.example/v1")
            .with("HF_TOKEN", "hf-test")
    }

    fn params() -> ProjectParams {
        ProjectParams {
            name: "banking".into(),
            source: Some("git://example/repo.git#main".into()),
            default_image: Some("registry/banking:latest".into()),
            node_selector: BTreeMap::from([("gpu".to_string(), "a100".to_string())]),
            node_name: Some("worker-1".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_setup_registers_functions() {
        let project = setup_project(&params(), &all_secrets()).unwrap();

        assert!(project.pull_at_runtime);
        assert_eq!(project.functions.len(), 3);

        let server = project.get_function("llm-server").unwrap();
        assert_eq!(server.kind, FunctionKind::Serving);
        assert_eq!(server.image.as_deref(), Some("registry/banking:latest"));
        assert_eq!(server.limits.gpus, 1);
        assert_eq!(server.min_replicas, Some(1));
        assert_eq!(server.node_selector["gpu"], "a100");

        let train = project.get_function("train").unwrap();
        assert!(train.node_name.is_none());

        let dataset_fn = project.get_function("generate-ds").unwrap();
        assert_eq!(dataset_fn.image.as_deref(), Some("mlrun/mlrun"));
        assert_eq!(dataset_fn.node_name.as_deref(), Some("worker-1"));
        assert!(dataset_fn.node_selector.is_empty());
        assert!(dataset_fn.min_replicas.is_none());
    }

    #[test]
    fn test_setup_fails_fast_on_missing_secret() {
        let secrets = MapSecrets::new().with("OPENAI_API_KEY", "sk-test");
        let err = setup_project(&params(), &secrets).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSecret(k) if k == "OPENAI_BASE_URL"));
    }

    #[test]
    fn test_setup_requires_default_image() {
        let params = ProjectParams { default_image: None, ..params() };
        let err = setup_project(&params, &all_secrets()).unwrap_err();
        assert!(matches!(err, ConfigError::NoDefaultImage));
    }

    #[test]
    fn test_secrets_provisioned_under_project_keys() {
        let project = setup_project(&params(), &all_secrets()).unwrap();
        assert_eq!(
            project.secrets().require("OPENAI_API_BASE").unwrap(),
            "https://llm.example/v1"
        );
    }

    #[test]
    fn test_save_and_load_omits_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.json");

        let project = setup_project(&params(), &all_secrets()).unwrap();
        project.save(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("sk-test"));

        let loaded = Project::load(&path).unwrap();
        assert_eq!(loaded.functions, project.functions);
        assert!(loaded.secrets().is_empty());
    }

    #[test]
    fn test_unknown_function() {
        let project = Project::new("p");
        assert!(matches!(project.get_function("nope"), Err(ConfigError::FunctionNotFound(_))));
    }
}
