//! Request and response bodies.

use evalloop_config::{FunctionSpec, PipelineConfig};
use evalloop_core::SampleRow;
use evalloop_engine::Args;
use evalloop_judge::{RowFailure, RowFailurePolicy, StatusPolicy};
use evalloop_monitor::{DatasetSummary, ResultRecord, RunRecord, StepRecord};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct JudgeRequest {
    /// Defaults to the server's configured metric name.
    pub metric_name: Option<String>,
    /// Defaults to now.
    pub end_infer_time: Option<String>,
    pub samples: Vec<SampleRow>,
    #[serde(default)]
    pub failure_policy: RowFailurePolicy,
    #[serde(default)]
    pub status_policy: StatusPolicy,
}

#[derive(Debug, Serialize)]
pub struct JudgeResponse {
    #[serde(flatten)]
    pub record: ResultRecord,
    pub artifact_key: String,
    pub artifact_tag: String,
    /// Rows left out under the skip failure policy.
    pub failures: Vec<RowFailure>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ArtifactsQuery {
    pub key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ArtifactsListResponse {
    pub artifacts: Vec<DatasetSummary>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListResultsQuery {
    pub name: Option<String>,
    pub status: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ResultsListResponse {
    pub results: Vec<ResultRecord>,
}

#[derive(Debug, Serialize)]
pub struct ProjectResponse {
    pub name: String,
    pub source: Option<String>,
    pub default_image: Option<String>,
    pub functions: Vec<FunctionSpec>,
    /// Names of provisioned secrets; values are never returned.
    pub secrets: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PipelinesListResponse {
    pub pipelines: Vec<PipelineConfig>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RunPipelineRequest {
    #[serde(default)]
    pub args: Args,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListRunsQuery {
    pub pipeline_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct RunsListResponse {
    pub runs: Vec<RunRecord>,
}

#[derive(Debug, Serialize)]
pub struct RunDetailResponse {
    pub run: RunRecord,
    pub steps: Vec<StepRecord>,
}
