//! Record types for artifacts, monitoring results and pipeline runs.

use std::collections::HashMap;

use evalloop_core::{ApplicationResult, ResultStatus, ScoredTable};
use serde::{Deserialize, Serialize};

/// A scored table logged by a monitoring application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetArtifact {
    pub key: String,
    pub tag: String,
    /// Unix timestamp (milliseconds) when the artifact was logged.
    pub created_at: i64,
    pub rows: ScoredTable,
}

/// Artifact listing entry (rows omitted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub key: String,
    pub tag: String,
    pub created_at: i64,
    pub row_count: u64,
}

/// A persisted monitoring result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: String,
    #[serde(flatten)]
    pub result: ApplicationResult,
    /// End of the monitoring window the result covers.
    pub end_infer_time: String,
    pub created_at: i64,
}

/// Query parameters for listing results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultQuery {
    pub name: Option<String>,
    pub status: Option<ResultStatus>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// A complete execution trace for a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub pipeline_id: String,
    pub pipeline_name: String,
    /// Unix timestamp (milliseconds) when the run started.
    pub timestamp: i64,
    /// Arguments the pipeline was started with.
    pub args: serde_json::Value,
    pub total_elapsed_ms: u64,
    pub steps_succeeded: u32,
    pub steps_failed: u32,
    pub steps_skipped: u32,
    pub status: RunStatus,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunStatus::Running),
            "succeeded" => Some(RunStatus::Succeeded),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Succeeded,
    Failed,
    /// Not run because a condition on an upstream output did not hold.
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Succeeded => "succeeded",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "succeeded" => Some(StepStatus::Succeeded),
            "failed" => Some(StepStatus::Failed),
            "skipped" => Some(StepStatus::Skipped),
            _ => None,
        }
    }
}

/// One step execution within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub record_id: String,
    pub run_id: String,
    pub step_id: String,
    pub function: String,
    pub status: StepStatus,
    pub start_time: i64,
    pub end_time: i64,
    #[serde(default)]
    pub outputs: HashMap<String, String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Query parameters for listing runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunQuery {
    pub pipeline_id: Option<String>,
    pub status: Option<RunStatus>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_is_strict() {
        for status in [RunStatus::Running, RunStatus::Succeeded, RunStatus::Failed] {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        for status in [StepStatus::Succeeded, StepStatus::Failed, StepStatus::Skipped] {
            assert_eq!(StepStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RunStatus::parse("bogus"), None);
        assert_eq!(StepStatus::parse("garbage"), None);
    }
}
