//! Core domain types and error definitions for evalloop.
//!
//! This crate provides the fundamental types shared across the workspace:
//!
//! - [`AgentError`] - Error type for LLM and external collaborator calls
//! - [`SampleRow`], [`ScoredRow`], [`ScoredTable`] - Judging input and output rows
//! - [`ResultStatus`], [`ResultKind`], [`ApplicationResult`] - Monitoring results
//! - [`TestCase`], [`Grade`], [`Grader`] - The grading collaborator seam
//! - [`ModelConfig`] - LLM model configuration
//!
//! # Example
//!
//! ```rust
//! use evalloop_core::{SampleRow, ScoredRow, ScoredTable};
//!
//! let sample = SampleRow::new("What is my balance?", "Your balance is $120.");
//!
//! let mut table = ScoredTable::default();
//! table.push(ScoredRow::from_sample(0, &sample, 1.0, "Banking related."));
//! assert_eq!(table.len(), 1);
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while talking to the LLM or other external collaborators.
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM API request failed.
    #[error("LLM request failed: {0}")]
    LlmError(String),

    /// Failed to parse structured output from LLM.
    #[error("Failed to parse structured output: {0}")]
    ParseError(String),

    /// The request could not be built from the given input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// External API call failed.
    #[error("External API error: {0}")]
    ExternalApi(String),

    /// A credential needed to reach an external service is not configured.
    #[error("Missing credential: {0}")]
    MissingCredential(String),
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::ParseError(err.to_string())
    }
}

/// Configuration for an LLM model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Unique identifier for this model configuration.
    pub id: String,
    /// Human-readable display name.
    pub name: String,
    /// The actual model identifier (e.g., "gpt-4o").
    pub model: String,
    /// Optional API base URL for self-hosted or alternative endpoints.
    pub api_base: Option<String>,
}

impl ModelConfig {
    /// Shorthand for a model whose id, name and model identifier are the same.
    pub fn named(model: impl Into<String>) -> Self {
        let model = model.into();
        Self { id: model.clone(), name: model.clone(), model, api_base: None }
    }
}

// ============================================================================
// Judging rows
// ============================================================================

/// A single sampled inference: the question sent to the model and its answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRow {
    pub question: String,
    pub answer: String,
}

impl SampleRow {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self { question: question.into(), answer: answer.into() }
    }
}

/// A sample row annotated with the grader's score and justification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRow {
    /// Position of the originating row in the input batch. Not part of the
    /// persisted table.
    #[serde(skip)]
    pub index: usize,
    pub question: String,
    pub answer: String,
    pub score: f64,
    pub explanation: String,
}

impl ScoredRow {
    pub fn from_sample(index: usize, sample: &SampleRow, score: f64, explanation: impl Into<String>) -> Self {
        Self {
            index,
            question: sample.question.clone(),
            answer: sample.answer.clone(),
            score,
            explanation: explanation.into(),
        }
    }
}

/// Ordered collection of scored rows produced by one judging pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoredTable {
    rows: Vec<ScoredRow>,
}

impl ScoredTable {
    /// Column names of the persisted table, in order.
    pub const COLUMNS: [&'static str; 4] = ["question", "answer", "score", "explanation"];

    pub fn new(rows: Vec<ScoredRow>) -> Self {
        Self { rows }
    }

    pub fn push(&mut self, row: ScoredRow) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[ScoredRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The score column.
    pub fn scores(&self) -> impl Iterator<Item = f64> + '_ {
        self.rows.iter().map(|r| r.score)
    }
}

// ============================================================================
// Monitoring results
// ============================================================================

/// Coarse outcome of a monitoring application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    /// The application detected a problem; downstream retraining should trigger.
    Detected,
    /// Nothing to act on.
    NoDetection,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Detected => "detected",
            ResultStatus::NoDetection => "no_detection",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "detected" => Some(ResultStatus::Detected),
            "no_detection" => Some(ResultStatus::NoDetection),
            _ => None,
        }
    }

    pub fn is_detected(&self) -> bool {
        matches!(self, ResultStatus::Detected)
    }
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a monitoring result measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    ModelPerformance,
    DataDrift,
    SystemPerformance,
}

impl ResultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultKind::ModelPerformance => "model_performance",
            ResultKind::DataDrift => "data_drift",
            ResultKind::SystemPerformance => "system_performance",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "model_performance" => Some(ResultKind::ModelPerformance),
            "data_drift" => Some(ResultKind::DataDrift),
            "system_performance" => Some(ResultKind::SystemPerformance),
            _ => None,
        }
    }
}

/// Aggregate result of one monitoring window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationResult {
    /// Metric name the result is reported under.
    pub name: String,
    /// Aggregate value (mean score for the judge).
    pub value: f64,
    pub kind: ResultKind,
    pub status: ResultStatus,
    #[serde(default)]
    pub extra_data: serde_json::Map<String, serde_json::Value>,
}

// ============================================================================
// Grading collaborator
// ============================================================================

/// Fields of a [`TestCase`] a metric can be asked to look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalParam {
    Input,
    ActualOutput,
    ExpectedOutput,
    Context,
    RetrievalContext,
}

impl EvalParam {
    /// Human-readable label used when rendering prompts.
    pub fn label(&self) -> &'static str {
        match self {
            EvalParam::Input => "Input",
            EvalParam::ActualOutput => "Actual Output",
            EvalParam::ExpectedOutput => "Expected Output",
            EvalParam::Context => "Context",
            EvalParam::RetrievalContext => "Retrieval Context",
        }
    }
}

/// A single evaluation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub actual_output: String,
    #[serde(default)]
    pub expected_output: Option<String>,
    #[serde(default)]
    pub context: Vec<String>,
    #[serde(default)]
    pub retrieval_context: Vec<String>,
}

impl TestCase {
    pub fn new(input: impl Into<String>, actual_output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            actual_output: actual_output.into(),
            ..Default::default()
        }
    }

    /// Returns the rendered value of `param`, or `None` when the case lacks it.
    pub fn param(&self, param: EvalParam) -> Option<String> {
        match param {
            EvalParam::Input => Some(self.input.clone()),
            EvalParam::ActualOutput => Some(self.actual_output.clone()),
            EvalParam::ExpectedOutput => self.expected_output.clone(),
            EvalParam::Context if !self.context.is_empty() => Some(self.context.join("\n")),
            EvalParam::RetrievalContext if !self.retrieval_context.is_empty() => {
                Some(self.retrieval_context.join("\n"))
            }
            EvalParam::Context | EvalParam::RetrievalContext => None,
        }
    }
}

impl From<&SampleRow> for TestCase {
    fn from(row: &SampleRow) -> Self {
        TestCase::new(row.question.clone(), row.answer.clone())
    }
}

/// Score and justification returned by a grader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    /// Normalized score in `[0, 1]`.
    pub score: f64,
    pub reason: String,
}

/// Something that can score a [`TestCase`].
#[async_trait]
pub trait Grader: Send + Sync {
    /// Metric name, used in logs.
    fn name(&self) -> &str;

    async fn grade(&self, case: &TestCase) -> Result<Grade, AgentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [ResultStatus::Detected, ResultStatus::NoDetection] {
            assert_eq!(ResultStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ResultStatus::parse("unknown"), None);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ResultStatus::NoDetection).unwrap();
        assert_eq!(json, "\"no_detection\"");
    }

    #[test]
    fn test_scored_table_serializes_as_row_array() {
        let sample = SampleRow::new("q", "a");
        let table = ScoredTable::new(vec![ScoredRow::from_sample(0, &sample, 0.5, "meh")]);

        let value = serde_json::to_value(&table).unwrap();
        assert!(value.is_array());
        assert_eq!(value[0]["question"], "q");
        assert_eq!(value[0]["score"], 0.5);
        assert!(value[0].get("index").is_none());
    }

    #[test]
    fn test_case_params() {
        let case = TestCase::new("question", "answer");
        assert_eq!(case.param(EvalParam::Input).as_deref(), Some("question"));
        assert_eq!(case.param(EvalParam::ActualOutput).as_deref(), Some("answer"));
        assert!(case.param(EvalParam::ExpectedOutput).is_none());
        assert!(case.param(EvalParam::Context).is_none());

        let case = TestCase {
            context: vec!["a".into(), "b".into()],
            ..case
        };
        assert_eq!(case.param(EvalParam::Context).as_deref(), Some("a\nb"));
    }

    #[test]
    fn test_case_from_sample() {
        let case = TestCase::from(&SampleRow::new("q", "a"));
        assert_eq!(case.input, "q");
        assert_eq!(case.actual_output, "a");
    }
}
