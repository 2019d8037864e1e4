//! The judging pass: grade each row, keep order, aggregate.

use std::sync::Arc;

use evalloop_core::{Grader, SampleRow, ScoredRow, ScoredTable, TestCase};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::JudgeError;

/// What to do when the grader fails on a row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowFailurePolicy {
    /// Fail the whole pass on the first grading error.
    #[default]
    Abort,
    /// Leave the row out of the table and report it in [`JudgeOutcome::failures`].
    Skip,
}

/// A row left out under [`RowFailurePolicy::Skip`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowFailure {
    pub index: usize,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JudgeOutcome {
    pub table: ScoredTable,
    #[serde(default)]
    pub failures: Vec<RowFailure>,
}

/// Scores sample rows one at a time with a grader.
pub struct Judge {
    grader: Arc<dyn Grader>,
    failure_policy: RowFailurePolicy,
}

impl Judge {
    pub fn new(grader: Arc<dyn Grader>) -> Self {
        Self { grader, failure_policy: RowFailurePolicy::default() }
    }

    pub fn with_failure_policy(mut self, policy: RowFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Grades every row in order. Row `i` of the table comes from sample row `i`.
    pub async fn judge(&self, sample: &[SampleRow]) -> Result<JudgeOutcome, JudgeError> {
        validate_sample(sample)?;

        info!(metric = %self.grader.name(), rows = sample.len(), "Judging sample");

        let mut outcome = JudgeOutcome::default();
        for (index, row) in sample.iter().enumerate() {
            let case = TestCase::from(row);
            match self.grader.grade(&case).await {
                Ok(grade) => {
                    debug!(index, score = grade.score, "Scored row");
                    outcome.table.push(ScoredRow::from_sample(index, row, grade.score, grade.reason));
                }
                Err(source) if self.failure_policy == RowFailurePolicy::Skip => {
                    warn!(index, error = %source, "Skipping row after grading failure");
                    outcome.failures.push(RowFailure { index, error: source.to_string() });
                }
                Err(source) => return Err(JudgeError::Grading { index, source }),
            }
        }

        if outcome.table.is_empty() {
            return Err(JudgeError::EmptyBatch);
        }

        Ok(outcome)
    }
}

/// Rejects an empty sample or a row with a blank question or answer.
pub fn validate_sample(sample: &[SampleRow]) -> Result<(), JudgeError> {
    if sample.is_empty() {
        return Err(JudgeError::EmptyBatch);
    }
    for (index, row) in sample.iter().enumerate() {
        if row.question.trim().is_empty() {
            return Err(JudgeError::InvalidSample { index, field: "question" });
        }
        if row.answer.trim().is_empty() {
            return Err(JudgeError::InvalidSample { index, field: "answer" });
        }
    }
    Ok(())
}

/// Arithmetic mean of the score column.
pub fn aggregate(table: &ScoredTable) -> Result<f64, JudgeError> {
    if table.is_empty() {
        return Err(JudgeError::EmptyBatch);
    }
    Ok(table.scores().sum::<f64>() / table.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use evalloop_core::{AgentError, Grade};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scores rows from a fixed list; a `None` entry fails.
    struct FixedGrader {
        scores: Vec<Option<f64>>,
        calls: AtomicUsize,
    }

    impl FixedGrader {
        fn new(scores: Vec<Option<f64>>) -> Arc<Self> {
            Arc::new(Self { scores, calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl Grader for FixedGrader {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn grade(&self, case: &TestCase) -> Result<Grade, AgentError> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.scores.get(i).copied().flatten() {
                Some(score) => Ok(Grade { score, reason: format!("graded {}", case.input) }),
                None => Err(AgentError::LlmError("rate limited".into())),
            }
        }
    }

    fn rows(n: usize) -> Vec<SampleRow> {
        (0..n).map(|i| SampleRow::new(format!("q{}", i), format!("a{}", i))).collect()
    }

    #[tokio::test]
    async fn test_order_preserved() {
        let judge = Judge::new(FixedGrader::new(vec![Some(0.0), Some(0.0), Some(1.0)]));
        let outcome = judge.judge(&rows(3)).await.unwrap();

        let table = outcome.table.rows();
        assert_eq!(table.len(), 3);
        for (i, row) in table.iter().enumerate() {
            assert_eq!(row.index, i);
            assert_eq!(row.question, format!("q{}", i));
            assert_eq!(row.answer, format!("a{}", i));
            assert_eq!(row.explanation, format!("graded q{}", i));
        }
        assert_eq!(outcome.table.scores().collect::<Vec<_>>(), vec![0.0, 0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_empty_batch_fails() {
        let grader = FixedGrader::new(vec![]);
        let err = Judge::new(grader.clone()).judge(&[]).await.unwrap_err();
        assert!(matches!(err, JudgeError::EmptyBatch));
        assert_eq!(grader.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blank_answer_rejected_before_grading() {
        let grader = FixedGrader::new(vec![Some(1.0), Some(1.0)]);
        let sample = vec![SampleRow::new("q0", "a0"), SampleRow::new("q1", "   ")];

        let err = Judge::new(grader.clone()).judge(&sample).await.unwrap_err();
        assert!(matches!(err, JudgeError::InvalidSample { index: 1, field: "answer" }));
        assert_eq!(grader.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_abort_on_first_failure() {
        let grader = FixedGrader::new(vec![Some(1.0), None, Some(1.0)]);
        let err = Judge::new(grader.clone()).judge(&rows(3)).await.unwrap_err();

        assert!(matches!(err, JudgeError::Grading { index: 1, .. }));
        assert_eq!(grader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_skip_reports_failures() {
        let judge = Judge::new(FixedGrader::new(vec![Some(1.0), None, Some(0.0)]))
            .with_failure_policy(RowFailurePolicy::Skip);
        let outcome = judge.judge(&rows(3)).await.unwrap();

        assert_eq!(outcome.table.len(), 2);
        assert_eq!(outcome.table.rows()[1].index, 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].index, 1);
        assert!(outcome.failures[0].error.contains("rate limited"));
    }

    #[tokio::test]
    async fn test_skip_all_failed_is_empty_batch() {
        let judge = Judge::new(FixedGrader::new(vec![None, None]))
            .with_failure_policy(RowFailurePolicy::Skip);
        assert!(matches!(judge.judge(&rows(2)).await, Err(JudgeError::EmptyBatch)));
    }

    #[tokio::test]
    async fn test_aggregate_mean() {
        let judge = Judge::new(FixedGrader::new(vec![Some(0.0), Some(0.0), Some(1.0)]));
        let outcome = judge.judge(&rows(3)).await.unwrap();

        let mean = aggregate(&outcome.table).unwrap();
        assert!((mean - 1.0 / 3.0).abs() < 1e-9);
        assert!((0.0..=1.0).contains(&mean));
    }

    #[test]
    fn test_aggregate_empty_table() {
        assert!(matches!(aggregate(&ScoredTable::default()), Err(JudgeError::EmptyBatch)));
    }
}
