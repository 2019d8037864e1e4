//! The monitoring application run once per monitoring window.

use async_trait::async_trait;
use evalloop_core::{ApplicationResult, ResultKind, SampleRow, ScoredTable};
use tracing::{info, warn};

use crate::judge::{aggregate, Judge, RowFailure};
use crate::status::StatusPolicy;
use crate::tag::sanitize_tag;
use crate::JudgeError;

pub const APPLICATION_NAME: &str = "deepeval-as-a-judge";

/// What a monitoring application sees of one window.
pub trait MonitoringContext: Send {
    /// The sampled (question, answer) rows.
    fn sample(&self) -> &[SampleRow];

    /// End of the window, as `YYYY-MM-DD HH:MM:SS[.ffffff]+HH:MM`.
    fn end_infer_time(&self) -> &str;

    /// Stores a table under `key`/`tag`.
    fn log_dataset(&mut self, key: &str, table: &ScoredTable, tag: &str) -> Result<(), JudgeError>;

    /// Receives the rows left out of the logged table.
    fn report_failures(&mut self, _failures: &[RowFailure]) {}
}

#[async_trait]
pub trait MonitoringApplication: Send + Sync {
    fn name(&self) -> &str;

    async fn do_tracking(
        &self,
        ctx: &mut dyn MonitoringContext,
    ) -> Result<ApplicationResult, JudgeError>;
}

/// Judges the window's sample, logs the scored table and reports the mean.
pub struct JudgeApplication {
    metric_name: String,
    judge: Judge,
    status_policy: StatusPolicy,
}

impl JudgeApplication {
    pub fn new(metric_name: impl Into<String>, judge: Judge) -> Self {
        Self {
            metric_name: metric_name.into(),
            judge,
            status_policy: StatusPolicy::default(),
        }
    }

    pub fn with_status_policy(mut self, policy: StatusPolicy) -> Self {
        self.status_policy = policy;
        self
    }

    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }
}

#[async_trait]
impl MonitoringApplication for JudgeApplication {
    fn name(&self) -> &str {
        APPLICATION_NAME
    }

    async fn do_tracking(
        &self,
        ctx: &mut dyn MonitoringContext,
    ) -> Result<ApplicationResult, JudgeError> {
        let outcome = self.judge.judge(ctx.sample()).await?;
        if !outcome.failures.is_empty() {
            warn!(
                metric = %self.metric_name,
                failed = outcome.failures.len(),
                "Rows left out of the scored table"
            );
            ctx.report_failures(&outcome.failures);
        }

        let tag = sanitize_tag(ctx.end_infer_time());
        ctx.log_dataset(&self.metric_name, &outcome.table, &tag)?;

        let mean = aggregate(&outcome.table)?;
        let status = self.status_policy.status(mean)?;

        info!(
            metric = %self.metric_name,
            rows = outcome.table.len(),
            mean,
            status = status.as_str(),
            tag = %tag,
            "Monitoring window judged"
        );

        Ok(ApplicationResult {
            name: self.metric_name.clone(),
            value: mean,
            kind: ResultKind::ModelPerformance,
            status,
            extra_data: Default::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evalloop_core::{AgentError, Grade, Grader, ResultStatus, TestCase};
    use std::sync::{Arc, Mutex};

    /// Scores by answer text: "good" answers get 1.0, everything else 0.0.
    struct KeywordGrader;

    #[async_trait]
    impl Grader for KeywordGrader {
        fn name(&self) -> &str {
            "keyword"
        }

        async fn grade(&self, case: &TestCase) -> Result<Grade, AgentError> {
            if case.actual_output.contains("timeout") {
                return Err(AgentError::LlmError("judge timed out".into()));
            }
            let score = if case.actual_output.contains("good") { 1.0 } else { 0.0 };
            Ok(Grade { score, reason: "keyword".into() })
        }
    }

    struct VecContext {
        sample: Vec<SampleRow>,
        end: String,
        logged: Arc<Mutex<Vec<(String, String, ScoredTable)>>>,
        failures: Vec<RowFailure>,
    }

    impl MonitoringContext for VecContext {
        fn sample(&self) -> &[SampleRow] {
            &self.sample
        }

        fn end_infer_time(&self) -> &str {
            &self.end
        }

        fn log_dataset(&mut self, key: &str, table: &ScoredTable, tag: &str) -> Result<(), JudgeError> {
            self.logged.lock().unwrap().push((key.into(), tag.into(), table.clone()));
            Ok(())
        }

        fn report_failures(&mut self, failures: &[RowFailure]) {
            self.failures.extend_from_slice(failures);
        }
    }

    fn context(answers: &[&str]) -> VecContext {
        VecContext {
            sample: answers.iter().map(|a| SampleRow::new("question", *a)).collect(),
            end: "2024-01-01 12:00:00.123+00:00".into(),
            logged: Arc::new(Mutex::new(Vec::new())),
            failures: Vec::new(),
        }
    }

    fn app() -> JudgeApplication {
        JudgeApplication::new("deepeval-correctness", Judge::new(Arc::new(KeywordGrader)))
    }

    #[tokio::test]
    async fn test_end_to_end_detected() {
        let mut ctx = context(&["bad", "bad", "good"]);
        let result = app().do_tracking(&mut ctx).await.unwrap();

        assert_eq!(result.name, "deepeval-correctness");
        assert_eq!(result.kind, ResultKind::ModelPerformance);
        assert!((result.value - 0.333).abs() < 1e-3);
        assert_eq!(result.status, ResultStatus::Detected);
        assert!(result.extra_data.is_empty());

        let logged = ctx.logged.lock().unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].0, "deepeval-correctness");
        assert_eq!(logged[0].1, "2024-01-01-12-00-00-123-00-00");
        assert_eq!(logged[0].2.len(), 3);
    }

    #[tokio::test]
    async fn test_no_detection() {
        let mut ctx = context(&["good", "good", "bad"]);
        let result = app().do_tracking(&mut ctx).await.unwrap();
        assert_eq!(result.status, ResultStatus::NoDetection);
    }

    #[tokio::test]
    async fn test_empty_window_logs_nothing() {
        let mut ctx = context(&[]);
        let err = app().do_tracking(&mut ctx).await.unwrap_err();
        assert!(matches!(err, JudgeError::EmptyBatch));
        assert!(ctx.logged.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cutoff_policy_applied() {
        let app = app().with_status_policy(StatusPolicy::Cutoff { cutoff: 0.9 });
        let mut ctx = context(&["good", "good", "good", "bad"]);
        let result = app.do_tracking(&mut ctx).await.unwrap();
        assert_eq!(result.status, ResultStatus::Detected);
    }

    #[tokio::test]
    async fn test_skipped_rows_reported_to_context() {
        let judge = Judge::new(Arc::new(KeywordGrader)).with_failure_policy(crate::RowFailurePolicy::Skip);
        let app = JudgeApplication::new("deepeval-correctness", judge);
        let mut ctx = context(&["good", "timeout", "good"]);

        let result = app.do_tracking(&mut ctx).await.unwrap();
        assert_eq!(result.status, ResultStatus::NoDetection);
        assert_eq!(ctx.logged.lock().unwrap()[0].2.len(), 2);
        assert_eq!(ctx.failures.len(), 1);
        assert_eq!(ctx.failures[0].index, 1);
    }

    #[test]
    fn test_application_name() {
        assert_eq!(app().name(), "deepeval-as-a-judge");
    }
}
