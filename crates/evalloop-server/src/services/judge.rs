//! Running the judge application over a submitted monitoring window.

use evalloop_judge::{
    now_infer_time, sanitize_tag, validate_sample, Judge, JudgeApplication, StoreContext,
};

use crate::dto::{JudgeRequest, JudgeResponse};
use crate::error::AppError;
use crate::ServerState;

/// Judges the samples, logs the scored table and stores the result.
pub async fn judge(state: &ServerState, req: JudgeRequest) -> Result<JudgeResponse, AppError> {
    validate_sample(&req.samples)?;
    req.status_policy.validate()?;

    let metric_name = req
        .metric_name
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| state.config.metric_name.clone());
    let end_infer_time = req.end_infer_time.unwrap_or_else(now_infer_time);

    let grader = state.grader().await?;
    let judge = Judge::new(grader).with_failure_policy(req.failure_policy);
    let app = JudgeApplication::new(&metric_name, judge).with_status_policy(req.status_policy);

    let mut ctx = StoreContext::new(state.store.clone(), req.samples, &end_infer_time);
    let record = ctx.track(&app).await?;

    Ok(JudgeResponse {
        record,
        artifact_key: metric_name,
        artifact_tag: sanitize_tag(&end_infer_time),
        failures: ctx.failures().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing;
    use evalloop_core::{ResultStatus, SampleRow};
    use evalloop_judge::{RowFailurePolicy, StatusPolicy};

    fn request(answers: &[&str]) -> JudgeRequest {
        JudgeRequest {
            metric_name: None,
            end_infer_time: Some("2024-01-01 12:00:00.123+00:00".into()),
            samples: answers.iter().map(|a| SampleRow::new("How do I save money?", *a)).collect(),
            failure_policy: RowFailurePolicy::Abort,
            status_policy: StatusPolicy::Rounded,
        }
    }

    #[tokio::test]
    async fn test_judge_stores_artifact_and_result() {
        let state = testing::state();
        let resp = judge(&state, request(&["Cook rice", "Boil water", "Open a savings account"]))
            .await
            .unwrap();

        assert_eq!(resp.record.result.status, ResultStatus::Detected);
        assert_eq!(resp.artifact_key, "deepeval-correctness");
        assert_eq!(resp.artifact_tag, "2024-01-01-12-00-00-123-00-00");

        let artifact = state
            .store
            .get_dataset(&resp.artifact_key, &resp.artifact_tag)
            .unwrap()
            .unwrap();
        assert_eq!(artifact.rows.len(), 3);
        assert!(state.store.latest_result("deepeval-correctness").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_empty_samples_is_bad_request() {
        let state = testing::state();
        let err = judge(&state, request(&[])).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_empty_samples_checked_before_credentials() {
        let state = testing::state_without_grader();
        let err = judge(&state, request(&[])).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_blank_answer_checked_before_credentials() {
        let state = testing::state_without_grader();
        let err = judge(&state, request(&["Open a savings account", "  "])).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(m) if m.contains("answer")));
    }

    #[tokio::test]
    async fn test_out_of_range_cutoff_is_bad_request() {
        let state = testing::state();
        let mut req = request(&["Open a savings account"]);
        req.status_policy = StatusPolicy::Cutoff { cutoff: 5.0 };

        let err = judge(&state, req).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(state.store.latest_result("deepeval-correctness").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_skip_policy_reports_failed_rows() {
        let state = testing::state();
        let mut req = request(&["Open a savings account", "timeout", "Cook rice"]);
        req.failure_policy = RowFailurePolicy::Skip;

        let resp = judge(&state, req).await.unwrap();
        assert_eq!(resp.failures.len(), 1);
        assert_eq!(resp.failures[0].index, 1);
        assert!(resp.failures[0].error.contains("timed out"));

        let artifact = state
            .store
            .get_dataset(&resp.artifact_key, &resp.artifact_tag)
            .unwrap()
            .unwrap();
        assert_eq!(artifact.rows.len(), 2);

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["failures"][0]["index"], 1);
    }
}
