//! Pipeline run trace handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use evalloop_monitor::{MonitorSummary, RunQuery, RunStatus};

use crate::dto::{ListRunsQuery, RunDetailResponse, RunsListResponse};
use crate::error::AppError;
use crate::ServerState;

/// GET /api/runs - List runs with optional filtering.
pub async fn list(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<ListRunsQuery>,
) -> Result<Json<RunsListResponse>, AppError> {
    let status = params
        .status
        .as_deref()
        .map(|s| RunStatus::parse(s).ok_or_else(|| AppError::BadRequest(format!("unknown status: {}", s))))
        .transpose()?;

    let query = RunQuery {
        pipeline_id: params.pipeline_id,
        status,
        limit: params.limit.or(Some(50)),
        offset: params.offset,
    };

    let runs = state.store.list_runs(&query)?;
    Ok(Json(RunsListResponse { runs }))
}

/// GET /api/runs/{id} - Get a run with its steps.
pub async fn get(
    State(state): State<Arc<ServerState>>,
    Path(run_id): Path<String>,
) -> Result<Json<RunDetailResponse>, AppError> {
    let run = state
        .store
        .get_run(&run_id)?
        .ok_or_else(|| AppError::NotFound("run not found".into()))?;
    let steps = state.store.get_steps(&run_id)?;

    Ok(Json(RunDetailResponse { run, steps }))
}

/// DELETE /api/runs/{id} - Delete a run.
pub async fn delete(
    State(state): State<Arc<ServerState>>,
    Path(run_id): Path<String>,
) -> Result<Json<()>, AppError> {
    state.store.delete_run(&run_id)?;
    Ok(Json(()))
}

/// GET /api/metrics/summary - Aggregate counts.
pub async fn metrics_summary(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<MonitorSummary>, AppError> {
    let summary = state.store.summary()?;
    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing;

    #[tokio::test]
    async fn test_missing_run_is_not_found() {
        let err = get(State(testing::state()), Path("nope".into())).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unknown_status_filter_is_bad_request() {
        let params = ListRunsQuery { status: Some("bogus".into()), ..Default::default() };
        let err = list(State(testing::state()), Query(params)).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_summary_of_empty_store() {
        let Json(summary) = metrics_summary(State(testing::state())).await.unwrap();
        assert_eq!(summary.total_runs, 0);
        assert_eq!(summary.total_results, 0);
    }
}
