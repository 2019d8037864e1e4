//! Monitoring result handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use evalloop_core::ResultStatus;
use evalloop_monitor::ResultQuery;

use crate::dto::{ListResultsQuery, ResultsListResponse};
use crate::error::AppError;
use crate::ServerState;

/// GET /api/results - List results with optional filtering.
pub async fn list(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<ListResultsQuery>,
) -> Result<Json<ResultsListResponse>, AppError> {
    let status = params
        .status
        .as_deref()
        .map(|s| {
            ResultStatus::parse(s).ok_or_else(|| AppError::BadRequest(format!("unknown status: {}", s)))
        })
        .transpose()?;

    let query = ResultQuery {
        name: params.name,
        status,
        limit: params.limit.or(Some(50)),
        offset: params.offset,
    };

    let results = state.store.list_results(&query)?;
    Ok(Json(ResultsListResponse { results }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing;

    #[tokio::test]
    async fn test_unknown_status_rejected() {
        let query = ListResultsQuery { status: Some("maybe".into()), ..Default::default() };
        let err = list(State(testing::state()), Query(query)).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_empty_listing() {
        let query = ListResultsQuery { status: Some("detected".into()), ..Default::default() };
        let Json(resp) = list(State(testing::state()), Query(query)).await.unwrap();
        assert!(resp.results.is_empty());
    }
}
