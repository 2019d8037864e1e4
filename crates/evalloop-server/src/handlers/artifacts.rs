//! Dataset artifact handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use evalloop_monitor::DatasetArtifact;

use crate::dto::{ArtifactsListResponse, ArtifactsQuery};
use crate::error::AppError;
use crate::ServerState;

/// GET /api/artifacts - List logged tables, optionally for one key.
pub async fn list(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<ArtifactsQuery>,
) -> Result<Json<ArtifactsListResponse>, AppError> {
    let artifacts = state.store.list_datasets(params.key.as_deref())?;
    Ok(Json(ArtifactsListResponse { artifacts }))
}

/// GET /api/artifacts/{key}/{tag} - Get a scored table.
pub async fn get(
    State(state): State<Arc<ServerState>>,
    Path((key, tag)): Path<(String, String)>,
) -> Result<Json<DatasetArtifact>, AppError> {
    let artifact = state
        .store
        .get_dataset(&key, &tag)?
        .ok_or_else(|| AppError::NotFound(format!("artifact {}/{} not found", key, tag)))?;
    Ok(Json(artifact))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing;
    use evalloop_core::{SampleRow, ScoredRow, ScoredTable};

    #[tokio::test]
    async fn test_list_and_get() {
        let state = testing::state();
        let sample = SampleRow::new("q", "a");
        let table = ScoredTable::new(vec![ScoredRow::from_sample(0, &sample, 1.0, "ok")]);
        state.store.log_dataset("m", &table, "t1").unwrap();

        let Json(listed) = list(State(state.clone()), Query(ArtifactsQuery { key: Some("m".into()) }))
            .await
            .unwrap();
        assert_eq!(listed.artifacts.len(), 1);

        let Json(artifact) = get(State(state.clone()), Path(("m".into(), "t1".into()))).await.unwrap();
        assert_eq!(artifact.rows, table);

        let err = get(State(state), Path(("m".into(), "t2".into()))).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
