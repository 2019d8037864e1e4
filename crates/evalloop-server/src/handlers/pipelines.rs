//! Pipeline listing and execution handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use evalloop_engine::RunReport;

use crate::dto::{PipelinesListResponse, RunPipelineRequest};
use crate::error::AppError;
use crate::services;
use crate::ServerState;

/// GET /api/pipelines - List pipeline definitions.
pub async fn list(State(state): State<Arc<ServerState>>) -> Json<PipelinesListResponse> {
    let pipelines = state.presets.list().into_iter().cloned().collect();
    Json(PipelinesListResponse { pipelines })
}

/// POST /api/pipelines/{id}/run - Run a pipeline with the given args.
pub async fn run(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Json(req): Json<RunPipelineRequest>,
) -> Result<Json<RunReport>, AppError> {
    let report = services::pipeline::run_pipeline(&state, &id, req.args).await?;
    Ok(Json(report))
}
