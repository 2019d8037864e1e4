//! Judge API handler.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::dto::{JudgeRequest, JudgeResponse};
use crate::error::AppError;
use crate::services;
use crate::ServerState;

/// POST /api/judge - Judge a monitoring window and store its result.
pub async fn judge(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<JudgeRequest>,
) -> Result<Json<JudgeResponse>, AppError> {
    let resp = services::judge::judge(&state, req).await?;
    Ok(Json(resp))
}
