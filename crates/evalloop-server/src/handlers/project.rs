//! Project registry handler.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::dto::ProjectResponse;
use crate::ServerState;

/// GET /api/project - Registered functions and provisioned secret names.
pub async fn get(State(state): State<Arc<ServerState>>) -> Json<ProjectResponse> {
    let project = &state.project;
    let mut secrets: Vec<String> = project.secrets().keys().map(String::from).collect();
    secrets.sort();

    Json(ProjectResponse {
        name: project.name.clone(),
        source: project.source.clone(),
        default_image: project.default_image.clone(),
        functions: project.functions().cloned().collect(),
        secrets,
    })
}
