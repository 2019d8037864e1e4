//! Application error types and Axum response conversion.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use evalloop_config::ConfigError;
use evalloop_engine::EngineError;
use evalloop_judge::JudgeError;
use evalloop_monitor::StoreError;
use serde::Serialize;

/// Application-level errors with HTTP status code mapping.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        tracing::error!("Store error: {}", e);
        AppError::Internal(e.to_string())
    }
}

impl From<JudgeError> for AppError {
    fn from(e: JudgeError) -> Self {
        match e {
            JudgeError::EmptyBatch
            | JudgeError::InvalidSample { .. }
            | JudgeError::UnmappedStatus { .. }
            | JudgeError::InvalidPolicy { .. } => AppError::BadRequest(e.to_string()),
            JudgeError::Grading { .. } | JudgeError::Artifact(_) => {
                tracing::error!("Judging failed: {}", e);
                AppError::Internal(e.to_string())
            }
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::PresetNotFound(_) | ConfigError::FunctionNotFound(_) => {
                AppError::NotFound(e.to_string())
            }
            ConfigError::MissingSecret(_) => {
                tracing::error!("{}", e);
                AppError::Internal(e.to_string())
            }
            _ => AppError::BadRequest(e.to_string()),
        }
    }
}

impl From<EngineError> for AppError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Config(inner) => inner.into(),
            EngineError::MissingArg(_) | EngineError::InvalidParams { .. } => {
                AppError::BadRequest(e.to_string())
            }
            _ => AppError::Internal(e.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            AppError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_judge_errors_map_to_status() {
        let resp = AppError::from(JudgeError::EmptyBatch).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = AppError::from(JudgeError::Artifact("disk full".into())).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_config_errors_map_to_status() {
        let resp = AppError::from(ConfigError::PresetNotFound("x".into())).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = AppError::from(EngineError::MissingArg("metric_name".into())).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
