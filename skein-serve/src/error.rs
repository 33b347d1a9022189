//! JSON error envelope returned to HTTP clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use skein::WorkflowError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("no run with id '{0}'")]
    UnknownRun(String),
    #[error("workflow has no checkpoint storage configured")]
    NoCheckpointStorage,
    #[error("no checkpoint with id '{0}'")]
    UnknownCheckpoint(String),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    tag: &'static str,
}

impl ApiError {
    fn tag(&self) -> &'static str {
        match self {
            ApiError::UnknownRun(_) => "unknown_run",
            ApiError::NoCheckpointStorage => "no_checkpoint_storage",
            ApiError::UnknownCheckpoint(_) => "unknown_checkpoint",
            ApiError::Workflow(err) => err.error_tag(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::UnknownRun(_) | ApiError::UnknownCheckpoint(_) => StatusCode::NOT_FOUND,
            ApiError::NoCheckpointStorage => StatusCode::NOT_IMPLEMENTED,
            ApiError::Workflow(WorkflowError::GraphMismatch { .. }) => StatusCode::CONFLICT,
            ApiError::Workflow(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            tag: self.tag(),
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
