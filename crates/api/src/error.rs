use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use carescope_report::PipelineError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Error answering question: {0}")]
    Generation(#[from] PipelineError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Generation(e) => {
                tracing::error!(error = %e, "Report generation failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
