use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lookalike_core::{ranking::RankError, EmbeddingError, SearchError};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Malformed upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Search failed: {0}")]
    Search(#[from] SearchError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            ServerError::BadRequest(reason) => (StatusCode::BAD_REQUEST, reason.clone()),
            // Carries its own status, e.g. 413 when the upload exceeds the body limit
            ServerError::Multipart(e) => (e.status(), e.body_text()),
            ServerError::Search(SearchError::IndexUnavailable { reason }) => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Catalog index not loaded: {}", reason),
            ),
            ServerError::Search(SearchError::Embedding(e @ EmbeddingError::Decode { .. })) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("Invalid image: {}", e),
            ),
            ServerError::Search(SearchError::Embedding(e)) if e.is_input_error() => (
                StatusCode::BAD_REQUEST,
                format!("Invalid image: {}", e),
            ),
            ServerError::Search(SearchError::Rank(RankError::InvalidTopK)) => (
                StatusCode::BAD_REQUEST,
                "top_k must be at least 1".to_string(),
            ),
            ServerError::Search(e) => {
                error!(error = ?e, "Search failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            },
            ServerError::Internal(msg) => {
                error!(error = %msg, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            },
        };

        (status, Json(json!({ "error": error_message }))).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
