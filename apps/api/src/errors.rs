use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::llm_client::LlmError;
use crate::profiles::extract::ExtractError;
use crate::profiles::store::StoreError;
use crate::retrieval::context::SearchError;
use crate::retrieval::index::IndexError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Encoder not ready")]
    EncoderNotReady,

    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::EncoderNotReady => AppError::EncoderNotReady,
            SearchError::IndexUnavailable(msg) => AppError::IndexUnavailable(msg),
            SearchError::Encoder(e) => AppError::Encoder(e.to_string()),
            SearchError::Index(e) => e.into(),
        }
    }
}

impl From<IndexError> for AppError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::Encoder(e) => AppError::Encoder(e.to_string()),
            IndexError::Store(e) => e.into(),
            IndexError::Cache(e) => AppError::Internal(e.into()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) | StoreError::DirMissing(_) => AppError::NotFound(err.to_string()),
            StoreError::AlreadyExists(_) => AppError::Conflict(err.to_string()),
            StoreError::InvalidId(_) => AppError::Validation(err.to_string()),
            StoreError::Io { .. } | StoreError::Json { .. } => AppError::Internal(err.into()),
        }
    }
}

impl From<ExtractError> for AppError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::TooShort { .. } => AppError::Validation(err.to_string()),
            ExtractError::Llm(e) => e.into(),
        }
    }
}

impl From<LlmError> for AppError {
    fn from(err: LlmError) -> Self {
        AppError::Llm(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::IndexUnavailable(msg) => {
                tracing::warn!("Index unavailable: {msg}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "INDEX_UNAVAILABLE",
                    msg.clone(),
                )
            }
            AppError::EncoderNotReady => (
                StatusCode::SERVICE_UNAVAILABLE,
                "ENCODER_NOT_READY",
                "The embedding model is still loading, retry shortly".to_string(),
            ),
            AppError::Encoder(msg) => {
                tracing::error!("Encoder error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "ENCODER_ERROR",
                    "The embedding service failed".to_string(),
                )
            }
            AppError::Llm(msg) => {
                tracing::error!("LLM error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "LLM_ERROR",
                    "An AI processing error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::encoder::EncoderError;

    async fn envelope(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_search_errors_map_to_service_codes() {
        let (status, body) = envelope(SearchError::EncoderNotReady.into()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "ENCODER_NOT_READY");

        let (status, body) =
            envelope(SearchError::IndexUnavailable("missing: cv_labels.json".into()).into()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "INDEX_UNAVAILABLE");
        assert_eq!(body["error"]["message"], "missing: cv_labels.json");

        let encoder_err = SearchError::Encoder(EncoderError::EmptyVector);
        let (status, body) = envelope(encoder_err.into()).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], "ENCODER_ERROR");
    }

    #[tokio::test]
    async fn test_store_errors_map_to_client_codes() {
        let (status, _) = envelope(StoreError::AlreadyExists("mario_rossi".into()).into()).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = envelope(StoreError::NotFound("x".into()).into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");

        let (status, _) = envelope(StoreError::InvalidId("../x".into()).into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_internal_details_are_not_leaked() {
        let (status, body) = envelope(AppError::Internal(anyhow::anyhow!("disk on fire"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["message"], "An internal server error occurred");
    }
}
