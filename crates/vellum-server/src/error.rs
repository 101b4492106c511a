use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use vellum_engine::EngineError;
use vellum_search::SearchError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// HTTP status and a stable machine-readable kind.
    pub fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::AuthFailed(_) => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            Self::Engine(e) => match e {
                EngineError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation"),
                EngineError::Unauthorized(_) => (StatusCode::FORBIDDEN, "unauthorized"),
                EngineError::QuotaExceeded(_) => (StatusCode::TOO_MANY_REQUESTS, "quota_exceeded"),
                EngineError::ContentRejected(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "content_rejected")
                }
                EngineError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                EngineError::UnknownType(_) => (StatusCode::BAD_REQUEST, "unknown_type"),
                EngineError::BatchTooLarge { .. } => {
                    (StatusCode::PAYLOAD_TOO_LARGE, "batch_too_large")
                }
                EngineError::Transaction { .. } => (StatusCode::CONFLICT, "transaction_failed"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            },
            Self::Search(e) => match e {
                SearchError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
                SearchError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                SearchError::Unauthorized(_) => (StatusCode::FORBIDDEN, "unauthorized"),
                SearchError::Engine(EngineError::UnknownType(_)) => {
                    (StatusCode::BAD_REQUEST, "unknown_type")
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            },
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, kind) = self.classify();
        if status.is_server_error() {
            tracing::warn!(error = %self, "request failed");
        }
        let mut body = json!({"error": {"kind": kind, "message": self.to_string()}});
        if let Self::Engine(EngineError::Validation(fields)) = &self {
            body["error"]["fields"] = json!(fields);
        }
        (status, Json(body)).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
