use crate::db::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Errors surfaced at the request boundary.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    UnsupportedMediaType(String),
    #[error("malformed row at line {line}: {reason}")]
    MalformedRow { line: u64, reason: String },
    #[error("storage failure")]
    Storage(StoreError),
    /// Request body rejected by an extractor before reaching a service.
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::UnsupportedMediaType(_) | ApiError::MalformedRow { .. } => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Rejected { status, .. } => *status,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let ApiError::Storage(ref e) = self {
            // The cause stays in the log; clients get an opaque message.
            tracing::error!("Storage failure: {}", e);
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ForeignKey(entity) => ApiError::NotFound(entity),
            StoreError::UnknownQuestions(_) => ApiError::Validation(err.to_string()),
            other => ApiError::Storage(other),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
