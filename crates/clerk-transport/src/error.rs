//! API error type and its HTTP rendering.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use clerk_core::SessionError;
use clerk_store::{DocumentError, StoreError};
use serde_json::json;
use thiserror::Error;

/// Error returned by a handler; rendered as `{"detail": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
}

impl ApiError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Session(SessionError::NotFound(_))
            | Self::Document(DocumentError::NotFound { .. } | DocumentError::MissingDirectory(_))
            | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Session(_) => StatusCode::CONFLICT,
            Self::BadRequest(_)
            | Self::Document(
                DocumentError::InvalidName(_)
                | DocumentError::NotAFile(_)
                | DocumentError::Unsupported { .. },
            ) => StatusCode::BAD_REQUEST,
            Self::Store(_) | Self::Document(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, %status, "request rejected");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
