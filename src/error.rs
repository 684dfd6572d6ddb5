//! Handler-facing error type.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{guard, models::MessageResponse, repository::RepositoryError};

#[derive(Debug, Error)]
pub enum ApiError {
    /// Client input failed validation; the message is shown verbatim.
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// The principal passed the guard but lacks the role a page requires.
    #[error("insufficient role")]
    InsufficientRole,

    /// Data-store failure. The public message replaces the underlying error.
    #[error("{message}: {source}")]
    Repository {
        message: &'static str,
        #[source]
        source: RepositoryError,
    },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    /// Wraps a store error with the message the client should see.
    pub fn store(message: &'static str) -> impl FnOnce(RepositoryError) -> Self {
        move |source| ApiError::Repository { message, source }
    }

    /// Like [`ApiError::store`], but a unique-constraint hit is the client's fault and is
    /// answered with `duplicate` as a 400.
    pub fn store_unique(
        message: &'static str,
        duplicate: &'static str,
    ) -> impl FnOnce(RepositoryError) -> Self {
        move |source| match source {
            RepositoryError::Duplicate => ApiError::bad_request(duplicate),
            source => ApiError::Repository { message, source },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(MessageResponse::new(message))).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(MessageResponse::new(message))).into_response()
            }
            // Same behavior as a dashboard page the role cannot see: back to the dashboard.
            ApiError::InsufficientRole => guard::found(guard::ADMIN_ROOT),
            ApiError::Repository { message, source } => {
                tracing::error!(error = %source, "{message}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(MessageResponse::new(message)),
                )
                    .into_response()
            }
        }
    }
}
