//! Unified error handling for the configurator.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use mood_core::CatalogError;

use crate::claude::ClaudeError;
use crate::presentation::SessionError;
use crate::services::{ChatError, HistoryError};

/// Application-level error type for the configurator.
#[derive(Debug, Error)]
pub enum AppError {
    /// Chat request failed before streaming.
    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),

    /// Session transition was rejected.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Claude API operation failed.
    #[error("Claude error: {0}")]
    Claude(#[from] ClaudeError),

    /// Catalog failed to load.
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<HistoryError> for AppError {
    fn from(err: HistoryError) -> Self {
        Self::Chat(ChatError::History(err))
    }
}

/// JSON error body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Chat(ChatError::History(_)) | Self::Session(SessionError::EmptyMessage) => {
                StatusCode::BAD_REQUEST
            }
            Self::Session(SessionError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Session(SessionError::Busy) => StatusCode::CONFLICT,
            Self::Chat(ChatError::Claude(_)) | Self::Claude(_) => StatusCode::BAD_GATEWAY,
            Self::Catalog(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Log server errors with Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Configurator request error"
            );
        }

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Catalog(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::Chat(ChatError::Claude(_)) | Self::Claude(_) => {
                "Model provider error".to_string()
            }
            _ => self.to_string(),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
