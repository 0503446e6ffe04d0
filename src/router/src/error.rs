//! Mapping of service failures onto HTTP responses.
//!
//! Every error body is `{"error": <kind>, "message": <text>}`. A partial purge
//! also carries `"backup"`, the artifact that still duplicates the undeleted
//! data.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::{IntervalError, StoreError};
use purger::PurgeError;
use querier::QuerierError;
use serde_json::json;
use thiserror::Error;
use writer::WriterError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Input(#[from] IntervalError),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    BackupWriteFailed(String),

    #[error("{message}")]
    PartialPurge { backup: String, message: String },

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Input(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Store(_)
            | ApiError::BackupWriteFailed(_)
            | ApiError::PartialPurge { .. }
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Input(IntervalError::InvalidGranularity(_)) => "invalid_granularity",
            ApiError::Input(IntervalError::InvalidValue(_)) => "invalid_value",
            ApiError::Input(_) => "invalid_range",
            ApiError::NotFound(_) => "not_found",
            ApiError::Store(StoreError::Corrupt { .. }) => "store_corrupt",
            ApiError::Store(_) => "store_unavailable",
            ApiError::BackupWriteFailed(_) => "backup_write_failed",
            ApiError::PartialPurge { .. } => "partial_purge",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl From<QuerierError> for ApiError {
    fn from(err: QuerierError) -> Self {
        match err {
            QuerierError::Interval(e) => ApiError::Input(e),
            QuerierError::QueryFailed(e) => ApiError::Store(e),
        }
    }
}

impl From<WriterError> for ApiError {
    fn from(err: WriterError) -> Self {
        match err {
            WriterError::Store(e) => ApiError::Store(e),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<PurgeError> for ApiError {
    fn from(err: PurgeError) -> Self {
        let message = err.to_string();
        match err {
            PurgeError::Interval(e) => ApiError::Input(e),
            PurgeError::Store(e) => ApiError::Store(e),
            PurgeError::BackupWriteFailed(_) => ApiError::BackupWriteFailed(message),
            PurgeError::PartialPurge { artifact, .. } => ApiError::PartialPurge {
                backup: artifact.path,
                message,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "Request failed");
        }

        let body = match &self {
            ApiError::PartialPurge { backup, message } => json!({
                "error": self.kind(),
                "message": message,
                "backup": backup,
            }),
            other => json!({
                "error": other.kind(),
                "message": other.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}
