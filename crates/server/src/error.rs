//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use terrapin_metadata::StoreError;
use terrapin_mirror::MirrorError;
use terrapin_storage::ArchiveError;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("locked: {0}")]
    Locked(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("mirror error: {0}")]
    Mirror(#[from] MirrorError),

    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("metadata error: {0}")]
    Store(#[from] StoreError),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::Locked(_) => "locked",
            Self::Internal(_) => "internal_error",
            Self::Mirror(e) => {
                if e.is_not_found() {
                    "not_found"
                } else {
                    match e {
                        MirrorError::Upstream(_) => "upstream_unavailable",
                        _ => "mirror_error",
                    }
                }
            }
            Self::Archive(e) => match e {
                ArchiveError::ShasumMismatch { .. } => "integrity_error",
                ArchiveError::Upstream(_)
                | ArchiveError::UnexpectedStatus { .. }
                | ArchiveError::TruncatedRange { .. } => "upstream_unavailable",
                _ => "archive_error",
            },
            Self::Store(e) => {
                if e.is_miss() {
                    "not_found"
                } else {
                    "metadata_error"
                }
            }
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Locked(_) => StatusCode::LOCKED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Mirror(e) => {
                if e.is_not_found() {
                    StatusCode::NOT_FOUND
                } else {
                    match e {
                        MirrorError::Upstream(_) => StatusCode::BAD_GATEWAY,
                        _ => StatusCode::INTERNAL_SERVER_ERROR,
                    }
                }
            }
            Self::Archive(e) => match e {
                // A downloaded archive that fails its shasum is upstream
                // misbehavior, not a mirror fault.
                ArchiveError::ShasumMismatch { .. } => StatusCode::BAD_GATEWAY,
                ArchiveError::Upstream(_)
                | ArchiveError::UnexpectedStatus { .. }
                | ArchiveError::TruncatedRange { .. } => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Store(e) => {
                if e.is_miss() {
                    StatusCode::NOT_FOUND
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_signals_map_to_not_found() {
        let err = ApiError::Mirror(MirrorError::Store(StoreError::VersionNotFound));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn integrity_failures_map_to_bad_gateway() {
        let err = ApiError::Archive(ArchiveError::ShasumMismatch {
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.code(), "integrity_error");
    }

    #[test]
    fn locked_maps_to_423() {
        let err = ApiError::Locked("previous sync is not finished".to_string());
        assert_eq!(err.status_code(), StatusCode::LOCKED);
    }
}
