use super::protocol::ErrorResponse;
use crate::index::service::IndexError;
use crate::presence::types::RegistryError;
use crate::storage::cache::CacheError;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Request-level failure, rendered as `{ "error": ... }` with a matching status.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CacheError> for ApiError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::InvalidFilename(_) => ApiError::BadRequest(e.to_string()),
            CacheError::NotFound(_) => ApiError::NotFound(e.to_string()),
            CacheError::Io { .. } => {
                tracing::error!("Local storage failure: {}", e);
                ApiError::Internal("local storage failure".to_string())
            }
        }
    }
}

impl From<IndexError> for ApiError {
    fn from(e: IndexError) -> Self {
        ApiError::Unavailable(e.to_string())
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        ApiError::Unavailable(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed ({}): {}", status, self);
        } else {
            tracing::debug!("Request rejected ({}): {}", status, self);
        }

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::types::BackendError;

    #[test]
    fn test_error_status_mapping() {
        let invalid: ApiError = CacheError::InvalidFilename("..".into()).into();
        let missing: ApiError = CacheError::NotFound("a.txt".into()).into();
        let index: ApiError = IndexError::Backend(BackendError::unavailable("down")).into();

        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(index.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_io_error_hides_storage_path() {
        let io = CacheError::Io {
            path: "/srv/phile/data/peer-1/a.txt".into(),
            source: std::io::Error::other("disk full"),
        };

        let error: ApiError = io.into();

        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!error.to_string().contains("/srv/phile"));
    }
}
