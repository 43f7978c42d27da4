//! Error types for wos-core
//!
//! Domain errors map to HTTP by category: validation 400, missing object or
//! session 451, missing pin selector 452, everything else 500.

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Not-found status used by the object API
pub const STATUS_NOT_FOUND: u16 = 451;
/// Pinned arc whose pin selector matched nothing
pub const STATUS_PIN_NOT_FOUND: u16 = 452;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Object, session or arc selector not found (451)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// wos-common error, mapped by category
    #[error(transparent)]
    Common(#[from] wos_common::Error),
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(format!("malformed multipart body: {}", err))
    }
}

impl ApiError {
    fn parts(&self) -> (u16, &'static str) {
        use wos_common::Error as E;
        match self {
            ApiError::NotFound(_) => (STATUS_NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (400, "BAD_REQUEST"),
            ApiError::Internal(_) => (500, "INTERNAL_ERROR"),
            ApiError::Common(err) => match err {
                E::Validation(_) => (400, "BAD_REQUEST"),
                E::NotFound(_) => (STATUS_NOT_FOUND, "NOT_FOUND"),
                E::ArcNotFound(_) => (STATUS_NOT_FOUND, "ARC_NOT_FOUND"),
                E::PinNotFound(_) => (STATUS_PIN_NOT_FOUND, "PIN_NOT_FOUND"),
                E::Resource(_) => (500, "RESOURCE_ERROR"),
                E::Store(_) => (500, "STORE_ERROR"),
                E::Database(_) => (500, "DATABASE_ERROR"),
                E::Io(_) => (500, "IO_ERROR"),
                E::Config(_) => (500, "CONFIG_ERROR"),
                E::Internal(_) => (500, "INTERNAL_ERROR"),
            },
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::NotFound(msg) | ApiError::BadRequest(msg) | ApiError::Internal(msg) => {
                msg.clone()
            }
            ApiError::Common(err) => err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, error_code) = self.parts();
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = self.message();

        if status.is_server_error() {
            error!(code = error_code, error = %message, "Request failed");
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use wos_common::Error;

    fn status_of(err: ApiError) -> u16 {
        err.into_response().status().as_u16()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_of(Error::Validation("x".into()).into()), 400);
        assert_eq!(status_of(Error::NotFound("x".into()).into()), 451);
        assert_eq!(status_of(Error::ArcNotFound("x".into()).into()), 451);
        assert_eq!(status_of(Error::PinNotFound("x".into()).into()), 452);
        assert_eq!(status_of(Error::Store("x".into()).into()), 500);
        assert_eq!(status_of(Error::Resource("x".into()).into()), 500);
        assert_eq!(status_of(ApiError::BadRequest("x".into())), 400);
        assert_eq!(status_of(ApiError::NotFound("x".into())), 451);
    }
}
