use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::Error;

/// API error that converts to a proper HTTP response with a compact
/// JSON `{error}` body.
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn range_not_satisfiable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::RANGE_NOT_SATISFIABLE,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match &err {
            Error::NotFound(what) => ApiError::not_found(format!("not found: {what}")),
            Error::InvalidPath(_) | Error::Validation(_) | Error::InvalidTokenFormat => {
                ApiError::bad_request(err.to_string())
            }
            Error::Unauthorized | Error::TokenExpired => ApiError {
                status: StatusCode::UNAUTHORIZED,
                message: err.to_string(),
            },
            Error::Forbidden => ApiError {
                status: StatusCode::FORBIDDEN,
                message: err.to_string(),
            },
            // IO-class failures always name the offending key in the message.
            Error::Storage { .. } | Error::Io(_) | Error::Database(_) => {
                ApiError::internal(err.to_string())
            }
            _ => ApiError::internal(err.to_string()),
        }
    }
}

impl From<crate::auth::AuthError> for ApiError {
    fn from(err: crate::auth::AuthError) -> Self {
        use crate::auth::AuthError;
        let (status, message) = match err {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidScheme => (StatusCode::UNAUTHORIZED, "Invalid authorization scheme"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token"),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "Token expired"),
            AuthError::NotAdmin => (StatusCode::FORBIDDEN, "Admin access required"),
            AuthError::InsufficientScope => (StatusCode::FORBIDDEN, "Insufficient token scope"),
            AuthError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };
        ApiError {
            status,
            message: message.to_string(),
        }
    }
}

/// Extension trait for converting store/storage results into API errors.
pub trait ResultExt<T> {
    fn api_err(self) -> Result<T, ApiError>;
}

impl<T> ResultExt<T> for crate::error::Result<T> {
    fn api_err(self) -> Result<T, ApiError> {
        self.map_err(ApiError::from)
    }
}

/// Extension for Option values resolved from the store.
pub trait OptionExt<T> {
    fn or_not_found(self, message: &'static str) -> Result<T, ApiError>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, message: &'static str) -> Result<T, ApiError> {
        self.ok_or_else(|| ApiError::not_found(message))
    }
}
