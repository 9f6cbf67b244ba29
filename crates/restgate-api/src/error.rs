//! API error types and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use restgate_common::GatewayError;

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors surfaced to HTTP clients
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A driver error that carries a MySQL error number; surfaced as 400
    /// with the code in the payload
    #[error("Driver error {code}: {message}")]
    Driver { code: u32, message: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not acceptable: {0}")]
    NotAcceptable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Driver { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            ApiError::Driver { code, message } => json!({
                "code": code,
                "message": message,
            }),
            other => json!({
                "error": other.to_string(),
            }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Validation(msg)
            | GatewayError::CompositeKey(msg)
            | GatewayError::Query(msg) => ApiError::BadRequest(msg),
            GatewayError::Conflict { code, message }
            | GatewayError::ForeignKey { code, message }
            | GatewayError::Driver { code, message } => ApiError::Driver { code, message },
            GatewayError::AuthMissing => {
                ApiError::Unauthorized("authentication required".to_string())
            }
            GatewayError::AuthInvalid(msg) => ApiError::Unauthorized(msg),
            GatewayError::NotFound(msg) => ApiError::NotFound(msg),
            other => ApiError::Internal(format!("internal server error: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Driver {
                code: 1062,
                message: "dup".into()
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Unauthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::NotAcceptable("x".into()).status_code(),
            StatusCode::NOT_ACCEPTABLE
        );
        assert_eq!(
            ApiError::Internal("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_gateway_error_mapping() {
        let err: ApiError = GatewayError::CompositeKey("arity".into()).into();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let err: ApiError = GatewayError::Conflict {
            code: 1062,
            message: "dup".into(),
        }
        .into();
        assert!(matches!(err, ApiError::Driver { code: 1062, .. }));

        let err: ApiError = GatewayError::AuthMissing.into();
        assert!(matches!(err, ApiError::Unauthorized(_)));

        let err: ApiError = GatewayError::Database("boom".into()).into();
        assert!(matches!(err, ApiError::Internal(_)));
    }
}
