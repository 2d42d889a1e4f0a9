// Request-level error taxonomy and HTTP mapping
//
// Components log the specific cause; the wire only ever sees the
// normalized code and, for rate limiting, the retry hint.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::protocol::ErrorResponse;

/// Errors a request handler can surface to the client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("malformed request")]
    MalformedRequest,
    /// Covers bad A, wrong M1, and expired or missing handshake state
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error("missing credential")]
    MissingCredential,
    #[error("malformed credential")]
    MalformedCredential,
    #[error("invalid credential")]
    InvalidCredential,
    #[error("expired credential")]
    ExpiredCredential,
    #[error("rate limited")]
    RateLimited { retry_after_seconds: u64 },
    #[error("session limit exceeded")]
    SessionLimitExceeded,
    #[error("shutting down")]
    ShuttingDown,
    #[error("internal error")]
    Internal,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::MalformedRequest => StatusCode::BAD_REQUEST,
            ApiError::AuthenticationFailed
            | ApiError::MissingCredential
            | ApiError::MalformedCredential
            | ApiError::InvalidCredential
            | ApiError::ExpiredCredential => StatusCode::UNAUTHORIZED,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::SessionLimitExceeded | ApiError::ShuttingDown => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MalformedRequest => "malformed_request",
            ApiError::AuthenticationFailed => "authentication_failed",
            ApiError::MissingCredential => "missing_credential",
            ApiError::MalformedCredential => "malformed_credential",
            ApiError::InvalidCredential => "invalid_credential",
            ApiError::ExpiredCredential => "expired_credential",
            ApiError::RateLimited { .. } => "rate_limit_exceeded",
            ApiError::SessionLimitExceeded => "session_limit_exceeded",
            ApiError::ShuttingDown => "shutting_down",
            ApiError::Internal => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            error: self.code().to_string(),
            retry_after_seconds: match &self {
                ApiError::RateLimited { retry_after_seconds } => Some(*retry_after_seconds),
                _ => None,
            },
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::RateLimited { retry_after_seconds } = self {
            if let Ok(value) = retry_after_seconds.to_string().parse() {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
