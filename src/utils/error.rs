//! Error taxonomy and the uniform error envelope.
//!
//! Every failure raised by the filter chain (or by the hosted pipeline) is
//! normalized into one JSON shape: `{"errorCode": <int>, "message": <string>}`
//! rendered at transport status 200. Callers distinguish success from failure
//! via `errorCode`, never via the HTTP status line.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tower::BoxError;
use tracing::{error, warn};

/// Stable numeric error codes carried in the envelope.
pub mod codes {
    /// Generic failure for unclassified faults.
    pub const FAILED: i32 = 10000;
    pub const INVALID_TOKEN: i32 = 10001;
    pub const EXPIRED_TOKEN: i32 = 10002;
    pub const EXPIRED_REQUEST: i32 = 10003;
    pub const SIGNATURE_MISMATCH: i32 = 10004;
    pub const UNSUPPORTED_METHOD: i32 = 10005;
    pub const NOT_FOUND: i32 = 10006;
    pub const INTERNAL_SIGNING: i32 = 10007;
}

/// Classified failures raised by the security filter chain.
///
/// The set is closed: every variant maps to a stable error code, and anything
/// outside the taxonomy travels as [`SecurityError::Unclassified`]. Classified
/// errors are caller-fault conditions and are never retried.
#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("invalid access token")]
    InvalidToken,

    #[error("access token has expired")]
    ExpiredToken,

    #[error("request timestamp is outside the allowed window")]
    ExpiredRequest,

    #[error("request signature mismatch")]
    SignatureMismatch,

    #[error("http method is not supported for signed requests")]
    UnsupportedMethod,

    #[error("no route matched the request path")]
    NotFound,

    /// Internal signing fault. The message is deliberately generic so that
    /// no body text leaks into error responses.
    #[error("internal signing error")]
    Signing,

    #[error("{0}")]
    Unclassified(String),
}

impl SecurityError {
    /// Total classification: every variant has a stable code.
    pub fn error_code(&self) -> i32 {
        match self {
            SecurityError::InvalidToken => codes::INVALID_TOKEN,
            SecurityError::ExpiredToken => codes::EXPIRED_TOKEN,
            SecurityError::ExpiredRequest => codes::EXPIRED_REQUEST,
            SecurityError::SignatureMismatch => codes::SIGNATURE_MISMATCH,
            SecurityError::UnsupportedMethod => codes::UNSUPPORTED_METHOD,
            SecurityError::NotFound => codes::NOT_FOUND,
            SecurityError::Signing => codes::INTERNAL_SIGNING,
            SecurityError::Unclassified(_) => codes::FAILED,
        }
    }
}

/// The single error response shape.
#[derive(Serialize, Debug)]
pub struct ErrorEnvelope {
    #[serde(rename = "errorCode")]
    pub error_code: i32,
    pub message: String,
}

impl ErrorEnvelope {
    pub fn new(error_code: i32, message: impl Into<String>) -> Self {
        Self {
            error_code,
            message: message.into(),
        }
    }
}

impl IntoResponse for SecurityError {
    fn into_response(self) -> Response {
        let code = self.error_code();
        match &self {
            SecurityError::Signing | SecurityError::Unclassified(_) => {
                error!(error = %self, error_code = code, "request failed");
            }
            _ => {
                warn!(error = %self, error_code = code, "request rejected");
            }
        }

        let body = ErrorEnvelope::new(code, self.to_string());

        // Transport status stays 200; the classification lives in errorCode.
        (StatusCode::OK, Json(body)).into_response()
    }
}

/// Terminal failure handler for the chain.
///
/// The host installs this at the boundary where pipeline errors surface. A
/// [`SecurityError`] renders its own envelope; anything else is reported with
/// the generic code and its raw message. The host must only invoke this
/// before the response has been committed; once headers are written the
/// original failure propagates untouched.
pub async fn normalize_error(err: BoxError) -> Response {
    match err.downcast::<SecurityError>() {
        Ok(classified) => (*classified).into_response(),
        Err(other) => SecurityError::Unclassified(other.to_string()).into_response(),
    }
}

/// Router fallback producing the not-found envelope.
pub async fn not_found() -> Response {
    SecurityError::NotFound.into_response()
}

/// Result type alias for filter stages.
pub type SecurityResult<T> = Result<T, SecurityError>;
