//! Request-integrity filter
//!
//! Rejects stale requests via the `timestamp` header, rebuilds the caller's
//! canonical string from the request, and compares the HMAC-SHA256 of that
//! string against the `sign` header.
//!
//! For POST bodies the filter consumes the body stream once, bounded by the
//! policy's body cap, and re-installs the buffered bytes on the request so
//! that downstream stages and the routed handler can read them again.

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header::CONTENT_TYPE, Method},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use crate::signing::{sorted_pairs, CanonicalPayload, CanonicalRequest, signature_matches};
use crate::utils::error::{SecurityError, SecurityResult};
use crate::SecurityState;

/// Header carrying the caller-computed request signature.
pub const SIGN_HEADER: &str = "sign";
/// Header carrying the caller's request timestamp (epoch milliseconds).
pub const TIMESTAMP_HEADER: &str = "timestamp";
/// Header carrying the application id included in the canonical string.
pub const APP_ID_HEADER: &str = "appId";

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

fn header_string(request: &Request, name: &str) -> String {
    request
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string()
}

/// Request signature filter stage.
pub async fn request_sign_filter(
    State(state): State<SecurityState>,
    request: Request,
    next: Next,
) -> SecurityResult<Response> {
    let path = request.uri().path().to_string();
    if state.policy.is_sign_exempt(&path) {
        return Ok(next.run(request).await);
    }

    // Replay window first: a stale timestamp rejects the request before any
    // method dispatch, OPTIONS included.
    let timestamp = header_string(&request, TIMESTAMP_HEADER);
    let ts_millis: i64 = timestamp.parse().map_err(|_| {
        SecurityError::Unclassified("missing or malformed timestamp header".to_string())
    })?;
    // checked_sub: a timestamp near i64::MIN would overflow the age
    // computation; such a value is far outside any replay window.
    let age = Utc::now().timestamp_millis().checked_sub(ts_millis);
    match age {
        Some(age) if age <= state.policy.request_expiry_millis => {}
        _ => return Err(SecurityError::ExpiredRequest),
    }

    let presented = header_string(&request, SIGN_HEADER);
    let app_id = header_string(&request, APP_ID_HEADER);
    let method = request.method().clone();

    let (payload, request) = if method == Method::GET {
        let payload =
            CanonicalPayload::Params(sorted_pairs(request.uri().query().unwrap_or("")));
        (payload, request)
    } else if method == Method::POST {
        // Consume the body once, bounded, then re-expose it downstream.
        let (parts, body) = request.into_parts();
        let bytes = to_bytes(body, state.policy.max_signed_body_bytes)
            .await
            .map_err(|_| SecurityError::Signing)?;

        let content_type = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");

        let text = std::str::from_utf8(&bytes).map_err(|_| SecurityError::Signing)?;
        let payload = if content_type.starts_with(FORM_URLENCODED) {
            CanonicalPayload::Params(sorted_pairs(text))
        } else {
            CanonicalPayload::Raw(text.to_string())
        };

        (payload, Request::from_parts(parts, Body::from(bytes)))
    } else if method == Method::OPTIONS {
        // Pre-flight exemption: no signature required.
        return Ok(next.run(request).await);
    } else {
        return Err(SecurityError::UnsupportedMethod);
    };

    let canonical = CanonicalRequest {
        app_id,
        path,
        payload,
        timestamp,
    };
    let expected = canonical.sign(&state.policy.shared_secret)?;

    if signature_matches(&expected, &presented) {
        tracing::debug!(method = %method, "request signature verified");
        Ok(next.run(request).await)
    } else {
        Err(SecurityError::SignatureMismatch)
    }
}
