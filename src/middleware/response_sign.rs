//! Response-signing filter
//!
//! When the caller opts in via the `ResponseEncrypt` request header, the
//! filter intercepts the outgoing body stream, realizes it (bounded by the
//! policy's body cap), computes an HMAC-SHA256 over
//! `timestamp=<request timestamp><body>`, and attaches the result as the
//! `sign` response header. The payload itself reaches the caller unchanged;
//! the signature travels out-of-band.
//!
//! End-to-end signing requires the complete body before finalizing, so the
//! body is accumulated in memory up to `max_signed_body_bytes` and the filter
//! fails closed above that cap instead of buffering without bound.

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{
        header::{CONTENT_LENGTH, TRANSFER_ENCODING},
        HeaderValue,
    },
    middleware::Next,
    response::Response,
};

use crate::middleware::request_sign::{SIGN_HEADER, TIMESTAMP_HEADER};
use crate::signing::hmac_sha256_hex;
use crate::utils::error::{SecurityError, SecurityResult};
use crate::SecurityState;

/// Opt-in request header: 0 (default) passes the response through untouched,
/// any other integer requests a signed response.
pub const RESPONSE_ENCRYPT_HEADER: &str = "ResponseEncrypt";

/// Response signature filter stage.
pub async fn response_sign_filter(
    State(state): State<SecurityState>,
    request: Request,
    next: Next,
) -> SecurityResult<Response> {
    let path = request.uri().path().to_string();

    let opt_in = match request.headers().get(RESPONSE_ENCRYPT_HEADER) {
        None => 0,
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<i32>().ok())
            .ok_or_else(|| {
                SecurityError::Unclassified("malformed ResponseEncrypt header".to_string())
            })?,
    };

    if state.policy.is_sign_exempt(&path) || opt_in == 0 {
        return Ok(next.run(request).await);
    }

    // The request timestamp is part of the signed material; absent means empty.
    let timestamp = request
        .headers()
        .get(TIMESTAMP_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string();

    let response = next.run(request).await;
    let (mut parts, body) = response.into_parts();

    // Realize the full body. A read failure here also covers the client
    // disconnecting mid-stream; it surfaces as an error return, never a panic,
    // and no further headers are written by this filter.
    let bytes = to_bytes(body, state.policy.max_signed_body_bytes)
        .await
        .map_err(|_| SecurityError::Signing)?;

    let text = std::str::from_utf8(&bytes).map_err(|_| SecurityError::Signing)?;
    let sign = hmac_sha256_hex(
        &format!("timestamp={}{}", timestamp, text),
        &state.policy.shared_secret,
    )?;

    if !parts.headers.contains_key(TRANSFER_ENCODING) {
        parts
            .headers
            .insert(CONTENT_LENGTH, HeaderValue::from(bytes.len()));
    }
    parts.headers.insert(
        SIGN_HEADER,
        HeaderValue::from_str(&sign).map_err(|_| SecurityError::Signing)?,
    );

    Ok(Response::from_parts(parts, Body::from(bytes)))
}
