//! Bearer-token authentication filter
//!
//! Verifies the `X-AccessToken` JWT and checks that the identity it carries
//! matches the `X-Uid`/`X-AppId` request headers. Token expiry is consulted
//! only when the identity already mismatches: a mismatched, expired token is
//! reported as expired, a mismatched live token as invalid, and a matching
//! token passes regardless of expiry. This precedence is deliberate and
//! preserved from the upstream security policy.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{
    config::SecurityPolicy,
    utils::error::{SecurityError, SecurityResult},
    SecurityState,
};

/// Header carrying the bearer token.
pub const ACCESS_TOKEN_HEADER: &str = "X-AccessToken";
/// Header carrying the caller's user id; must match the token claim.
pub const UID_HEADER: &str = "X-Uid";
/// Header carrying the caller's application id; must match the token claim.
pub const APP_ID_HEADER: &str = "X-AppId";

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Caller user id
    #[serde(rename = "X-Uid")]
    pub uid: String,
    /// Caller application id
    #[serde(rename = "X-AppId")]
    pub app_id: String,
    /// Expiration timestamp (seconds since epoch)
    pub exp: i64,
}

/// Verified caller identity, injected into request extensions for
/// downstream stages and handlers.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub uid: String,
    pub app_id: String,
}

/// Create a signed access token for the given identity.
pub fn issue_token(
    uid: &str,
    app_id: &str,
    ttl_secs: i64,
    signing_key: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let exp = (Utc::now() + Duration::seconds(ttl_secs)).timestamp();
    let claims = Claims {
        uid: uid.to_string(),
        app_id: app_id.to_string(),
        exp,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(signing_key.as_bytes()),
    )
}

/// Verify a token's signature and extract its claims.
///
/// Expiry validation is disabled at the JWT layer; the auth check consults
/// `exp` manually, and only in the identity-mismatch branch.
pub fn decode_token(token: &str, signing_key: &str) -> Result<Claims, SecurityError> {
    let mut validation = Validation::default();
    validation.validate_exp = false;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(signing_key.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| SecurityError::InvalidToken)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

/// Run the token and identity-consistency checks against request headers.
pub(crate) fn authorize(
    headers: &HeaderMap,
    policy: &SecurityPolicy,
) -> Result<CallerIdentity, SecurityError> {
    let token = header_str(headers, ACCESS_TOKEN_HEADER);
    let claims = decode_token(token, &policy.token_signing_key)?;

    let uid = header_str(headers, UID_HEADER);
    let app_id = header_str(headers, APP_ID_HEADER);

    if claims.uid.eq_ignore_ascii_case(uid) && claims.app_id.eq_ignore_ascii_case(app_id) {
        Ok(CallerIdentity {
            uid: claims.uid,
            app_id: claims.app_id,
        })
    } else if Utc::now().timestamp() > claims.exp {
        Err(SecurityError::ExpiredToken)
    } else {
        Err(SecurityError::InvalidToken)
    }
}

/// Authentication filter stage.
///
/// Paths in any exclusion tier pass through unchanged. Otherwise the caller
/// must present a verifiable token whose identity matches the request
/// headers; the verified [`CallerIdentity`] is injected into request
/// extensions.
pub async fn auth_filter(
    State(state): State<SecurityState>,
    mut request: Request,
    next: Next,
) -> SecurityResult<Response> {
    let path = request.uri().path().to_string();
    if state.policy.is_auth_exempt(&path) {
        return Ok(next.run(request).await);
    }

    let identity = authorize(request.headers(), &state.policy)?;
    tracing::debug!(uid = %identity.uid, app_id = %identity.app_id, "caller authenticated");
    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}
