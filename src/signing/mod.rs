//! Canonical request serialization and keyed-hash signing.
//!
//! Signer and verifier must compute the same string for the same logical
//! request, regardless of the order parameters arrived in on the wire. The
//! canonical form sorts parameters lexicographically by key and keeps the
//! first value of any repeated key.

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::utils::error::SecurityError;

type HmacSha256 = Hmac<Sha256>;

/// Payload portion of a canonical request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalPayload {
    /// Sorted `key=value` pairs from a query string or form body.
    Params(Vec<(String, String)>),
    /// Raw decoded body text for non-form content types.
    Raw(String),
}

/// Deterministic serialization of the signed request fields.
#[derive(Debug, Clone)]
pub struct CanonicalRequest {
    pub app_id: String,
    pub path: String,
    pub payload: CanonicalPayload,
    pub timestamp: String,
}

impl CanonicalRequest {
    /// Render the canonical string:
    /// `appId=<appId><path><params or raw body>timestamp=<timestamp>`.
    ///
    /// Parameter payloads are joined as `&key=value` with the leading
    /// separator stripped; an empty parameter set contributes nothing.
    pub fn canonical_string(&self) -> String {
        let payload = match &self.payload {
            CanonicalPayload::Params(pairs) => {
                let mut joined = String::new();
                for (key, value) in pairs {
                    joined.push('&');
                    joined.push_str(key);
                    joined.push('=');
                    joined.push_str(value);
                }
                if !joined.is_empty() {
                    joined.remove(0);
                }
                joined
            }
            CanonicalPayload::Raw(text) => text.clone(),
        };

        format!(
            "appId={}{}{}timestamp={}",
            self.app_id, self.path, payload, self.timestamp
        )
    }

    /// Sign the canonical string with the shared secret.
    pub fn sign(&self, shared_secret: &str) -> Result<String, SecurityError> {
        hmac_sha256_hex(&self.canonical_string(), shared_secret)
    }
}

/// Parse a query string or form-urlencoded body into canonical parameter
/// pairs: percent-decoded, `+` treated as space, sorted by key, first value
/// wins for repeated keys.
pub fn sorted_pairs(raw: &str) -> Vec<(String, String)> {
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for pair in raw.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(key);
        let value = decode_component(value);
        map.entry(key).or_insert(value);
    }
    map.into_iter().collect()
}

fn decode_component(component: &str) -> String {
    let spaced = component.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// HMAC-SHA256 over `message` with `secret`, hex-encoded.
pub fn hmac_sha256_hex(message: &str, secret: &str) -> Result<String, SecurityError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SecurityError::Signing)?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Case-insensitive signature comparison. Presented signatures may arrive in
/// either hex case.
pub fn signature_matches(expected: &str, presented: &str) -> bool {
    expected.eq_ignore_ascii_case(presented)
}
