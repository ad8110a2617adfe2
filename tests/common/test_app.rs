//! Test application setup utilities
//!
//! Builds a small axum application standing in for the pipeline host, with
//! the security chain installed, and provides request helpers for driving it
//! through `tower::ServiceExt::oneshot`.

use std::collections::HashSet;

use axum::{
    body::{to_bytes, Body},
    http::{HeaderMap, Request, StatusCode},
    routing::get,
    Router,
};
use chrono::Utc;
use tower::ServiceExt;

use gateway_security::{
    middleware::auth,
    signing::{sorted_pairs, CanonicalPayload, CanonicalRequest},
    secure, SecurityPolicy, SecurityState,
};

pub const SHARED_SECRET: &str = "s3cr3t";
pub const TOKEN_KEY: &str = "integration-token-signing-key";
pub const ORDERS_BODY: &str = "order-1,order-2";

/// Default test policy: one fully-excluded path, one token-only path.
pub fn test_policy() -> SecurityPolicy {
    SecurityPolicy {
        excluded_auth_and_sign_paths: HashSet::from(["/public/ping".to_string()]),
        excluded_token_only_paths: HashSet::from(["/token-free/orders".to_string()]),
        excluded_misc_paths: HashSet::new(),
        shared_secret: SHARED_SECRET.to_string(),
        token_signing_key: TOKEN_KEY.to_string(),
        request_expiry_millis: 60_000,
        max_signed_body_bytes: 1024 * 1024,
    }
}

async fn list_orders() -> &'static str {
    ORDERS_BODY
}

async fn echo_body(body: String) -> String {
    body
}

async fn preflight() -> &'static str {
    "preflight-ok"
}

async fn pong() -> &'static str {
    "pong"
}

/// Test application wrapper for integration testing
pub struct TestApp {
    pub router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_policy(test_policy())
    }

    pub fn with_policy(policy: SecurityPolicy) -> Self {
        let state = SecurityState::new(policy);

        let router = Router::new()
            .route(
                "/orders",
                get(list_orders).post(echo_body).options(preflight),
            )
            .route("/token-free/orders", get(list_orders))
            .route("/public/ping", get(pong));

        Self {
            router: secure(router, state),
        }
    }

    pub async fn request(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("request failed");

        let (parts, body) = response.into_parts();
        let body = to_bytes(body, usize::MAX).await.expect("body read failed");

        TestResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        }
    }
}

/// Captured response with assertion helpers
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: bytes::Bytes,
}

impl TestResponse {
    pub fn text(&self) -> String {
        String::from_utf8(self.body.to_vec()).expect("body was not utf-8")
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("body was not json")
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
    }

    /// Assert the response is the error envelope with the given code,
    /// delivered at transport status 200.
    pub fn assert_envelope(&self, error_code: i32) {
        assert_eq!(self.status, StatusCode::OK);
        let json = self.json();
        assert_eq!(json["errorCode"], error_code, "envelope: {}", json);
        assert!(json["message"].is_string());
    }

    pub fn assert_ok_text(&self, expected: &str) {
        assert_eq!(self.status, StatusCode::OK);
        assert_eq!(self.text(), expected);
    }
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn token_for(uid: &str, app_id: &str) -> String {
    auth::issue_token(uid, app_id, 300, TOKEN_KEY).expect("token issuance failed")
}

/// Compute the signature a well-behaved caller would present for a
/// parameter-style request.
pub fn sign_params(app_id: &str, path: &str, raw_params: &str, timestamp: i64) -> String {
    CanonicalRequest {
        app_id: app_id.to_string(),
        path: path.to_string(),
        payload: CanonicalPayload::Params(sorted_pairs(raw_params)),
        timestamp: timestamp.to_string(),
    }
    .sign(SHARED_SECRET)
    .expect("signing failed")
}

/// Compute the signature for a raw-body request.
pub fn sign_raw(app_id: &str, path: &str, body: &str, timestamp: i64) -> String {
    CanonicalRequest {
        app_id: app_id.to_string(),
        path: path.to_string(),
        payload: CanonicalPayload::Raw(body.to_string()),
        timestamp: timestamp.to_string(),
    }
    .sign(SHARED_SECRET)
    .expect("signing failed")
}

/// Builder for fully-credentialed requests against the test app.
pub struct SignedRequest {
    method: String,
    path: String,
    query: Option<String>,
    body: Option<(String, String)>,
    uid: String,
    app_id: String,
    timestamp: i64,
    sign: Option<String>,
    extra: Vec<(String, String)>,
    omit_token: bool,
}

impl SignedRequest {
    pub fn get(path: &str) -> Self {
        Self::new("GET", path)
    }

    pub fn post(path: &str) -> Self {
        Self::new("POST", path)
    }

    pub fn method(method: &str, path: &str) -> Self {
        Self::new(method, path)
    }

    fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            query: None,
            body: None,
            uid: "u1".to_string(),
            app_id: "app1".to_string(),
            timestamp: now_millis(),
            sign: None,
            extra: Vec::new(),
            omit_token: false,
        }
    }

    /// Raw query string, preserved in the order given.
    pub fn query(mut self, query: &str) -> Self {
        self.query = Some(query.to_string());
        self
    }

    pub fn body(mut self, content_type: &str, body: &str) -> Self {
        self.body = Some((content_type.to_string(), body.to_string()));
        self
    }

    pub fn identity(mut self, uid: &str, app_id: &str) -> Self {
        self.uid = uid.to_string();
        self.app_id = app_id.to_string();
        self
    }

    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn sign(mut self, sign: &str) -> Self {
        self.sign = Some(sign.to_string());
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.extra.push((name.to_string(), value.to_string()));
        self
    }

    pub fn without_token(mut self) -> Self {
        self.omit_token = true;
        self
    }

    /// Compute the correct signature from the request's own fields.
    pub fn signed(mut self) -> Self {
        let sign = match &self.body {
            Some((content_type, body)) if self.method == "POST" => {
                if content_type.starts_with("application/x-www-form-urlencoded") {
                    sign_params(&self.app_id, &self.path, body, self.timestamp)
                } else {
                    sign_raw(&self.app_id, &self.path, body, self.timestamp)
                }
            }
            _ => sign_params(
                &self.app_id,
                &self.path,
                self.query.as_deref().unwrap_or(""),
                self.timestamp,
            ),
        };
        self.sign = Some(sign);
        self
    }

    pub fn build(self) -> Request<Body> {
        let uri = match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        };

        let mut builder = Request::builder()
            .method(self.method.as_str())
            .uri(uri)
            .header(auth::UID_HEADER, &self.uid)
            .header(auth::APP_ID_HEADER, &self.app_id)
            .header("appId", &self.app_id)
            .header("timestamp", self.timestamp.to_string());

        if !self.omit_token {
            builder = builder.header(
                auth::ACCESS_TOKEN_HEADER,
                token_for(&self.uid, &self.app_id),
            );
        }
        if let Some(sign) = &self.sign {
            builder = builder.header("sign", sign);
        }
        for (name, value) in &self.extra {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let body = match self.body {
            Some((content_type, body)) => {
                builder = builder.header("Content-Type", content_type);
                Body::from(body)
            }
            None => Body::empty(),
        };

        builder.body(body).expect("request build failed")
    }
}
