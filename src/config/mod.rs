//! Security policy configuration
//!
//! YAML-based policy loading with support for:
//! - Environment variable overrides (prefixed with `GATEWAY_SECURITY_`)
//! - Multiple configuration file locations
//! - Default values for tunable settings
//!
//! The policy is loaded once at startup and shared read-only by every filter;
//! nothing in it is mutated after load.

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Static security policy consulted by every filter stage.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SecurityPolicy {
    /// Paths exempt from both authentication and signature checks.
    #[serde(default)]
    pub excluded_auth_and_sign_paths: HashSet<String>,
    /// Paths exempt from token authentication only; still signature-checked.
    #[serde(default)]
    pub excluded_token_only_paths: HashSet<String>,
    /// Additional paths exempt from both checks (operational escape hatch,
    /// kept separate so it can be reviewed independently).
    #[serde(default)]
    pub excluded_misc_paths: HashSet<String>,
    /// Shared secret for HMAC request/response signing.
    #[serde(default)]
    pub shared_secret: String,
    /// HS256 key for bearer token verification.
    #[serde(default)]
    pub token_signing_key: String,
    /// Maximum accepted age of the request `timestamp` header.
    #[serde(default = "default_request_expiry_millis")]
    pub request_expiry_millis: i64,
    /// Upper bound on any request or response body the chain buffers for
    /// signing. Bodies above the cap are rejected rather than accumulated.
    #[serde(default = "default_max_signed_body_bytes")]
    pub max_signed_body_bytes: usize,
}

fn default_request_expiry_millis() -> i64 {
    60_000
}

fn default_max_signed_body_bytes() -> usize {
    1024 * 1024
}

impl SecurityPolicy {
    /// Load the policy from file and environment variables.
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values
    /// 2. Policy file (YAML)
    /// 3. Environment variables (prefixed with `GATEWAY_SECURITY_`)
    pub fn load() -> Result<Self> {
        // Pick up a local .env file if present
        let _ = dotenvy::dotenv();

        let config_path = std::env::var("GATEWAY_SECURITY_CONFIG")
            .map(PathBuf::from)
            .ok()
            .or_else(Self::find_config_file);

        let mut policy = match config_path {
            Some(ref path) if path.exists() => Self::from_file(path)?,
            _ => SecurityPolicy::default(),
        };

        policy.apply_env_overrides();
        policy.validate()?;

        Ok(policy)
    }

    /// Load the policy from a specific YAML file, without env overrides or
    /// validation.
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read policy file: {:?}", path))?;
        serde_norway::from_str(&contents)
            .with_context(|| format!("Failed to parse policy file: {:?}", path))
    }

    /// Find the policy file in standard locations.
    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            PathBuf::from("security.yaml"),
            PathBuf::from("config/security.yaml"),
            PathBuf::from("/etc/gateway-security/security.yaml"),
            dirs::config_dir()
                .map(|p| p.join("gateway-security/security.yaml"))
                .unwrap_or_default(),
        ];

        paths.into_iter().find(|p| p.exists())
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var("GATEWAY_SECURITY_SHARED_SECRET") {
            self.shared_secret = secret;
        }
        if let Ok(key) = std::env::var("GATEWAY_SECURITY_TOKEN_KEY") {
            self.token_signing_key = key;
        }
        if let Ok(expiry) = std::env::var("GATEWAY_SECURITY_REQUEST_EXPIRY_MS") {
            if let Ok(ms) = expiry.parse() {
                self.request_expiry_millis = ms;
            }
        }
        if let Ok(cap) = std::env::var("GATEWAY_SECURITY_MAX_BODY_BYTES") {
            if let Ok(bytes) = cap.parse() {
                self.max_signed_body_bytes = bytes;
            }
        }
    }

    /// Validate the loaded policy.
    pub fn validate(&self) -> Result<()> {
        if self.shared_secret.is_empty() {
            bail!("shared_secret must not be empty");
        }
        if self.token_signing_key.is_empty() {
            bail!("token_signing_key must not be empty");
        }
        if self.request_expiry_millis <= 0 {
            bail!("request_expiry_millis must be positive");
        }
        if self.max_signed_body_bytes == 0 {
            bail!("max_signed_body_bytes must be positive");
        }
        Ok(())
    }

    /// Whether the path is exempt from token authentication.
    pub fn is_auth_exempt(&self, path: &str) -> bool {
        self.excluded_auth_and_sign_paths.contains(path)
            || self.excluded_token_only_paths.contains(path)
            || self.excluded_misc_paths.contains(path)
    }

    /// Whether the path is exempt from request/response signature checks.
    /// Token-only exclusions still get sign-checked.
    pub fn is_sign_exempt(&self, path: &str) -> bool {
        self.excluded_auth_and_sign_paths.contains(path)
            || self.excluded_misc_paths.contains(path)
    }
}
