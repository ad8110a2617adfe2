//! Gateway Security Library
//!
//! An ordered chain of request/response interceptors for API gateways:
//! bearer-token authentication with identity-consistency checks, canonical
//! request signing with replay protection, opt-in response signing, and a
//! uniform JSON error envelope for every failure.
//!
//! The crate is a middleware layer. The hosting process builds an
//! [`axum::Router`] for its routed/proxied work and installs the chain with
//! [`secure`]; the chain runs per request and short-circuits into the error
//! envelope on any classified failure.

use std::sync::Arc;

use axum::{middleware::from_fn_with_state, Router};

pub mod config;
pub mod middleware;
pub mod signing;
pub mod utils;

pub use config::SecurityPolicy;
pub use middleware::{auth_filter, request_sign_filter, response_sign_filter, CallerIdentity, Claims};
pub use utils::error::{normalize_error, ErrorEnvelope, SecurityError, SecurityResult};

/// Shared handle passed to every filter stage.
#[derive(Clone)]
pub struct SecurityState {
    /// Static security policy; read-only after load.
    pub policy: Arc<SecurityPolicy>,
}

impl SecurityState {
    pub fn new(policy: SecurityPolicy) -> Self {
        Self {
            policy: Arc::new(policy),
        }
    }
}

/// Named filter stages of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Auth,
    RequestSign,
    ResponseSign,
}

/// Request-side execution order of the chain. This ordering is a security
/// invariant: authentication runs before signature verification, and response
/// signing wraps the routed work. Do not reorder.
pub const STAGE_ORDER: [Stage; 3] = [Stage::Auth, Stage::RequestSign, Stage::ResponseSign];

/// Install the security chain on a router, in [`STAGE_ORDER`], together with
/// the not-found fallback that renders the uniform error envelope.
pub fn secure<S>(router: Router<S>, state: SecurityState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let mut router = router.fallback(utils::error::not_found);

    // Layers wrap outside-in, so install in reverse of execution order.
    for stage in STAGE_ORDER.iter().rev() {
        router = match stage {
            Stage::Auth => router.layer(from_fn_with_state(
                state.clone(),
                middleware::auth::auth_filter,
            )),
            Stage::RequestSign => router.layer(from_fn_with_state(
                state.clone(),
                middleware::request_sign::request_sign_filter,
            )),
            Stage::ResponseSign => router.layer(from_fn_with_state(
                state.clone(),
                middleware::response_sign::response_sign_filter,
            )),
        };
    }

    router
}
