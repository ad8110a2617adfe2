//! Security filter chain middleware
//!
//! This module contains the three filter stages:
//! - Authentication (JWT identity consistency)
//! - Request signing (canonical-string HMAC + replay window)
//! - Response signing (out-of-band body signature)
//!
//! Stage ordering is fixed; see [`crate::STAGE_ORDER`].

pub mod auth;
pub mod request_sign;
pub mod response_sign;

pub use auth::{auth_filter, CallerIdentity, Claims};
pub use request_sign::request_sign_filter;
pub use response_sign::response_sign_filter;
