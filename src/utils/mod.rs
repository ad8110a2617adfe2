//! Shared utilities

pub mod error;

pub use error::{ErrorEnvelope, SecurityError, SecurityResult};
