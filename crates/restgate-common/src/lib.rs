//! Common utilities for restgate
//!
//! This crate provides shared functionality used across all restgate crates.

pub mod claims;
pub mod error;

pub use claims::{sanitize_claim_name, ClaimValue, RequestContext};
pub use error::{GatewayError, Result};
