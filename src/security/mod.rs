//! Webhook trust boundary primitives.
//!
//! - `vault`: credential issuance and at-rest encryption of secrets
//! - `signature`: canonical message and HMAC verification
//! - `replay`: timestamp freshness

pub mod replay;
pub mod signature;
pub mod vault;
