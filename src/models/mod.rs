//! Data models.
//!
//! This module contains the records the gateway persists and the request and
//! response bodies it exchanges.

/// Dashboard account key model
pub mod account_key;
/// Webhook credential and policy models
pub mod credential;
/// Execution audit records
pub mod execution;
/// Inbound order payloads
pub mod order;
/// Rate-limit windows
pub mod rate_window;
