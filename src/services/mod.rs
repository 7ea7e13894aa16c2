//! Business logic services.
//!
//! Services contain the gateway's decision logic, separated from HTTP
//! handlers and storage.

pub mod credential_service;
pub mod executor;
pub mod gateway;
pub mod policy;
pub mod rate_limiter;
