//! HTTP middleware components.
//!
//! Middleware run before route handlers and can short-circuit a request
//! (for example, rejecting an unauthenticated dashboard call).

/// Account key authentication middleware
pub mod auth;
