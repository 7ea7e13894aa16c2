//! Account key authentication middleware for the dashboard routes.
//!
//! This middleware intercepts every credential-management request to:
//! 1. Extract the account key from the Authorization header
//! 2. Hash it and look it up in the store
//! 3. Inject authentication context into the request
//! 4. Reject unauthorized requests with HTTP 401
//!
//! The inbound webhook route does not use this; it authenticates with
//! signatures instead.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{error::AppError, security::vault::lookup_hash, state::AppState};

/// Authentication context attached to authenticated requests.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Account every credential operation is scoped to
    pub account_id: Uuid,

    /// ID of the account key used
    pub account_key_id: Uuid,
}

/// Account key authentication middleware function.
///
/// # Headers
///
/// Expected header format:
/// ```text
/// Authorization: Bearer <account key>
/// ```
///
/// # Returns
///
/// - `Ok(Response)` if authenticated successfully (calls next handler)
/// - `Err(AppError::InvalidApiKey)` if authentication fails (returns 401)
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::InvalidApiKey)?;

    // Expected format: "Bearer <key>"
    let account_key = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AppError::InvalidApiKey)?;

    let record = state
        .store
        .find_account_key(&lookup_hash(account_key.trim()))
        .await?
        .ok_or(AppError::InvalidApiKey)?;

    // Route handlers extract this with Extension<AuthContext>
    request.extensions_mut().insert(AuthContext {
        account_id: record.account_id,
        account_key_id: record.id,
    });

    Ok(next.run(request).await)
}
