//! Shared application state handed to every handler.

use std::sync::Arc;

use crate::security::vault::CredentialVault;
use crate::services::gateway::WebhookGateway;
use crate::services::rate_limiter::RateLimiter;
use crate::store::WebhookStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn WebhookStore>,
    pub vault: Arc<CredentialVault>,
    pub limiter: Arc<RateLimiter>,
    pub gateway: Arc<WebhookGateway>,
}
