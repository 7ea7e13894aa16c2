//! Credential management for the dashboard.
//!
//! Issues new webhook credentials and applies updates. The public
//! identifier and secret are returned exactly once, from [`issue`]; no later
//! read can recover them.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::credential::{
    Credential, CredentialResponse, CredentialSecret, IssueCredentialRequest,
    UpdateCredentialRequest,
};
use crate::models::execution::ExecutionRecord;
use crate::models::rate_window::RateWindow;
use crate::security::vault::CredentialVault;
use crate::services::rate_limiter::RateLimiter;
use crate::store::WebhookStore;

const MAX_NAME_LEN: usize = 100;

fn validate_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::InvalidRequest(format!(
            "name must be 1 to {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

/// Issue a new credential for an account.
///
/// # Process
///
/// 1. Validate name and policy
/// 2. Generate public identifier and secret, seal the secret
/// 3. Store the credential (hash, prefix, sealed secret only)
/// 4. Return the response with key material included (only time it's shown)
pub async fn issue(
    store: &dyn WebhookStore,
    vault: &CredentialVault,
    account_id: Uuid,
    request: IssueCredentialRequest,
    now: DateTime<Utc>,
) -> Result<CredentialResponse, AppError> {
    let name = validate_name(&request.name)?;
    let policy = request.policy.normalized().map_err(AppError::InvalidRequest)?;

    let issued = vault.issue()?;

    let credential = Credential {
        id: Uuid::new_v4(),
        account_id,
        name,
        lookup_hash: issued.lookup_hash.clone(),
        key_prefix: issued.key_prefix.clone(),
        secret: CredentialSecret::Sealed(issued.sealed.clone()),
        enabled: true,
        policy,
        execution_count: 0,
        last_executed_at: None,
        created_at: now,
        updated_at: now,
    };

    store.insert_credential(&credential).await?;

    tracing::info!(
        credential_id = %credential.id,
        account_id = %account_id,
        key_prefix = %credential.key_prefix,
        "Webhook credential issued"
    );

    Ok(CredentialResponse::from(credential)
        .with_key_material(issued.public_id.clone(), issued.secret.to_string()))
}

pub async fn list(
    store: &dyn WebhookStore,
    account_id: Uuid,
) -> Result<Vec<CredentialResponse>, AppError> {
    let credentials = store.list_credentials(account_id).await?;
    Ok(credentials.into_iter().map(CredentialResponse::from).collect())
}

pub async fn get(
    store: &dyn WebhookStore,
    account_id: Uuid,
    credential_id: Uuid,
) -> Result<CredentialResponse, AppError> {
    store
        .credential_by_id(account_id, credential_id)
        .await?
        .map(CredentialResponse::from)
        .ok_or(AppError::WebhookNotFound)
}

/// Update name, enabled flag or policy. Key material never changes.
pub async fn update(
    store: &dyn WebhookStore,
    account_id: Uuid,
    credential_id: Uuid,
    mut request: UpdateCredentialRequest,
    now: DateTime<Utc>,
) -> Result<CredentialResponse, AppError> {
    if let Some(name) = request.name.take() {
        request.name = Some(validate_name(&name)?);
    }
    if let Some(policy) = request.policy.take() {
        request.policy = Some(policy.normalized().map_err(AppError::InvalidRequest)?);
    }

    let updated = store
        .update_credential(account_id, credential_id, &request, now)
        .await?
        .ok_or(AppError::WebhookNotFound)?;

    tracing::info!(credential_id = %credential_id, enabled = updated.enabled, "Webhook credential updated");

    Ok(updated.into())
}

/// Disable a credential (soft delete, audit history is kept).
pub async fn disable(
    store: &dyn WebhookStore,
    account_id: Uuid,
    credential_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let patch = UpdateCredentialRequest {
        enabled: Some(false),
        ..Default::default()
    };
    store
        .update_credential(account_id, credential_id, &patch, now)
        .await?
        .ok_or(AppError::WebhookNotFound)?;

    tracing::info!(credential_id = %credential_id, "Webhook credential disabled");
    Ok(())
}

/// Audit records of a credential owned by the account.
pub async fn executions(
    store: &dyn WebhookStore,
    account_id: Uuid,
    credential_id: Uuid,
    limit: i64,
) -> Result<Vec<ExecutionRecord>, AppError> {
    store
        .credential_by_id(account_id, credential_id)
        .await?
        .ok_or(AppError::WebhookNotFound)?;

    Ok(store.list_executions(credential_id, limit).await?)
}

/// Active rate-limit windows of a credential owned by the account.
pub async fn usage(
    store: &dyn WebhookStore,
    limiter: &RateLimiter,
    account_id: Uuid,
    credential_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Vec<RateWindow>, AppError> {
    store
        .credential_by_id(account_id, credential_id)
        .await?
        .ok_or(AppError::WebhookNotFound)?;

    Ok(limiter.usage(account_id, credential_id, now).await?)
}
