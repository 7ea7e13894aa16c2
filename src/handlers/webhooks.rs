//! HTTP handlers for webhook credential management.
//!
//! These endpoints let an authenticated account issue, list, update and
//! disable the credentials its alert senders use, and read the audit log.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::models::credential::{
    CredentialResponse, IssueCredentialRequest, UpdateCredentialRequest,
};
use crate::models::execution::{ExecutionQuery, ExecutionRecord};
use crate::services::credential_service;
use crate::state::AppState;

/// Issue a new webhook credential.
///
/// # Request Body
///
/// ```json
/// {
///   "name": "TradingView BTC",
///   "policy": {
///     "allowedSymbols": ["BTC"],
///     "maxOrderSize": 5000,
///     "dailyLimit": 10000,
///     "requireStopLoss": true
///   }
/// }
/// ```
///
/// # Response
///
/// Returns 201 Created. `publicId` and `secret` are only returned here.
///
/// ```json
/// {
///   "id": "550e8400-e29b-41d4-a716-446655440000",
///   "name": "TradingView BTC",
///   "publicId": "whk_3f9a...",
///   "secret": "a1b2c3d4e5f6...",
///   "keyPrefix": "3f9a1c0b",
///   "enabled": true,
///   ...
/// }
/// ```
pub async fn create_webhook(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<IssueCredentialRequest>,
) -> Result<impl IntoResponse, AppError> {
    tracing::debug!(account_key_id = %auth.account_key_id, "Issuing webhook credential");

    let credential = credential_service::issue(
        state.store.as_ref(),
        &state.vault,
        auth.account_id,
        request,
        Utc::now(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(credential)))
}

/// List the account's webhook credentials (key material never included).
pub async fn list_webhooks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<CredentialResponse>>, AppError> {
    let webhooks = credential_service::list(state.store.as_ref(), auth.account_id).await?;

    Ok(Json(webhooks))
}

pub async fn get_webhook(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(webhook_id): Path<Uuid>,
) -> Result<Json<CredentialResponse>, AppError> {
    let webhook = credential_service::get(state.store.as_ref(), auth.account_id, webhook_id).await?;

    Ok(Json(webhook))
}

/// Update a webhook's name, enabled flag or policy.
///
/// # Request Body
///
/// Every field is optional:
///
/// ```json
/// { "enabled": false }
/// ```
///
/// The public identifier and secret never change; issue a new credential to
/// rotate keys.
pub async fn update_webhook(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(webhook_id): Path<Uuid>,
    Json(request): Json<UpdateCredentialRequest>,
) -> Result<Json<CredentialResponse>, AppError> {
    let webhook = credential_service::update(
        state.store.as_ref(),
        auth.account_id,
        webhook_id,
        request,
        Utc::now(),
    )
    .await?;

    Ok(Json(webhook))
}

/// Disable a webhook (soft delete).
///
/// Returns 204 No Content. The audit history is kept.
pub async fn delete_webhook(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(webhook_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    credential_service::disable(state.store.as_ref(), auth.account_id, webhook_id, Utc::now())
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Newest-first audit records. `?limit=N` (default 50, max 500).
pub async fn list_executions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(webhook_id): Path<Uuid>,
    Query(query): Query<ExecutionQuery>,
) -> Result<Json<Vec<ExecutionRecord>>, AppError> {
    let records = credential_service::executions(
        state.store.as_ref(),
        auth.account_id,
        webhook_id,
        query.limit(),
    )
    .await?;

    Ok(Json(records))
}

/// One active rate-limit window.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowUsage {
    pub window: &'static str,
    pub count: i64,
    pub limit: i64,
    pub window_start: DateTime<Utc>,
    pub resets_at: DateTime<Utc>,
}

/// Current rate-limit counters of a webhook.
pub async fn get_usage(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(webhook_id): Path<Uuid>,
) -> Result<Json<Vec<WindowUsage>>, AppError> {
    let windows = credential_service::usage(
        state.store.as_ref(),
        &state.limiter,
        auth.account_id,
        webhook_id,
        Utc::now(),
    )
    .await?;

    let limits = state.limiter.limits();
    Ok(Json(
        windows
            .into_iter()
            .map(|w| WindowUsage {
                window: w.kind.as_str(),
                count: w.count,
                limit: limits.limit(w.kind),
                window_start: w.window_start,
                resets_at: w.expires_at(),
            })
            .collect(),
    ))
}
