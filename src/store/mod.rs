//! Persistence seam for the gateway.
//!
//! The gateway never talks to a database directly; it goes through
//! [`WebhookStore`]. Two backends exist:
//!
//! - [`postgres::PgStore`]: PostgreSQL via sqlx (production)
//! - [`memory::MemoryStore`]: in-process maps (development and tests)
//!
//! The one operation whose correctness depends on the backend's
//! transaction semantics is [`WebhookStore::charge_rate_windows`]: it must
//! decide and increment all windows of one credential atomically.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    account_key::AccountKey,
    credential::{Credential, UpdateCredentialRequest},
    execution::ExecutionRecord,
    rate_window::{RateDecision, RateWindow, WindowKind, WindowSpec},
};

pub mod memory;
pub mod postgres;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be mapped back to a model.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Duplicate key")]
    Conflict,
}

#[async_trait]
pub trait WebhookStore: Send + Sync {
    /// Active account key by SHA-256 hash.
    async fn find_account_key(&self, key_hash: &str) -> Result<Option<AccountKey>, StoreError>;

    async fn insert_credential(&self, credential: &Credential) -> Result<(), StoreError>;

    /// Credential by the hash of its public identifier.
    async fn credential_by_lookup_hash(
        &self,
        lookup_hash: &str,
    ) -> Result<Option<Credential>, StoreError>;

    /// Credential by id, scoped to its owning account.
    async fn credential_by_id(
        &self,
        account_id: Uuid,
        credential_id: Uuid,
    ) -> Result<Option<Credential>, StoreError>;

    async fn list_credentials(&self, account_id: Uuid) -> Result<Vec<Credential>, StoreError>;

    /// Apply a partial update. Returns `None` if no such credential exists
    /// for the account. Key material is never modified.
    async fn update_credential(
        &self,
        account_id: Uuid,
        credential_id: Uuid,
        patch: &UpdateCredentialRequest,
        now: DateTime<Utc>,
    ) -> Result<Option<Credential>, StoreError>;

    /// Bump `execution_count` and advance `last_executed_at` after a success.
    /// `last_executed_at` never moves backwards when successes finish out of
    /// order.
    async fn mark_executed(&self, credential_id: Uuid, at: DateTime<Utc>)
    -> Result<(), StoreError>;

    /// Atomically check and charge one request against every window.
    ///
    /// Windows are examined in the order given. For each, the most recent
    /// window started within its duration is found; if its count has
    /// reached the limit the call returns `Denied` without incrementing
    /// anything. Otherwise every window is incremented, and missing ones
    /// are created with `count = 1` and `window_start = now`.
    async fn charge_rate_windows(
        &self,
        account_id: Uuid,
        credential_id: Uuid,
        specs: &[WindowSpec],
        now: DateTime<Utc>,
    ) -> Result<RateDecision, StoreError>;

    /// Active windows of one credential (dashboard and tests).
    async fn active_rate_windows(
        &self,
        account_id: Uuid,
        credential_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<RateWindow>, StoreError>;

    /// Delete windows that started before `older_than`. Returns rows removed.
    async fn purge_rate_windows(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn append_execution(&self, record: &ExecutionRecord) -> Result<(), StoreError>;

    /// Newest-first audit records of a credential.
    async fn list_executions(
        &self,
        credential_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ExecutionRecord>, StoreError>;

    /// Total notional of successful executions since `since`.
    async fn sum_notional_since(
        &self,
        credential_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<f64, StoreError>;

    /// Connectivity check for `/health`.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Decide which window, if any, is exhausted.
///
/// `count_of` returns `(count, window_start)` of the active window of a
/// kind, or `None` if there is none. Returns the first exhausted kind in
/// `specs` order together with the time its window expires.
pub(crate) fn first_exhausted(
    specs: &[WindowSpec],
    mut count_of: impl FnMut(WindowKind) -> Option<(i64, DateTime<Utc>)>,
) -> Option<(WindowKind, DateTime<Utc>)> {
    specs.iter().find_map(|spec| match count_of(spec.kind) {
        Some((count, window_start)) if count >= spec.limit => {
            Some((spec.kind, window_start + spec.kind.duration()))
        }
        _ => None,
    })
}
