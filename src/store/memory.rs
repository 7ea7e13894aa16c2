//! In-process store.
//!
//! Used when no `DATABASE_URL` is configured and by the test suite. Each
//! map sits behind its own `parking_lot` lock; rate windows are charged
//! under a single mutex so the decide-then-increment step is atomic.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use super::{StoreError, WebhookStore, first_exhausted};
use crate::models::{
    account_key::AccountKey,
    credential::{Credential, UpdateCredentialRequest},
    execution::{ExecutionRecord, ExecutionStatus},
    rate_window::{RateDecision, RateWindow, WindowKind, WindowSpec},
};

/// Unique key of a rate window row.
type WindowKey = (Uuid, Uuid, WindowKind, DateTime<Utc>);

#[derive(Default)]
pub struct MemoryStore {
    account_keys: RwLock<HashMap<String, AccountKey>>,
    credentials: RwLock<HashMap<Uuid, Credential>>,
    windows: Mutex<BTreeMap<WindowKey, i64>>,
    executions: RwLock<Vec<ExecutionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dashboard account key.
    pub fn insert_account_key(&self, key: AccountKey) {
        self.account_keys.write().insert(key.key_hash.clone(), key);
    }
}

/// Most recent window of a kind started after `now - duration(kind)`.
fn latest_active(
    windows: &BTreeMap<WindowKey, i64>,
    account_id: Uuid,
    credential_id: Uuid,
    kind: WindowKind,
    now: DateTime<Utc>,
) -> Option<(i64, DateTime<Utc>)> {
    let threshold = now - kind.duration();
    windows
        .iter()
        .filter(|((a, c, k, start), _)| {
            *a == account_id && *c == credential_id && *k == kind && *start > threshold
        })
        .max_by_key(|((_, _, _, start), _)| *start)
        .map(|((_, _, _, start), count)| (*count, *start))
}

#[async_trait]
impl WebhookStore for MemoryStore {
    async fn find_account_key(&self, key_hash: &str) -> Result<Option<AccountKey>, StoreError> {
        Ok(self
            .account_keys
            .read()
            .get(key_hash)
            .filter(|key| key.is_active)
            .cloned())
    }

    async fn insert_credential(&self, credential: &Credential) -> Result<(), StoreError> {
        let mut credentials = self.credentials.write();
        let duplicate = credentials
            .values()
            .any(|c| c.id == credential.id || c.lookup_hash == credential.lookup_hash);
        if duplicate {
            return Err(StoreError::Conflict);
        }
        credentials.insert(credential.id, credential.clone());
        Ok(())
    }

    async fn credential_by_lookup_hash(
        &self,
        lookup_hash: &str,
    ) -> Result<Option<Credential>, StoreError> {
        Ok(self
            .credentials
            .read()
            .values()
            .find(|c| c.lookup_hash == lookup_hash)
            .cloned())
    }

    async fn credential_by_id(
        &self,
        account_id: Uuid,
        credential_id: Uuid,
    ) -> Result<Option<Credential>, StoreError> {
        Ok(self
            .credentials
            .read()
            .get(&credential_id)
            .filter(|c| c.account_id == account_id)
            .cloned())
    }

    async fn list_credentials(&self, account_id: Uuid) -> Result<Vec<Credential>, StoreError> {
        let mut list: Vec<Credential> = self
            .credentials
            .read()
            .values()
            .filter(|c| c.account_id == account_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    async fn update_credential(
        &self,
        account_id: Uuid,
        credential_id: Uuid,
        patch: &UpdateCredentialRequest,
        now: DateTime<Utc>,
    ) -> Result<Option<Credential>, StoreError> {
        let mut credentials = self.credentials.write();
        let Some(credential) = credentials
            .get_mut(&credential_id)
            .filter(|c| c.account_id == account_id)
        else {
            return Ok(None);
        };

        if let Some(name) = &patch.name {
            credential.name = name.clone();
        }
        if let Some(enabled) = patch.enabled {
            credential.enabled = enabled;
        }
        if let Some(policy) = &patch.policy {
            credential.policy = policy.clone();
        }
        credential.updated_at = now;

        Ok(Some(credential.clone()))
    }

    async fn mark_executed(
        &self,
        credential_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(credential) = self.credentials.write().get_mut(&credential_id) {
            credential.execution_count += 1;
            credential.last_executed_at = credential.last_executed_at.max(Some(at));
        }
        Ok(())
    }

    async fn charge_rate_windows(
        &self,
        account_id: Uuid,
        credential_id: Uuid,
        specs: &[WindowSpec],
        now: DateTime<Utc>,
    ) -> Result<RateDecision, StoreError> {
        let mut windows = self.windows.lock();

        let exhausted = first_exhausted(specs, |kind| {
            latest_active(&windows, account_id, credential_id, kind, now)
        });
        if let Some((kind, retry_at)) = exhausted {
            return Ok(RateDecision::Denied { kind, retry_at });
        }

        for spec in specs {
            let start = latest_active(&windows, account_id, credential_id, spec.kind, now)
                .map(|(_, start)| start)
                .unwrap_or(now);
            *windows
                .entry((account_id, credential_id, spec.kind, start))
                .or_insert(0) += 1;
        }

        Ok(RateDecision::Allowed)
    }

    async fn active_rate_windows(
        &self,
        account_id: Uuid,
        credential_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<RateWindow>, StoreError> {
        let windows = self.windows.lock();
        Ok(WindowKind::ALL
            .iter()
            .filter_map(|&kind| {
                latest_active(&windows, account_id, credential_id, kind, now).map(
                    |(count, window_start)| RateWindow {
                        account_id,
                        credential_id,
                        kind,
                        window_start,
                        count,
                    },
                )
            })
            .collect())
    }

    async fn purge_rate_windows(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|(_, _, _, start), _| *start >= older_than);
        Ok((before - windows.len()) as u64)
    }

    async fn append_execution(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        self.executions.write().push(record.clone());
        Ok(())
    }

    async fn list_executions(
        &self,
        credential_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ExecutionRecord>, StoreError> {
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(self
            .executions
            .read()
            .iter()
            .rev()
            .filter(|r| r.credential_id == credential_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn sum_notional_since(
        &self,
        credential_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<f64, StoreError> {
        Ok(self
            .executions
            .read()
            .iter()
            .filter(|r| {
                r.credential_id == credential_id
                    && r.status == ExecutionStatus::Success
                    && r.created_at >= since
            })
            .filter_map(|r| r.notional)
            .sum())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
