//! PostgreSQL store.
//!
//! Rate windows are charged inside one database transaction that first takes
//! a transaction-scoped advisory lock on the credential, so concurrent
//! requests for the same credential serialise. Window rows are unique on
//! `(account_id, credential_id, kind, window_start)`; an insert that collides
//! is turned into an increment by `ON CONFLICT DO UPDATE`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{StoreError, WebhookStore, first_exhausted};
use crate::db::DbPool;
use crate::models::{
    account_key::AccountKey,
    credential::{Credential, CredentialSecret, Policy, SealedSecret, UpdateCredentialRequest},
    execution::{ExecutionRecord, ExecutionStatus},
    rate_window::{RateDecision, RateWindow, WindowKind, WindowSpec},
};

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Row of the `webhook_credentials` table.
#[derive(Debug, sqlx::FromRow)]
struct CredentialRow {
    id: Uuid,
    account_id: Uuid,
    name: String,
    lookup_hash: String,
    key_prefix: String,
    secret_ciphertext: Option<String>,
    secret_nonce: Option<String>,
    legacy_secret_hash: Option<String>,
    enabled: bool,
    allowed_symbols: Vec<String>,
    max_order_size: f64,
    daily_limit: f64,
    require_stop_loss: bool,
    execution_count: i64,
    last_executed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CredentialRow> for Credential {
    type Error = StoreError;

    fn try_from(row: CredentialRow) -> Result<Self, Self::Error> {
        let secret = match (row.secret_ciphertext, row.secret_nonce, row.legacy_secret_hash) {
            (Some(ciphertext), Some(nonce), _) => {
                CredentialSecret::Sealed(SealedSecret { ciphertext, nonce })
            }
            (None, None, Some(hash)) => CredentialSecret::LegacyHash(hash),
            _ => {
                return Err(StoreError::Corrupt(format!(
                    "credential {} has no usable secret columns",
                    row.id
                )));
            }
        };

        Ok(Credential {
            id: row.id,
            account_id: row.account_id,
            name: row.name,
            lookup_hash: row.lookup_hash,
            key_prefix: row.key_prefix,
            secret,
            enabled: row.enabled,
            policy: Policy {
                allowed_symbols: row.allowed_symbols.into_iter().collect(),
                max_order_size: row.max_order_size,
                daily_limit: row.daily_limit,
                require_stop_loss: row.require_stop_loss,
            },
            execution_count: row.execution_count,
            last_executed_at: row.last_executed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Row of the `webhook_executions` table.
#[derive(Debug, sqlx::FromRow)]
struct ExecutionRow {
    id: Uuid,
    credential_id: Uuid,
    account_id: Uuid,
    request_payload: serde_json::Value,
    raw_request: String,
    response_payload: serde_json::Value,
    status: String,
    order_id: Option<String>,
    error: Option<String>,
    notional: Option<f64>,
    latency_ms: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<ExecutionRow> for ExecutionRecord {
    type Error = StoreError;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        let status = ExecutionStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown status {}", row.status)))?;

        Ok(ExecutionRecord {
            id: row.id,
            credential_id: row.credential_id,
            account_id: row.account_id,
            request_payload: row.request_payload,
            raw_request: row.raw_request,
            response_payload: row.response_payload,
            status,
            order_id: row.order_id,
            error: row.error,
            notional: row.notional,
            latency_ms: row.latency_ms,
            created_at: row.created_at,
        })
    }
}

const CREDENTIAL_COLUMNS: &str = "id, account_id, name, lookup_hash, key_prefix, \
     secret_ciphertext, secret_nonce, legacy_secret_hash, enabled, allowed_symbols, \
     max_order_size, daily_limit, require_stop_loss, execution_count, last_executed_at, \
     created_at, updated_at";

#[async_trait]
impl WebhookStore for PgStore {
    async fn find_account_key(&self, key_hash: &str) -> Result<Option<AccountKey>, StoreError> {
        let key = sqlx::query_as::<_, AccountKey>(
            "SELECT id, account_id, key_hash, label, created_at, is_active
             FROM account_keys
             WHERE key_hash = $1 AND is_active = true",
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(key)
    }

    async fn insert_credential(&self, credential: &Credential) -> Result<(), StoreError> {
        let (ciphertext, nonce, legacy) = match &credential.secret {
            CredentialSecret::Sealed(sealed) => {
                (Some(&sealed.ciphertext), Some(&sealed.nonce), None)
            }
            CredentialSecret::LegacyHash(hash) => (None, None, Some(hash)),
        };
        let symbols: Vec<String> = credential.policy.allowed_symbols.iter().cloned().collect();

        let result = sqlx::query(
            r#"
            INSERT INTO webhook_credentials (
                id, account_id, name, lookup_hash, key_prefix,
                secret_ciphertext, secret_nonce, legacy_secret_hash,
                enabled, allowed_symbols, max_order_size, daily_limit, require_stop_loss,
                execution_count, last_executed_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(credential.id)
        .bind(credential.account_id)
        .bind(&credential.name)
        .bind(&credential.lookup_hash)
        .bind(&credential.key_prefix)
        .bind(ciphertext)
        .bind(nonce)
        .bind(legacy)
        .bind(credential.enabled)
        .bind(&symbols)
        .bind(credential.policy.max_order_size)
        .bind(credential.policy.daily_limit)
        .bind(credential.policy.require_stop_loss)
        .bind(credential.execution_count)
        .bind(credential.last_executed_at)
        .bind(credential.created_at)
        .bind(credential.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(StoreError::Conflict),
            Err(e) => Err(e.into()),
        }
    }

    async fn credential_by_lookup_hash(
        &self,
        lookup_hash: &str,
    ) -> Result<Option<Credential>, StoreError> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {} FROM webhook_credentials WHERE lookup_hash = $1",
            CREDENTIAL_COLUMNS
        ))
        .bind(lookup_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Credential::try_from).transpose()
    }

    async fn credential_by_id(
        &self,
        account_id: Uuid,
        credential_id: Uuid,
    ) -> Result<Option<Credential>, StoreError> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {} FROM webhook_credentials WHERE id = $1 AND account_id = $2",
            CREDENTIAL_COLUMNS
        ))
        .bind(credential_id)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Credential::try_from).transpose()
    }

    async fn list_credentials(&self, account_id: Uuid) -> Result<Vec<Credential>, StoreError> {
        let rows = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {} FROM webhook_credentials WHERE account_id = $1 ORDER BY created_at DESC",
            CREDENTIAL_COLUMNS
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Credential::try_from).collect()
    }

    async fn update_credential(
        &self,
        account_id: Uuid,
        credential_id: Uuid,
        patch: &UpdateCredentialRequest,
        now: DateTime<Utc>,
    ) -> Result<Option<Credential>, StoreError> {
        let policy = patch.policy.as_ref();
        let symbols: Option<Vec<String>> =
            policy.map(|p| p.allowed_symbols.iter().cloned().collect());

        // Key columns (lookup_hash, secret_*) are never updated.
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            r#"
            UPDATE webhook_credentials
            SET name = COALESCE($3, name),
                enabled = COALESCE($4, enabled),
                allowed_symbols = COALESCE($5, allowed_symbols),
                max_order_size = COALESCE($6, max_order_size),
                daily_limit = COALESCE($7, daily_limit),
                require_stop_loss = COALESCE($8, require_stop_loss),
                updated_at = $9
            WHERE id = $1 AND account_id = $2
            RETURNING {}
            "#,
            CREDENTIAL_COLUMNS
        ))
        .bind(credential_id)
        .bind(account_id)
        .bind(patch.name.as_ref())
        .bind(patch.enabled)
        .bind(symbols)
        .bind(policy.map(|p| p.max_order_size))
        .bind(policy.map(|p| p.daily_limit))
        .bind(policy.map(|p| p.require_stop_loss))
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Credential::try_from).transpose()
    }

    async fn mark_executed(
        &self,
        credential_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE webhook_credentials
             SET execution_count = execution_count + 1,
                 last_executed_at = GREATEST(COALESCE(last_executed_at, $2), $2)
             WHERE id = $1",
        )
        .bind(credential_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn charge_rate_windows(
        &self,
        account_id: Uuid,
        credential_id: Uuid,
        specs: &[WindowSpec],
        now: DateTime<Utc>,
    ) -> Result<RateDecision, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Serialise all charges of this credential until commit/rollback
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(credential_id.to_string())
            .execute(&mut *tx)
            .await?;

        let mut current: Vec<(WindowKind, Option<(i64, DateTime<Utc>)>)> =
            Vec::with_capacity(specs.len());
        for spec in specs {
            let row: Option<(i64, DateTime<Utc>)> = sqlx::query_as(
                r#"
                SELECT count, window_start
                FROM rate_windows
                WHERE account_id = $1 AND credential_id = $2 AND kind = $3
                  AND window_start > $4
                ORDER BY window_start DESC
                LIMIT 1
                "#,
            )
            .bind(account_id)
            .bind(credential_id)
            .bind(spec.kind.as_str())
            .bind(now - spec.kind.duration())
            .fetch_optional(&mut *tx)
            .await?;
            current.push((spec.kind, row));
        }

        let exhausted = first_exhausted(specs, |kind| {
            current
                .iter()
                .find(|(k, _)| *k == kind)
                .and_then(|(_, row)| *row)
        });
        if let Some((kind, retry_at)) = exhausted {
            tx.rollback().await?;
            return Ok(RateDecision::Denied { kind, retry_at });
        }

        for (kind, row) in &current {
            let window_start = row.map(|(_, start)| start).unwrap_or(now);
            sqlx::query(
                r#"
                INSERT INTO rate_windows (account_id, credential_id, kind, window_start, count)
                VALUES ($1, $2, $3, $4, 1)
                ON CONFLICT (account_id, credential_id, kind, window_start)
                DO UPDATE SET count = rate_windows.count + 1
                "#,
            )
            .bind(account_id)
            .bind(credential_id)
            .bind(kind.as_str())
            .bind(window_start)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(RateDecision::Allowed)
    }

    async fn active_rate_windows(
        &self,
        account_id: Uuid,
        credential_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<RateWindow>, StoreError> {
        let mut windows = Vec::new();
        for kind in WindowKind::ALL {
            let row: Option<(i64, DateTime<Utc>)> = sqlx::query_as(
                r#"
                SELECT count, window_start
                FROM rate_windows
                WHERE account_id = $1 AND credential_id = $2 AND kind = $3
                  AND window_start > $4
                ORDER BY window_start DESC
                LIMIT 1
                "#,
            )
            .bind(account_id)
            .bind(credential_id)
            .bind(kind.as_str())
            .bind(now - kind.duration())
            .fetch_optional(&self.pool)
            .await?;

            if let Some((count, window_start)) = row {
                windows.push(RateWindow {
                    account_id,
                    credential_id,
                    kind,
                    window_start,
                    count,
                });
            }
        }

        Ok(windows)
    }

    async fn purge_rate_windows(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM rate_windows WHERE window_start < $1")
            .bind(older_than)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn append_execution(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO webhook_executions (
                id, credential_id, account_id, request_payload, raw_request,
                response_payload, status, order_id, error, notional, latency_ms, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(record.id)
        .bind(record.credential_id)
        .bind(record.account_id)
        .bind(&record.request_payload)
        .bind(&record.raw_request)
        .bind(&record.response_payload)
        .bind(record.status.as_str())
        .bind(record.order_id.as_ref())
        .bind(record.error.as_ref())
        .bind(record.notional)
        .bind(record.latency_ms)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_executions(
        &self,
        credential_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ExecutionRecord>, StoreError> {
        let rows = sqlx::query_as::<_, ExecutionRow>(
            "SELECT * FROM webhook_executions
             WHERE credential_id = $1
             ORDER BY created_at DESC
             LIMIT $2",
        )
        .bind(credential_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ExecutionRecord::try_from).collect()
    }

    async fn sum_notional_since(
        &self,
        credential_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<f64, StoreError> {
        let total: f64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(notional), 0)::DOUBLE PRECISION
             FROM webhook_executions
             WHERE credential_id = $1 AND status = 'success' AND created_at >= $2",
        )
        .bind(credential_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
