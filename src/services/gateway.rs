//! Inbound webhook pipeline.
//!
//! Every request runs the same stages, in order, and stops at the first
//! failure:
//!
//! 1. Envelope: `apiKey`, `signature`, `timestamp` present and well formed
//! 2. Replay guard: timestamp within the window of the server clock
//! 3. Resolve: credential by hash of the public identifier
//! 4. Reveal: decrypt the stored secret
//! 5. Verify: HMAC over the canonical message
//! 6. Order fields: action, symbol, quantity, prices
//! 7. Enabled flag
//! 8. Rate limiter: minute, hour, day
//! 9. Policy gate: symbol, size, stop loss, daily notional
//! 10. Executor
//!
//! Requests that fail before a credential resolves are answered without an
//! audit record; from stage 4 onwards every outcome is recorded.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AppError, AuthFailure};
use crate::models::credential::Credential;
use crate::models::execution::{ExecutionRecord, ExecutionStatus};
use crate::models::order::{OrderIntent, OrderType, SignedEnvelope, WebhookOrder, WebhookSuccess};
use crate::models::rate_window::RateDecision;
use crate::security::vault::{CredentialVault, lookup_hash};
use crate::security::{replay, signature};
use crate::services::executor::OrderExecutor;
use crate::services::policy::{self, DenialReason, PolicyDecision};
use crate::services::rate_limiter::RateLimiter;
use crate::store::WebhookStore;

pub struct WebhookGateway {
    store: Arc<dyn WebhookStore>,
    vault: Arc<CredentialVault>,
    limiter: Arc<RateLimiter>,
    executor: Arc<dyn OrderExecutor>,
    replay_window: Duration,
}

/// Result of the stages that run after the credential resolved.
struct Outcome {
    result: Result<WebhookSuccess, AppError>,
    order_id: Option<String>,
    notional: Option<f64>,
}

impl Outcome {
    fn denied(error: AppError) -> Self {
        Self {
            result: Err(error),
            order_id: None,
            notional: None,
        }
    }
}

/// Start of the UTC day containing `now`.
fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

impl WebhookGateway {
    pub fn new(
        store: Arc<dyn WebhookStore>,
        vault: Arc<CredentialVault>,
        limiter: Arc<RateLimiter>,
        executor: Arc<dyn OrderExecutor>,
        replay_window: Duration,
    ) -> Self {
        Self {
            store,
            vault,
            limiter,
            executor,
            replay_window,
        }
    }

    /// Run one inbound request through the pipeline.
    ///
    /// `body` is the request body exactly as received; `now` is the time
    /// the request was received.
    ///
    /// Once the executor has accepted an order the call succeeds, even if
    /// the audit append or the execution counter update fails afterwards.
    /// Those failures are logged; a 5xx here would make the sender retry an
    /// order that was already placed.
    pub async fn handle(
        &self,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<WebhookSuccess, AppError> {
        let started = Instant::now();

        let payload: Value = serde_json::from_slice(body)
            .map_err(|e| AppError::InvalidRequest(format!("Invalid JSON body: {}", e)))?;

        let envelope = parse_envelope(&payload)?;

        if !replay::is_fresh(envelope.timestamp, now, self.replay_window) {
            tracing::warn!(timestamp = envelope.timestamp, "Webhook rejected: stale timestamp");
            return Err(AppError::Unauthorized(AuthFailure::StaleTimestamp));
        }

        let credential = self
            .store
            .credential_by_lookup_hash(&lookup_hash(&envelope.api_key))
            .await?
            .ok_or_else(|| {
                tracing::warn!("Webhook rejected: unknown API key");
                AppError::Unauthorized(AuthFailure::UnknownApiKey)
            })?;

        let outcome = self
            .authorize_and_execute(&credential, &payload, &envelope, now)
            .await;

        let raw_request = String::from_utf8_lossy(body).into_owned();
        let recorded = self
            .record(&credential, payload, raw_request, &outcome, started, now)
            .await;

        match outcome.result {
            Ok(success) => {
                tracing::info!(
                    credential_id = %credential.id,
                    order_id = %success.order_id,
                    "Webhook order executed"
                );
                if let Err(e) = recorded {
                    tracing::error!(
                        credential_id = %credential.id,
                        order_id = %success.order_id,
                        "Audit write failed after execution: {}",
                        e
                    );
                }
                if let Err(e) = self.store.mark_executed(credential.id, now).await {
                    tracing::error!(
                        credential_id = %credential.id,
                        order_id = %success.order_id,
                        "Execution counter update failed: {}",
                        e
                    );
                }
                Ok(success)
            }
            Err(e) => {
                tracing::warn!(
                    credential_id = %credential.id,
                    code = e.code(),
                    "Webhook order denied"
                );
                // No order was placed, so a lost audit record fails the request
                recorded?;
                Err(e)
            }
        }
    }

    async fn authorize_and_execute(
        &self,
        credential: &Credential,
        payload: &Value,
        envelope: &SignedEnvelope,
        now: DateTime<Utc>,
    ) -> Outcome {
        // The revealed secret is wiped when this match arm ends.
        let verified = match self.vault.reveal(&credential.secret) {
            Ok(secret) => signature::verify(payload, &envelope.signature, &secret),
            Err(e) => return Outcome::denied(e.into()),
        };
        if !verified {
            return Outcome::denied(AppError::Unauthorized(AuthFailure::InvalidSignature));
        }

        let order = match WebhookOrder::from_payload(payload) {
            Ok(order) => order,
            Err(msg) => return Outcome::denied(AppError::InvalidRequest(msg)),
        };

        if !credential.enabled {
            return Outcome::denied(AppError::PolicyDenied(DenialReason::Disabled));
        }

        match self
            .limiter
            .check_and_increment(credential.account_id, credential.id, now)
            .await
        {
            Ok(RateDecision::Allowed) => {}
            Ok(RateDecision::Denied { kind, retry_at }) => {
                return Outcome::denied(AppError::RateLimited {
                    window: kind,
                    retry_after_secs: (retry_at - now).num_seconds(),
                });
            }
            Err(e) => return Outcome::denied(e.into()),
        }

        let spent_today = match self
            .store
            .sum_notional_since(credential.id, start_of_day(now))
            .await
        {
            Ok(total) => total,
            Err(e) => return Outcome::denied(e.into()),
        };

        let notional = order.notional();
        if let PolicyDecision::Denied(reason) =
            policy::evaluate(&order, credential.enabled, &credential.policy, spent_today)
        {
            return Outcome::denied(AppError::PolicyDenied(reason));
        }

        let intent = OrderIntent {
            credential_id: credential.id,
            account_id: credential.account_id,
            action: order.action,
            symbol: order.symbol.clone(),
            quantity: order.quantity,
            price: order.price,
            order_type: order.order_type.unwrap_or(OrderType::Market),
            stop_loss: order.stop_loss,
            take_profit: order.take_profit,
        };

        match self.executor.execute(&intent).await {
            Ok(report) => Outcome {
                order_id: Some(report.order_id.clone()),
                notional: Some(notional),
                result: Ok(WebhookSuccess {
                    success: true,
                    order_id: report.order_id,
                    executed_price: report.executed_price,
                    executed_quantity: report.executed_quantity,
                    timestamp: now.timestamp(),
                }),
            },
            Err(e) => {
                tracing::error!(credential_id = %credential.id, "Order execution failed: {}", e);
                Outcome {
                    notional: Some(notional),
                    ..Outcome::denied(e.into())
                }
            }
        }
    }

    async fn record(
        &self,
        credential: &Credential,
        payload: Value,
        raw_request: String,
        outcome: &Outcome,
        started: Instant,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let (status, response_payload, error) = match &outcome.result {
            Ok(success) => (
                ExecutionStatus::Success,
                serde_json::to_value(success).unwrap_or(Value::Null),
                None,
            ),
            Err(e) => (ExecutionStatus::Failed, e.body(), Some(e.to_string())),
        };

        let record = ExecutionRecord {
            id: Uuid::new_v4(),
            credential_id: credential.id,
            account_id: credential.account_id,
            request_payload: payload,
            raw_request,
            response_payload,
            status,
            order_id: outcome.order_id.clone(),
            error,
            notional: outcome.notional,
            latency_ms: i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX),
            created_at: now,
        };

        self.store.append_execution(&record).await?;
        Ok(())
    }
}

fn parse_envelope(payload: &Value) -> Result<SignedEnvelope, AppError> {
    if !payload.is_object() {
        return Err(AppError::InvalidRequest(
            "Request body must be a JSON object".to_string(),
        ));
    }

    serde_json::from_value::<SignedEnvelope>(payload.clone())
        .map_err(|e| AppError::InvalidRequest(format!("Invalid request envelope: {}", e)))
}
