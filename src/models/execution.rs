//! Execution audit records.
//!
//! One record is appended for every inbound request that resolved to a
//! credential, whether it reached the executor or was denied on the way.
//! Records are never updated or deleted by the gateway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(ExecutionStatus::Success),
            "failed" => Some(ExecutionStatus::Failed),
            _ => None,
        }
    }
}

/// Append-only audit entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub credential_id: Uuid,
    pub account_id: Uuid,

    /// Inbound body as parsed JSON (queryable)
    pub request_payload: serde_json::Value,

    /// Inbound body byte for byte, as the sender wrote it
    pub raw_request: String,

    /// What was sent back to the caller
    pub response_payload: serde_json::Value,

    pub status: ExecutionStatus,
    pub order_id: Option<String>,
    pub error: Option<String>,

    /// Order notional; only counted towards the daily limit on success
    pub notional: Option<f64>,

    pub latency_ms: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ExecutionQuery {
    pub limit: Option<i64>,
}

impl ExecutionQuery {
    /// Requested page size, clamped to 1..=500 (default 50).
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(50).clamp(1, 500)
    }
}
