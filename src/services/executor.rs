//! Hand-off of validated orders to the execution engine.
//!
//! The gateway does not place orders itself. It passes an [`OrderIntent`]
//! to an [`OrderExecutor`]:
//!
//! - [`HttpOrderExecutor`] POSTs the intent to a downstream engine
//! - [`PaperExecutor`] fills immediately at the order price (development)

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::models::order::OrderIntent;

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("Executor unavailable: {0}")]
    Unavailable(String),

    #[error("Order rejected by executor: {0}")]
    Rejected(String),
}

/// What the execution engine reports back.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub order_id: String,
    #[serde(default)]
    pub executed_price: Option<f64>,
    #[serde(default)]
    pub executed_quantity: Option<f64>,
}

#[async_trait]
pub trait OrderExecutor: Send + Sync {
    async fn execute(&self, intent: &OrderIntent) -> Result<ExecutionReport, ExecutorError>;
}

/// Forwards intents to an HTTP execution engine.
///
/// # Protocol
///
/// `POST <url>` with the intent as JSON. A 2xx response must carry an
/// [`ExecutionReport`] body; a 4xx is a rejection, anything else is treated
/// as the engine being unavailable.
pub struct HttpOrderExecutor {
    client: reqwest::Client,
    url: String,
}

impl HttpOrderExecutor {
    pub fn new(url: String, timeout: Duration) -> Result<Self, ExecutorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExecutorError::Unavailable(format!("HTTP client error: {}", e)))?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl OrderExecutor for HttpOrderExecutor {
    async fn execute(&self, intent: &OrderIntent) -> Result<ExecutionReport, ExecutorError> {
        let response = self
            .client
            .post(&self.url)
            .json(intent)
            .send()
            .await
            .map_err(|e| ExecutorError::Unavailable(format!("Request failed: {}", e)))?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExecutorError::Rejected(format!("{}: {}", status, body)));
        }
        if !status.is_success() {
            return Err(ExecutorError::Unavailable(format!("status {}", status)));
        }

        response
            .json::<ExecutionReport>()
            .await
            .map_err(|e| ExecutorError::Unavailable(format!("Invalid response body: {}", e)))
    }
}

/// Simulated fills; no market is touched.
#[derive(Debug, Default)]
pub struct PaperExecutor;

#[async_trait]
impl OrderExecutor for PaperExecutor {
    async fn execute(&self, intent: &OrderIntent) -> Result<ExecutionReport, ExecutorError> {
        Ok(ExecutionReport {
            order_id: format!("paper-{}", Uuid::new_v4()),
            executed_price: intent.price,
            executed_quantity: Some(intent.quantity),
        })
    }
}
