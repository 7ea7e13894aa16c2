//! Inbound webhook endpoint called by alert senders.
//!
//! `POST /api/v1/webhook` with a signed JSON order. The body is read as raw
//! bytes so that a malformed body gets the same JSON error envelope as every
//! other failure, so that senders which post `text/plain` still work, and so
//! that the audit log keeps the body exactly as it was sent.

use axum::{Json, body::Bytes, extract::State};
use chrono::Utc;

use crate::error::AppError;
use crate::models::order::WebhookSuccess;
use crate::state::AppState;

/// Receive a webhook order.
///
/// # Request Body
///
/// ```json
/// {
///   "action": "buy",
///   "symbol": "BTC",
///   "quantity": 0.05,
///   "price": 60000,
///   "stopLoss": 58000,
///   "apiKey": "whk_...",
///   "timestamp": 1767225600,
///   "signature": "hex hmac-sha256 of the canonical message"
/// }
/// ```
///
/// # Response (200)
///
/// ```json
/// {
///   "success": true,
///   "orderId": "paper-6f0c...",
///   "executedPrice": 60000.0,
///   "executedQuantity": 0.05,
///   "timestamp": 1767225601
/// }
/// ```
///
/// Failures use 400, 401, 403, 429 or 500 with a JSON error body.
pub async fn receive_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<WebhookSuccess>, AppError> {
    let received_at = Utc::now();

    let success = state.gateway.handle(&body, received_at).await?;

    Ok(Json(success))
}
