//! Inbound webhook order payloads.
//!
//! The request body is a flat JSON object. It is read twice:
//!
//! 1. As a raw `serde_json::Value`, which is what gets canonicalized and
//!    signed (every field the sender put in, except `signature`).
//! 2. As the typed structs below, once the signature checks out.
//!
//! Alert platforms often template numbers into strings, so numeric fields
//! accept both `0.05` and `"0.05"`.

use serde::{Deserialize, Deserializer, Serialize};

use crate::models::credential::normalize_symbol;

fn deserialize_flexible_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FlexibleFloat {
        Float(f64),
        Int(i64),
        Str(String),
    }

    match FlexibleFloat::deserialize(deserializer)? {
        FlexibleFloat::Float(f) => Ok(f),
        FlexibleFloat::Int(i) => Ok(i as f64),
        FlexibleFloat::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn deserialize_optional_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FlexibleOptFloat {
        None,
        Float(f64),
        Int(i64),
        Str(String),
    }

    match Option::<FlexibleOptFloat>::deserialize(deserializer)? {
        None | Some(FlexibleOptFloat::None) => Ok(None),
        Some(FlexibleOptFloat::Float(f)) => Ok(Some(f)),
        Some(FlexibleOptFloat::Int(i)) => Ok(Some(i as f64)),
        Some(FlexibleOptFloat::Str(s)) if s.trim().is_empty() => Ok(None),
        Some(FlexibleOptFloat::Str(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FlexibleInt {
        Int(i64),
        Str(String),
    }

    match FlexibleInt::deserialize(deserializer)? {
        FlexibleInt::Int(i) => Ok(i),
        FlexibleInt::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Authentication fields every inbound request must carry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedEnvelope {
    /// Public identifier of the credential
    pub api_key: String,

    /// Hex HMAC-SHA256 over the canonical message
    pub signature: String,

    /// Seconds since the Unix epoch
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
}

/// Order fields of an inbound webhook request.
///
/// # JSON Example
///
/// ```json
/// {
///   "action": "buy",
///   "symbol": "BTC",
///   "quantity": 0.05,
///   "price": 60000,
///   "orderType": "limit",
///   "stopLoss": 58000,
///   "apiKey": "whk_...",
///   "signature": "9f2c...",
///   "timestamp": 1767225600
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookOrder {
    pub action: Action,

    pub symbol: String,

    #[serde(deserialize_with = "deserialize_flexible_f64")]
    pub quantity: f64,

    #[serde(default, deserialize_with = "deserialize_optional_f64")]
    pub price: Option<f64>,

    #[serde(default)]
    pub order_type: Option<OrderType>,

    #[serde(default, deserialize_with = "deserialize_optional_f64")]
    pub stop_loss: Option<f64>,

    #[serde(default, deserialize_with = "deserialize_optional_f64")]
    pub take_profit: Option<f64>,
}

impl WebhookOrder {
    /// Parse and validate the order fields of a raw request body.
    pub fn from_payload(payload: &serde_json::Value) -> Result<Self, String> {
        let order: WebhookOrder = serde_json::from_value(payload.clone())
            .map_err(|e| format!("Invalid order payload: {}", e))?;
        order.validated()
    }

    fn validated(mut self) -> Result<Self, String> {
        self.symbol = normalize_symbol(&self.symbol);
        if self.symbol.is_empty() {
            return Err("symbol must not be empty".to_string());
        }

        if !self.quantity.is_finite() || self.quantity <= 0.0 {
            return Err("quantity must be a positive number".to_string());
        }

        if let Some(price) = self.price {
            if !price.is_finite() || price <= 0.0 {
                return Err("price must be a positive number".to_string());
            }
        }

        for (field, value) in [("stopLoss", self.stop_loss), ("takeProfit", self.take_profit)] {
            if let Some(value) = value {
                if !value.is_finite() {
                    return Err(format!("{} must be a finite number", field));
                }
            }
        }

        if self.order_type == Some(OrderType::Limit) && self.price.is_none() {
            return Err("limit orders require a price".to_string());
        }

        Ok(self)
    }

    /// Monetary value of the order.
    ///
    /// With no reference price (a bare market order) the quantity itself is
    /// taken as the notional, so a priceless order is still sized against
    /// the limits instead of counting as zero.
    pub fn notional(&self) -> f64 {
        match self.price {
            Some(price) => self.quantity * price,
            None => self.quantity,
        }
    }
}

/// Validated order handed to the executor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderIntent {
    pub credential_id: uuid::Uuid,
    pub account_id: uuid::Uuid,
    pub action: Action,
    pub symbol: String,
    pub quantity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    pub order_type: OrderType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<f64>,
}

/// Success body of the inbound webhook call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookSuccess {
    pub success: bool,
    pub order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_quantity: Option<f64>,
    pub timestamp: i64,
}
