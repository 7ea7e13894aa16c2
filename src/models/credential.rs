//! Webhook credential models.
//!
//! A credential is issued once per webhook endpoint. The caller receives a
//! public identifier (the "API key") and a secret used to sign requests.
//!
//! # Storage
//!
//! - The public identifier is never stored; only its SHA-256 `lookup_hash`
//!   and an 8-character display prefix are persisted.
//! - The secret is stored AES-256-GCM encrypted (see `security::vault`),
//!   because signature verification needs the plaintext back.
//! - Credentials created under the old hash-only scheme carry
//!   `CredentialSecret::LegacyHash` and can never be verified.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Trading limits attached to a credential.
///
/// # JSON Example
///
/// ```json
/// {
///   "allowedSymbols": ["BTC", "ETH"],
///   "maxOrderSize": 5000.0,
///   "dailyLimit": 10000.0,
///   "requireStopLoss": true
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    /// Symbols this credential may trade. Empty means unrestricted.
    #[serde(default)]
    pub allowed_symbols: BTreeSet<String>,

    /// Maximum notional of a single order.
    pub max_order_size: f64,

    /// Maximum cumulative notional of successful orders per UTC day.
    pub daily_limit: f64,

    /// Whether every order must carry a stop loss.
    #[serde(default)]
    pub require_stop_loss: bool,
}

impl Policy {
    /// Normalise symbols and check that limits are usable.
    ///
    /// Symbols are trimmed and upper-cased so that `btc` and `BTC ` match
    /// the same allow-list entry.
    pub fn normalized(self) -> Result<Self, String> {
        if !self.max_order_size.is_finite() || self.max_order_size <= 0.0 {
            return Err("maxOrderSize must be a positive number".to_string());
        }
        if !self.daily_limit.is_finite() || self.daily_limit <= 0.0 {
            return Err("dailyLimit must be a positive number".to_string());
        }

        let mut allowed_symbols = BTreeSet::new();
        for symbol in self.allowed_symbols {
            let symbol = normalize_symbol(&symbol);
            if symbol.is_empty() {
                return Err("allowedSymbols must not contain empty entries".to_string());
            }
            allowed_symbols.insert(symbol);
        }

        Ok(Self {
            allowed_symbols,
            ..self
        })
    }
}

/// Canonical symbol form used for allow-list comparisons.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}

/// Encrypted secret as persisted: base64 ciphertext (tag appended) and nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedSecret {
    pub ciphertext: String,
    pub nonce: String,
}

/// How a credential's secret is held at rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSecret {
    /// Reversibly encrypted under the master key.
    Sealed(SealedSecret),

    /// One-way hash from the old scheme. Cannot be used to verify a
    /// signature; the credential has to be re-issued.
    LegacyHash(String),
}

/// A webhook credential record.
#[derive(Debug, Clone)]
pub struct Credential {
    pub id: Uuid,

    /// Account that issued (and owns) this credential
    pub account_id: Uuid,

    pub name: String,

    /// SHA-256 hex digest of the public identifier (index column)
    pub lookup_hash: String,

    /// First characters of the public identifier, for display only
    pub key_prefix: String,

    pub secret: CredentialSecret,

    pub enabled: bool,

    pub policy: Policy,

    pub execution_count: i64,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to issue a new credential.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueCredentialRequest {
    pub name: String,
    pub policy: Policy,
}

/// Partial update of a credential. Never touches the key material.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCredentialRequest {
    pub name: Option<String>,
    pub enabled: Option<bool>,
    pub policy: Option<Policy>,
}

/// Credential as returned to the dashboard.
///
/// `public_id` and `secret` are only populated in the issuance response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialResponse {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    pub key_prefix: String,
    pub enabled: bool,
    pub needs_rotation: bool,
    pub policy: Policy,
    pub execution_count: i64,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Credential> for CredentialResponse {
    fn from(credential: Credential) -> Self {
        Self {
            id: credential.id,
            name: credential.name,
            public_id: None,
            secret: None,
            key_prefix: credential.key_prefix,
            enabled: credential.enabled,
            needs_rotation: matches!(credential.secret, CredentialSecret::LegacyHash(_)),
            policy: credential.policy,
            execution_count: credential.execution_count,
            last_executed_at: credential.last_executed_at,
            created_at: credential.created_at,
            updated_at: credential.updated_at,
        }
    }
}

impl CredentialResponse {
    /// Attach the one-time key material (issuance only).
    pub fn with_key_material(mut self, public_id: String, secret: String) -> Self {
        self.public_id = Some(public_id);
        self.secret = Some(secret);
        self
    }
}
