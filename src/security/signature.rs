//! HMAC-SHA256 request signatures.
//!
//! # Canonical message
//!
//! All top-level fields of the JSON body except `signature`, sorted by key
//! and rendered as `key=value`, joined with `&`:
//!
//! ```text
//! action=buy&apiKey=whk_...&price=60000&quantity=0.05&symbol=BTC&timestamp=1767225600
//! ```
//!
//! String values are used as-is. Any other value is rendered as compact JSON
//! (`60000`, `0.05`, `true`, `null`), so sender and verifier must agree on
//! the numeric text they put on the wire.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Field carrying the signature itself; never part of the signed message.
pub const SIGNATURE_FIELD: &str = "signature";

/// Build the canonical signing string of a payload.
///
/// Returns `None` when the payload is not a JSON object.
pub fn canonicalize(payload: &serde_json::Value) -> Option<String> {
    let fields = payload.as_object()?;

    let mut entries: Vec<(&String, &serde_json::Value)> = fields
        .iter()
        .filter(|(key, _)| key.as_str() != SIGNATURE_FIELD)
        .collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let message = entries
        .into_iter()
        .map(|(key, value)| format!("{}={}", key, render_value(value)))
        .collect::<Vec<_>>()
        .join("&");

    Some(message)
}

fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Hex HMAC-SHA256 of the canonical form of `payload`.
pub fn sign(payload: &serde_json::Value, secret: &str) -> Option<String> {
    let message = canonicalize(payload)?;
    let mac = keyed_mac(secret, &message);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Verify `provided_signature` against the payload.
///
/// Never errors: a payload that is not an object, a signature that is not
/// hex, or a length mismatch all yield `false`. The final comparison is
/// constant time (`Mac::verify_slice`).
pub fn verify(payload: &serde_json::Value, provided_signature: &str, secret: &str) -> bool {
    let Some(message) = canonicalize(payload) else {
        return false;
    };
    let Ok(provided) = hex::decode(provided_signature.trim()) else {
        return false;
    };

    keyed_mac(secret, &message).verify_slice(&provided).is_ok()
}

fn keyed_mac(secret: &str, message: &str) -> HmacSha256 {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC key length is valid");
    mac.update(message.as_bytes());
    mac
}
