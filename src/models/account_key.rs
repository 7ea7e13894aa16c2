//! Account key model for dashboard authentication.
//!
//! Account keys authenticate the dashboard calls that issue and manage
//! webhook credentials. They are stored as SHA-256 hashes.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Represents an account key record.
///
/// # Database Table
///
/// Maps to the `account_keys` table with columns:
/// - `id`: Unique identifier (UUID)
/// - `account_id`: Trading account this key acts for
/// - `key_hash`: SHA-256 hash of the actual key
/// - `label`: Human-readable label
/// - `created_at`: When the key was created
/// - `is_active`: Whether the key is currently valid
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AccountKey {
    pub id: Uuid,

    /// Account that owns every credential issued with this key
    pub account_id: Uuid,

    /// SHA-256 hash of the key (64 hex characters)
    pub key_hash: String,

    pub label: String,

    pub created_at: DateTime<Utc>,

    /// Inactive keys are rejected during authentication.
    pub is_active: bool,
}
