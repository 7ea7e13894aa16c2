//! Error types and HTTP error response handling.
//!
//! This module defines every error the service returns to a caller and how
//! each one is converted into an HTTP response.

use axum::{
    Json,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::models::rate_window::WindowKind;
use crate::security::vault::VaultError;
use crate::services::executor::ExecutorError;
use crate::services::policy::DenialReason;
use crate::store::StoreError;

/// Why an inbound webhook request could not be authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// Timestamp outside the replay window (either direction)
    StaleTimestamp,
    /// No credential for the presented public identifier
    UnknownApiKey,
    /// HMAC did not match
    InvalidSignature,
    /// Stored secret could not be decrypted
    AuthenticationFailed,
    /// Credential predates encrypted secrets and cannot be verified
    CredentialNeedsRotation,
}

impl AuthFailure {
    pub fn code(&self) -> &'static str {
        match self {
            AuthFailure::StaleTimestamp => "stale_timestamp",
            AuthFailure::UnknownApiKey => "unknown_api_key",
            AuthFailure::InvalidSignature => "invalid_signature",
            AuthFailure::AuthenticationFailed => "authentication_failed",
            AuthFailure::CredentialNeedsRotation => "credential_needs_rotation",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            AuthFailure::StaleTimestamp => "Request timestamp is outside the allowed window",
            AuthFailure::UnknownApiKey => "Unknown API key",
            AuthFailure::InvalidSignature => "Invalid signature",
            AuthFailure::AuthenticationFailed => "Authentication failed",
            AuthFailure::CredentialNeedsRotation => {
                "Webhook credential must be rotated before it can be used"
            }
        }
    }
}

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Validation**: malformed request body (400)
/// - **Authentication**: stale timestamp, bad signature, unknown key (401)
/// - **Policy**: disabled webhook, symbol, size, daily limit (403)
/// - **Rate limiting**: a window is exhausted (429)
/// - **Dependencies**: storage or executor failure (500, details hidden)
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// Dashboard account key is missing, invalid, or inactive.
    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Webhook not found")]
    WebhookNotFound,

    #[error("Invalid request")]
    InvalidRequest(String),

    #[error("{}", .0.message())]
    Unauthorized(AuthFailure),

    #[error("{}", .0.message())]
    PolicyDenied(DenialReason),

    /// `retry_after_secs` is the time until the tripped window expires.
    #[error("Rate limit exceeded for {window} window")]
    RateLimited {
        window: WindowKind,
        retry_after_secs: i64,
    },

    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<VaultError> for AppError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::Decryption => AppError::Unauthorized(AuthFailure::AuthenticationFailed),
            VaultError::NeedsRotation => {
                AppError::Unauthorized(AuthFailure::CredentialNeedsRotation)
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PolicyDenied(DenialReason::StopLossRequired) => StatusCode::BAD_REQUEST,
            AppError::InvalidApiKey | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::PolicyDenied(_) => StatusCode::FORBIDDEN,
            AppError::WebhookNotFound => StatusCode::NOT_FOUND,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Storage(_) | AppError::Executor(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::InvalidApiKey => "invalid_api_key",
            AppError::WebhookNotFound => "webhook_not_found",
            AppError::Unauthorized(failure) => failure.code(),
            AppError::PolicyDenied(reason) => reason.code(),
            AppError::RateLimited { .. } => "rate_limit_exceeded",
            AppError::Storage(_) | AppError::Executor(_) | AppError::Internal(_) => {
                "internal_error"
            }
        }
    }

    /// Message safe to show a caller. Internal details are never included.
    pub fn public_message(&self) -> String {
        match self {
            AppError::InvalidRequest(msg) => msg.clone(),
            AppError::Storage(_) | AppError::Executor(_) | AppError::Internal(_) => {
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        }
    }

    /// JSON body returned to the caller (and stored in the audit log).
    ///
    /// ```json
    /// {
    ///   "success": false,
    ///   "error": {
    ///     "code": "order_too_large",
    ///     "message": "Order exceeds the maximum order size"
    ///   }
    /// }
    /// ```
    pub fn body(&self) -> serde_json::Value {
        let mut error = json!({
            "code": self.code(),
            "message": self.public_message(),
        });
        if let AppError::RateLimited { window, .. } = self {
            error["window"] = json!(window.as_str());
        }

        json!({
            "success": false,
            "error": error
        })
    }
}

/// Convert AppError into an HTTP response.
///
/// 429 responses also carry `Retry-After` and `X-RateLimit-Window`.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Storage(ref e) = self {
            tracing::error!("Storage failure: {}", e);
        }

        let mut response = (self.status(), Json(self.body())).into_response();

        if let AppError::RateLimited {
            window,
            retry_after_secs,
        } = self
        {
            let headers = response.headers_mut();
            headers.insert("Retry-After", HeaderValue::from(retry_after_secs.max(1)));
            headers.insert(
                "X-RateLimit-Window",
                HeaderValue::from_static(window.as_str()),
            );
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            AppError::InvalidRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Unauthorized(AuthFailure::StaleTimestamp).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::PolicyDenied(DenialReason::SymbolNotAllowed).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::PolicyDenied(DenialReason::StopLossRequired).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::RateLimited {
                window: WindowKind::Hour,
                retry_after_secs: 10
            }
            .status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AppError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn decrypt_failure_reveals_nothing() {
        let err = AppError::from(VaultError::Decryption);
        assert_eq!(err.code(), "authentication_failed");
        assert_eq!(err.public_message(), "Authentication failed");
    }

    #[test]
    fn internal_details_are_hidden() {
        let err = AppError::Internal("connection refused at 10.0.0.3".into());
        assert_eq!(err.body()["error"]["message"], "An internal error occurred");
    }

    #[test]
    fn rate_limit_response_headers() {
        let response = AppError::RateLimited {
            window: WindowKind::Minute,
            retry_after_secs: 42,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["Retry-After"], "42");
        assert_eq!(response.headers()["X-RateLimit-Window"], "minute");
    }
}
