//! Multi-window rate limiting per (account, credential).
//!
//! Three rolling windows are checked, finest first: minute, hour, day. A
//! request is only charged if all three have room; a denial charges none,
//! so a caller retrying after a 429 is not penalised twice.
//!
//! Window lifecycle per kind: absent → active(1) → active(n) → expired.
//! An expired window is simply ignored and a new one is started on the next
//! request; old rows are reclaimed by [`RateLimiter::sweep`], but nothing
//! here depends on that sweep having run.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::models::rate_window::{RateDecision, RateWindow, WindowKind, WindowSpec};
use crate::store::{StoreError, WebhookStore};

/// Per-deployment limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    pub per_minute: i64,
    pub per_hour: i64,
    pub per_day: i64,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            per_minute: 10,
            per_hour: 100,
            per_day: 1000,
        }
    }
}

impl RateLimits {
    pub fn limit(&self, kind: WindowKind) -> i64 {
        match kind {
            WindowKind::Minute => self.per_minute,
            WindowKind::Hour => self.per_hour,
            WindowKind::Day => self.per_day,
        }
    }

    fn specs(&self) -> [WindowSpec; 3] {
        WindowKind::ALL.map(|kind| WindowSpec {
            kind,
            limit: self.limit(kind),
        })
    }
}

pub struct RateLimiter {
    store: Arc<dyn WebhookStore>,
    limits: RateLimits,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn WebhookStore>, limits: RateLimits) -> Self {
        Self { store, limits }
    }

    pub fn limits(&self) -> RateLimits {
        self.limits
    }

    /// Check every window and, if all have room, charge one request.
    pub async fn check_and_increment(
        &self,
        account_id: Uuid,
        credential_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<RateDecision, StoreError> {
        let decision = self
            .store
            .charge_rate_windows(account_id, credential_id, &self.limits.specs(), now)
            .await?;

        if let RateDecision::Denied { kind, retry_at } = decision {
            tracing::warn!(
                credential_id = %credential_id,
                window = %kind,
                retry_at = %retry_at,
                "Rate limit exceeded"
            );
        }

        Ok(decision)
    }

    /// Current counters of a credential.
    pub async fn usage(
        &self,
        account_id: Uuid,
        credential_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<RateWindow>, StoreError> {
        self.store
            .active_rate_windows(account_id, credential_id, now)
            .await
    }

    /// Delete windows that can no longer be active (older than a day).
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let longest = WindowKind::ALL
            .iter()
            .map(|kind| kind.duration())
            .max()
            .unwrap_or_else(|| Duration::days(1));
        self.store.purge_rate_windows(now - longest).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn limiter(limits: RateLimits) -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryStore::new()), limits)
    }

    /// Calls `limit + 1` times; expects exactly `limit` passes.
    async fn exhaust(limiter: &RateLimiter, kind: WindowKind, now: DateTime<Utc>) {
        let (account, credential) = (Uuid::new_v4(), Uuid::new_v4());
        let limit = limiter.limits().limit(kind);

        let mut allowed = 0;
        let mut denied = Vec::new();
        for _ in 0..=limit {
            match limiter
                .check_and_increment(account, credential, now)
                .await
                .unwrap()
            {
                RateDecision::Allowed => allowed += 1,
                RateDecision::Denied { kind, .. } => denied.push(kind),
            }
        }

        assert_eq!(allowed, limit);
        assert_eq!(denied, vec![kind]);
    }

    #[tokio::test]
    async fn minute_window_trips_first() {
        let limiter = limiter(RateLimits::default());
        exhaust(&limiter, WindowKind::Minute, Utc::now()).await;
    }

    #[tokio::test]
    async fn hour_window_trips_independently() {
        let limiter = limiter(RateLimits {
            per_minute: 100,
            per_hour: 5,
            per_day: 100,
        });
        exhaust(&limiter, WindowKind::Hour, Utc::now()).await;
    }

    #[tokio::test]
    async fn day_window_trips_independently() {
        let limiter = limiter(RateLimits {
            per_minute: 100,
            per_hour: 100,
            per_day: 7,
        });
        exhaust(&limiter, WindowKind::Day, Utc::now()).await;
    }

    #[tokio::test]
    async fn minute_denial_does_not_charge_hour_or_day() {
        let limiter = limiter(RateLimits {
            per_minute: 2,
            per_hour: 100,
            per_day: 100,
        });
        let (account, credential) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();

        for _ in 0..5 {
            limiter
                .check_and_increment(account, credential, now)
                .await
                .unwrap();
        }

        let usage = limiter.usage(account, credential, now).await.unwrap();
        let hour = usage.iter().find(|w| w.kind == WindowKind::Hour).unwrap();
        let day = usage.iter().find(|w| w.kind == WindowKind::Day).unwrap();
        assert_eq!(hour.count, 2);
        assert_eq!(day.count, 2);
    }

    #[tokio::test]
    async fn new_minute_window_after_expiry() {
        let limiter = limiter(RateLimits {
            per_minute: 1,
            per_hour: 100,
            per_day: 100,
        });
        let (account, credential) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();

        assert_eq!(
            limiter.check_and_increment(account, credential, now).await.unwrap(),
            RateDecision::Allowed
        );
        let denied = limiter
            .check_and_increment(account, credential, now + Duration::seconds(30))
            .await
            .unwrap();
        assert_eq!(
            denied,
            RateDecision::Denied {
                kind: WindowKind::Minute,
                retry_at: now + Duration::minutes(1),
            }
        );
        assert_eq!(
            limiter
                .check_and_increment(account, credential, now + Duration::seconds(61))
                .await
                .unwrap(),
            RateDecision::Allowed
        );
    }

    #[tokio::test]
    async fn credentials_are_counted_separately() {
        let limiter = limiter(RateLimits {
            per_minute: 1,
            per_hour: 100,
            per_day: 100,
        });
        let account = Uuid::new_v4();
        let now = Utc::now();

        for _ in 0..3 {
            assert_eq!(
                limiter
                    .check_and_increment(account, Uuid::new_v4(), now)
                    .await
                    .unwrap(),
                RateDecision::Allowed
            );
        }
    }

    #[tokio::test]
    async fn concurrent_burst_never_over_admits() {
        let limiter = Arc::new(limiter(RateLimits::default()));
        let (account, credential) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    limiter.check_and_increment(account, credential, now).await
                })
            })
            .collect();

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() == RateDecision::Allowed {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 10);
    }

    #[tokio::test]
    async fn sweep_removes_day_old_windows() {
        let limiter = limiter(RateLimits::default());
        let (account, credential) = (Uuid::new_v4(), Uuid::new_v4());
        let then = Utc::now() - Duration::days(2);

        limiter
            .check_and_increment(account, credential, then)
            .await
            .unwrap();
        assert_eq!(limiter.sweep(Utc::now()).await.unwrap(), 3);
    }
}
