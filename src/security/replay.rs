//! Replay protection: reject requests whose timestamp is too far from now.

use chrono::{DateTime, Duration, Utc};

/// Default tolerance either side of the server clock, in seconds.
pub const DEFAULT_WINDOW_SECS: i64 = 300;

/// Whether `request_timestamp` (seconds since epoch) lies within `window`
/// of `now`, in either direction.
///
/// Future timestamps are treated the same as stale ones. The boundary is
/// inclusive: a difference of exactly `window` is still fresh.
pub fn is_fresh(request_timestamp: i64, now: DateTime<Utc>, window: Duration) -> bool {
    let skew = now.timestamp().abs_diff(request_timestamp);
    let window_secs = window.num_seconds().max(0).unsigned_abs();
    skew <= window_secs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> Duration {
        Duration::seconds(DEFAULT_WINDOW_SECS)
    }

    #[test]
    fn current_request_is_fresh() {
        let now = Utc::now();
        assert!(is_fresh(now.timestamp(), now, window()));
        assert!(is_fresh(now.timestamp() - 299, now, window()));
        assert!(is_fresh(now.timestamp() - 300, now, window()));
    }

    #[test]
    fn stale_request_is_rejected() {
        let now = Utc::now();
        assert!(!is_fresh(now.timestamp() - 400, now, window()));
        assert!(!is_fresh(now.timestamp() - 301, now, window()));
    }

    #[test]
    fn future_request_is_rejected() {
        let now = Utc::now();
        assert!(!is_fresh(now.timestamp() + 400, now, window()));
        assert!(is_fresh(now.timestamp() + 60, now, window()));
    }

    #[test]
    fn extreme_timestamps_do_not_overflow() {
        let now = Utc::now();
        assert!(!is_fresh(i64::MIN, now, window()));
        assert!(!is_fresh(i64::MAX, now, window()));
    }
}
