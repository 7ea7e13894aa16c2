//! Rate-limit window models.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Granularity of a rate-limit window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WindowKind {
    Minute,
    Hour,
    Day,
}

impl WindowKind {
    /// Evaluation order: finest granularity first.
    pub const ALL: [WindowKind; 3] = [WindowKind::Minute, WindowKind::Hour, WindowKind::Day];

    pub fn duration(&self) -> Duration {
        match self {
            WindowKind::Minute => Duration::minutes(1),
            WindowKind::Hour => Duration::hours(1),
            WindowKind::Day => Duration::days(1),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WindowKind::Minute => "minute",
            WindowKind::Hour => "hour",
            WindowKind::Day => "day",
        }
    }
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limit for one window kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    pub kind: WindowKind,
    pub limit: i64,
}

/// A persisted counter row.
///
/// Unique on `(account_id, credential_id, kind, window_start)`. A window is
/// active while `now - window_start < duration(kind)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateWindow {
    pub account_id: Uuid,
    pub credential_id: Uuid,
    pub kind: WindowKind,
    pub window_start: DateTime<Utc>,
    pub count: i64,
}

impl RateWindow {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.window_start + self.kind.duration()
    }
}

/// Outcome of charging one request against all windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Denied {
        kind: WindowKind,
        retry_at: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_expires_after_its_duration() {
        let start = Utc::now();
        let window = RateWindow {
            account_id: Uuid::new_v4(),
            credential_id: Uuid::new_v4(),
            kind: WindowKind::Hour,
            window_start: start,
            count: 3,
        };

        assert_eq!(window.expires_at(), start + Duration::hours(1));
    }

    #[test]
    fn kinds_are_ordered_finest_first() {
        assert_eq!(
            WindowKind::ALL.map(|k| k.as_str()),
            ["minute", "hour", "day"]
        );
        assert_eq!(WindowKind::Day.to_string(), "day");
    }
}
