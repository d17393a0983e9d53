//! Nexus Mods API quota tracking

use chrono::{DateTime, Duration, FixedOffset, Utc};
use reqwest::header::HeaderMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    pub hourly_remaining: Option<u32>,
    pub daily_remaining: Option<u32>,
    pub hourly_reset: Option<DateTime<Utc>>,
    pub daily_reset: Option<DateTime<Utc>>,
}

impl RateLimitSnapshot {
    /// No quota left in a window that has not reset yet
    pub fn is_exhausted(&self, now: DateTime<Utc>) -> bool {
        let window_empty = |remaining: Option<u32>, reset: Option<DateTime<Utc>>| {
            remaining == Some(0) && reset.map_or(true, |r| now < r)
        };
        window_empty(self.hourly_remaining, self.hourly_reset)
            || window_empty(self.daily_remaining, self.daily_reset)
    }
}

/// Remaining quota as last reported by the API
#[derive(Debug, Default)]
pub struct RateLimiter {
    state: Mutex<RateLimitSnapshot>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> RateLimitSnapshot {
        self.state.lock().map(|s| *s).unwrap_or_default()
    }

    pub fn record(&self, snapshot: RateLimitSnapshot) {
        if let Ok(mut state) = self.state.lock() {
            *state = snapshot;
        }
    }

    /// Update from `x-rl-*` response headers
    pub fn update_from_headers(&self, headers: &HeaderMap) {
        let text = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        let count = |name: &str| text(name).and_then(|v| v.trim().parse::<u32>().ok());

        let hourly_remaining = count("x-rl-hourly-remaining");
        let daily_remaining = count("x-rl-daily-remaining");
        if hourly_remaining.is_none() && daily_remaining.is_none() {
            return;
        }

        let snapshot = RateLimitSnapshot {
            hourly_remaining,
            daily_remaining,
            hourly_reset: text("x-rl-hourly-reset").and_then(parse_reset),
            daily_reset: text("x-rl-daily-reset").and_then(parse_reset),
        };
        tracing::debug!(
            "Nexus quota: {:?} hourly, {:?} daily remaining",
            snapshot.hourly_remaining,
            snapshot.daily_remaining
        );
        self.record(snapshot);
    }

    /// A 429 spends the hourly window even when the quota headers are missing
    pub fn record_throttled(&self, now: DateTime<Utc>) {
        if let Ok(mut state) = self.state.lock() {
            if state.is_exhausted(now) {
                return;
            }
            state.hourly_remaining = Some(0);
            state.hourly_reset = Some(
                state
                    .hourly_reset
                    .filter(|reset| *reset > now)
                    .unwrap_or(now + Duration::hours(1)),
            );
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.snapshot().is_exhausted(Utc::now())
    }
}

/// Reset times come as `2024-02-01 20:00:00 +0000` or RFC 3339
fn parse_reset(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::<FixedOffset>::parse_from_str(raw, "%Y-%m-%d %H:%M:%S %z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_headers_update_snapshot() {
        let limiter = RateLimiter::new();
        let mut headers = HeaderMap::new();
        headers.insert("x-rl-hourly-remaining", HeaderValue::from_static("0"));
        headers.insert("x-rl-daily-remaining", HeaderValue::from_static("2400"));
        headers.insert("x-rl-hourly-reset", HeaderValue::from_static("2999-01-01 00:00:00 +0000"));
        limiter.update_from_headers(&headers);

        let snapshot = limiter.snapshot();
        assert_eq!(snapshot.hourly_remaining, Some(0));
        assert_eq!(snapshot.daily_remaining, Some(2400));
        assert!(snapshot.hourly_reset.is_some());
        assert!(limiter.is_blocked());
    }

    #[test]
    fn test_quota_recovers_after_reset() {
        let now = Utc::now();
        let snapshot = RateLimitSnapshot {
            hourly_remaining: Some(0),
            daily_remaining: Some(10),
            hourly_reset: Some(now - Duration::minutes(1)),
            daily_reset: None,
        };
        assert!(!snapshot.is_exhausted(now));
        assert!(RateLimitSnapshot {
            daily_remaining: Some(0),
            ..snapshot
        }
        .is_exhausted(now));
    }

    #[test]
    fn test_unknown_quota_is_not_blocked() {
        let limiter = RateLimiter::new();
        limiter.update_from_headers(&HeaderMap::new());
        assert!(!limiter.is_blocked());
    }

    #[test]
    fn test_throttle_blocks_until_next_hour() {
        let limiter = RateLimiter::new();
        let now = Utc::now();
        limiter.record(RateLimitSnapshot {
            hourly_remaining: Some(40),
            daily_remaining: Some(900),
            hourly_reset: Some(now - Duration::minutes(5)),
            daily_reset: None,
        });

        limiter.record_throttled(now);
        let snapshot = limiter.snapshot();
        assert_eq!(snapshot.hourly_remaining, Some(0));
        assert_eq!(snapshot.daily_remaining, Some(900));
        assert_eq!(snapshot.hourly_reset, Some(now + Duration::hours(1)));
        assert!(snapshot.is_exhausted(now));
        assert!(!snapshot.is_exhausted(now + Duration::hours(2)));
    }

    #[test]
    fn test_parse_reset_formats() {
        assert!(parse_reset("2024-02-01 20:00:00 +0000").is_some());
        assert!(parse_reset("2024-02-01T20:00:00Z").is_some());
        assert!(parse_reset("soon").is_none());
    }
}
