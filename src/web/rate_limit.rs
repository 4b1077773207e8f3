//! Fixed-window request admission control, keyed by client address.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

pub const DEFAULT_MAX_REQUESTS: u32 = 100;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Whether a request may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// Over the limit; the window resets after `retry_after`.
    Limited { retry_after: Duration },
}

#[cfg(test)]
impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

#[derive(Debug, Clone, Copy)]
struct RateLimitRecord {
    count: u32,
    reset_time: Instant,
}

struct Inner {
    records: HashMap<String, RateLimitRecord>,
    last_sweep: Instant,
}

/// Per-client fixed-window counter.
///
/// Approximate by construction: counts reset at window boundaries rather
/// than sliding. Expired records are swept at most once per window.
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    inner: Mutex<Inner>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            inner: Mutex::new(Inner {
                records: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    /// Count a request from `key` and decide whether it may proceed.
    pub fn check(&self, key: &str) -> Admission {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Admission {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        if now.saturating_duration_since(inner.last_sweep) >= self.window {
            inner.records.retain(|_, r| r.reset_time >= now);
            inner.last_sweep = now;
        }

        let fresh = RateLimitRecord {
            count: 1,
            reset_time: now + self.window,
        };

        let record = match inner.records.get_mut(key) {
            Some(record) => record,
            None => {
                inner.records.insert(key.to_string(), fresh);
                return Admission::Allowed;
            }
        };

        if now > record.reset_time {
            *record = fresh;
            return Admission::Allowed;
        }

        record.count = record.count.saturating_add(1);
        if record.count > self.max_requests {
            return Admission::Limited {
                retry_after: record.reset_time.saturating_duration_since(now),
            };
        }

        Admission::Allowed
    }

    #[cfg(test)]
    fn count_for(&self, key: &str) -> Option<u32> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.records.get(key).map(|r| r.count)
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.records.len()
    }
}

#[derive(Serialize)]
struct RateLimitedBody {
    success: bool,
    error: &'static str,
    message: &'static str,
}

/// Middleware rejecting clients over their limit with 429 and `Retry-After`.
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    match limiter.check(&client) {
        Admission::Allowed => next.run(request).await,
        Admission::Limited { retry_after } => {
            tracing::warn!("Rate limit exceeded for client: {}", client);

            let retry_secs = retry_after.as_millis().div_ceil(1000);
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_secs.to_string())],
                Json(RateLimitedBody {
                    success: false,
                    error: "Too Many Requests",
                    message: "Rate limit exceeded. Please try again later.",
                }),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_request_over_limit() {
        let limiter = RateLimiter::new(60, DEFAULT_WINDOW);
        let start = Instant::now();

        for i in 0..60 {
            let now = start + Duration::from_millis(i * 500);
            assert!(limiter.check_at("10.0.0.1", now).is_allowed(), "request {}", i + 1);
        }

        let now = start + Duration::from_secs(31);
        match limiter.check_at("10.0.0.1", now) {
            Admission::Limited { retry_after } => {
                assert!(retry_after <= Duration::from_secs(60));
                assert_eq!(retry_after, Duration::from_secs(29));
            }
            Admission::Allowed => panic!("61st request was admitted"),
        }
    }

    #[test]
    fn test_window_resets_to_fresh_count() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();

        assert!(limiter.check_at("a", start).is_allowed());
        assert!(limiter.check_at("a", start).is_allowed());
        assert!(!limiter.check_at("a", start + Duration::from_secs(10)).is_allowed());

        // Exactly at the reset time the old window still applies.
        assert!(!limiter.check_at("a", start + Duration::from_secs(60)).is_allowed());

        assert!(limiter.check_at("a", start + Duration::from_secs(61)).is_allowed());
        assert_eq!(limiter.count_for("a"), Some(1));
    }

    #[test]
    fn test_default_matches_server_config() {
        let cfg = crate::config::ServerConfig::default();
        let limiter = RateLimiter::default();
        assert_eq!(limiter.max_requests, cfg.rate_limit_max);
        assert_eq!(limiter.window, cfg.rate_limit_window);
    }

    #[test]
    fn test_clients_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.check_at("a", now).is_allowed());
        assert!(!limiter.check_at("a", now).is_allowed());
        assert!(limiter.check_at("b", now).is_allowed());
    }

    #[test]
    fn test_expired_clients_are_swept() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));
        let start = Instant::now();

        for i in 0..100 {
            limiter.check_at(&format!("client-{}", i), start);
        }
        assert_eq!(limiter.tracked_clients(), 100);

        limiter.check_at("late", start + Duration::from_secs(120));
        assert_eq!(limiter.tracked_clients(), 1);
        assert_eq!(limiter.count_for("late"), Some(1));
    }
}
