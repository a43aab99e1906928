//! Fixed-window rate limiting for webhook ingress, keyed by client IP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dashmap::DashMap;
use metrics::counter;
use tracing::warn;

use crate::api::{AppState, ErrorResponse};

/// Fixed-window counter per client.
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    /// client -> (window start, requests in window)
    windows: DashMap<String, (Instant, u32)>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: DashMap::new(),
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    /// Count one request from `client`. `false` once the window is full.
    pub fn check(&self, client: &str) -> bool {
        let now = Instant::now();
        let mut entry = self
            .windows
            .entry(client.to_string())
            .or_insert((now, 0));
        let (started, count) = entry.value_mut();

        if now.duration_since(*started) >= self.window {
            *started = now;
            *count = 0;
        }

        if *count >= self.limit {
            return false;
        }
        *count += 1;
        true
    }

    /// Drop windows that have already ended.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.windows
            .retain(|_, (started, _)| now.duration_since(*started) < self.window);
    }
}

/// Middleware rejecting clients over their webhook budget with 429.
pub async fn webhook_rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    if !state.rate_limiter.check(&client) {
        warn!(client = %client, "Webhook rate limit exceeded");
        counter!("webhooks_rejected_total", "reason" => "rate_limited").increment(1);
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorResponse::new("Too many requests")),
        )
            .into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_per_client() {
        let limiter = RateLimiter::per_minute(2);

        assert!(limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.1"));
        assert!(!limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.2"));
    }

    #[test]
    fn test_window_resets() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));

        assert!(limiter.check("10.0.0.1"));
        assert!(!limiter.check("10.0.0.1"));
        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.check("10.0.0.1"));
    }

    #[test]
    fn test_purge_expired() {
        let limiter = RateLimiter::new(5, Duration::from_millis(10));
        limiter.check("10.0.0.1");
        std::thread::sleep(Duration::from_millis(20));

        limiter.purge_expired();
        assert!(limiter.windows.is_empty());
    }
}
