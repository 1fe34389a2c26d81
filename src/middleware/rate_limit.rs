// src/middleware/rate_limit.rs - Fixed-window throttling per client address
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::ApiError;
use crate::utils::client::ClientAddress;
use crate::AppState;

#[derive(Clone)]
pub struct RateLimiter {
    requests: Arc<RwLock<HashMap<String, RateLimitEntry>>>,
    max_requests: usize,
    window: Duration,
}

struct RateLimitEntry {
    count: usize,
    /// Epoch millis at which the current window closes.
    reset_at: i64,
}

/// Where a client stands in its current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: usize,
    pub remaining: usize,
    pub reset_at: i64,
}

impl RateLimitStatus {
    fn apply(&self, headers: &mut HeaderMap) {
        headers.insert("x-ratelimit-limit", HeaderValue::from(self.limit));
        headers.insert("x-ratelimit-remaining", HeaderValue::from(self.remaining));
        headers.insert("x-ratelimit-reset", HeaderValue::from(self.reset_at));
    }
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            requests: Arc::new(RwLock::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    /// Count one request for `key`. `Err` carries the status of a client over its limit.
    pub async fn check(&self, key: &str) -> Result<RateLimitStatus, RateLimitStatus> {
        let now = Utc::now().timestamp_millis();
        let window_ms = i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX);

        let mut requests = self.requests.write().await;
        let entry = requests.entry(key.to_string()).or_insert(RateLimitEntry {
            count: 0,
            reset_at: now.saturating_add(window_ms),
        });

        // Reset window if expired
        if entry.reset_at <= now {
            entry.count = 0;
            entry.reset_at = now.saturating_add(window_ms);
        }

        if entry.count >= self.max_requests {
            return Err(RateLimitStatus {
                limit: self.max_requests,
                remaining: 0,
                reset_at: entry.reset_at,
            });
        }

        entry.count += 1;
        Ok(RateLimitStatus {
            limit: self.max_requests,
            remaining: self.max_requests - entry.count,
            reset_at: entry.reset_at,
        })
    }

    /// Drop entries whose window has closed. Returns how many were removed.
    pub async fn cleanup(&self) -> usize {
        let now = Utc::now().timestamp_millis();
        let mut requests = self.requests.write().await;
        let before = requests.len();
        requests.retain(|_, entry| entry.reset_at > now);
        before - requests.len()
    }

    /// Run `cleanup` once per window, forever.
    pub async fn start_cleanup(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.window);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            let removed = self.cleanup().await;
            if removed > 0 {
                tracing::debug!(removed, "Expired rate limit entries removed");
            }
        }
    }
}

pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    ClientAddress(address): ClientAddress,
    request: Request,
    next: Next,
) -> Response {
    match state.rate_limiter.check(&address).await {
        Ok(status) => {
            tracing::debug!(
                %address,
                remaining = status.remaining,
                reset_at = status.reset_at,
                "Rate limit status"
            );
            let mut response = next.run(request).await;
            status.apply(response.headers_mut());
            response
        }
        Err(status) => {
            tracing::warn!(
                %address,
                path = %request.uri().path(),
                "Rate limit exceeded"
            );
            let mut response = ApiError::TooManyRequests {
                reset_at: status.reset_at,
            }
            .into_response();
            status.apply(response.headers_mut());
            response
        }
    }
}
