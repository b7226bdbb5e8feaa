//! Client-side pacing for marketplace calls.
//!
//! A token bucket spreads requests out, and a cooldown set from `429`
//! responses holds every request back until the marketplace's `Retry-After`
//! has passed.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

/// Longest pause a single `429` can impose.
pub const MAX_COOLDOWN: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Sustained requests allowed per `window`.
    pub requests_per_window: u32,
    pub window: Duration,
    /// Requests that may go out back to back after an idle period.
    pub burst: u32,
}

impl RateLimitConfig {
    /// Conservative pacing for the app API, which publishes no quota.
    pub fn vinted() -> Self {
        Self {
            requests_per_window: 60,
            window: Duration::from_secs(60),
            burst: 10,
        }
    }

    fn tokens_per_second(&self) -> f64 {
        self.requests_per_window as f64 / self.window.as_secs_f64().max(1.0)
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
    cooldown_until: Option<Instant>,
}

impl Bucket {
    fn refill(&mut self, config: &RateLimitConfig, now: Instant) {
        let elapsed = now.saturating_duration_since(self.refilled_at).as_secs_f64();
        self.tokens = (self.tokens + elapsed * config.tokens_per_second()).min(config.burst as f64);
        self.refilled_at = now;
    }

    /// `None` when a request may go out now, otherwise the instant to retry at.
    fn try_take(&mut self, config: &RateLimitConfig, now: Instant) -> Option<Instant> {
        if let Some(until) = self.cooldown_until {
            if until > now {
                return Some(until);
            }
            self.cooldown_until = None;
        }

        self.refill(config, now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            None
        } else {
            let missing = 1.0 - self.tokens;
            Some(now + Duration::from_secs_f64(missing / config.tokens_per_second()))
        }
    }
}

/// Shared pacer; clones pace against the same bucket.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    bucket: Arc<Mutex<Bucket>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let config = RateLimitConfig {
            burst: config.burst.max(1),
            ..config
        };
        Self {
            bucket: Arc::new(Mutex::new(Bucket {
                tokens: config.burst as f64,
                refilled_at: Instant::now(),
                cooldown_until: None,
            })),
            config,
        }
    }

    /// Wait until a request may be sent. Returns how long the caller was held back.
    pub async fn acquire_permit(&self) -> Duration {
        let started = Instant::now();
        loop {
            let retry_at = self.bucket.lock().await.try_take(&self.config, Instant::now());
            match retry_at {
                None => return started.elapsed(),
                Some(at) => {
                    debug!("Pacing marketplace request for {:?}", at - Instant::now());
                    sleep_until(at).await;
                }
            }
        }
    }

    /// Hold back every request for `delay`, as asked by a `429` response.
    pub async fn cool_down(&self, delay: Duration) {
        let delay = delay.min(MAX_COOLDOWN);
        let Some(until) = Instant::now().checked_add(delay) else {
            return;
        };
        let mut bucket = self.bucket.lock().await;
        if bucket.cooldown_until.map_or(true, |current| current < until) {
            warn!("Marketplace asked us to slow down, pausing requests for {:?}", delay);
            bucket.cooldown_until = Some(until);
        }
    }

    pub async fn get_rate_limit_status(&self) -> RateLimitStatus {
        let now = Instant::now();
        let mut bucket = self.bucket.lock().await;
        bucket.refill(&self.config, now);
        RateLimitStatus {
            available_tokens: bucket.tokens.floor() as u32,
            max_tokens: self.config.burst,
            cooling_down: bucket.cooldown_until.is_some_and(|until| until > now),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub available_tokens: u32,
    pub max_tokens: u32,
    pub cooling_down: bool,
}

impl RateLimitStatus {
    pub fn utilization_percentage(&self) -> f64 {
        let used = self.max_tokens.saturating_sub(self.available_tokens);
        used as f64 / self.max_tokens.max(1) as f64 * 100.0
    }
}
