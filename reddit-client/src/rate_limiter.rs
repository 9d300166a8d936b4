use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub time_window: Duration,
    pub burst_allowance: u32,
}

impl RateLimitConfig {
    pub fn reddit_oauth() -> Self {
        Self {
            max_requests: 100, // Reddit allows 100 requests per minute per OAuth client
            time_window: Duration::from_secs(60),
            burst_allowance: 10,
        }
    }
}

#[derive(Debug)]
pub struct TokenBucket {
    state: Mutex<BucketState>,
    capacity: f64,
    refill_rate: f64, // tokens per second
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl BucketState {
    fn refill(&mut self, capacity: f64, refill_rate: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * refill_rate).min(capacity);
        self.last_refill = now;
    }
}

impl TokenBucket {
    pub fn new(config: &RateLimitConfig) -> Self {
        let capacity = config.burst_allowance as f64;
        let refill_rate = config.max_requests as f64 / config.time_window.as_secs_f64();

        Self {
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            capacity,
            refill_rate,
        }
    }

    /// Take `tokens_needed` tokens, or return how long to wait for them.
    pub async fn acquire(&self, tokens_needed: f64) -> Result<(), Duration> {
        let mut state = self.state.lock().await;
        state.refill(self.capacity, self.refill_rate);

        if state.tokens >= tokens_needed {
            state.tokens -= tokens_needed;
            Ok(())
        } else {
            let missing = tokens_needed - state.tokens;
            Err(Duration::from_secs_f64(missing / self.refill_rate))
        }
    }

    pub async fn get_available_tokens(&self) -> f64 {
        let mut state = self.state.lock().await;
        state.refill(self.capacity, self.refill_rate);
        state.tokens
    }
}

/// Client-side throttle in front of every Reddit request.
///
/// Besides the local token bucket it honours the server's own budget as
/// reported in the `x-ratelimit-remaining` and `x-ratelimit-reset` headers.
#[derive(Debug)]
pub struct RateLimiter {
    token_bucket: TokenBucket,
    config: RateLimitConfig,
    server_pause_until: Arc<Mutex<Option<Instant>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let token_bucket = TokenBucket::new(&config);

        Self {
            token_bucket,
            config,
            server_pause_until: Arc::new(Mutex::new(None)),
        }
    }

    /// Wait until a request may be sent. Returns the time spent waiting.
    pub async fn acquire_permit(&self) -> Duration {
        let start_time = Instant::now();

        let pause_until = *self.server_pause_until.lock().await;
        if let Some(until) = pause_until {
            let now = Instant::now();
            if until > now {
                tracing::warn!(
                    "Reddit request budget exhausted, pausing for {:?}",
                    until - now
                );
                sleep(until - now).await;
            }
        }

        loop {
            match self.token_bucket.acquire(1.0).await {
                Ok(()) => break,
                Err(wait_time) => {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    sleep(wait_time).await;
                }
            }
        }

        start_time.elapsed()
    }

    /// Record the budget reported by the server on the last response.
    pub async fn observe_server_budget(&self, remaining: Option<f64>, reset_secs: Option<u64>) {
        let mut pause = self.server_pause_until.lock().await;
        match (remaining, reset_secs) {
            (Some(remaining), Some(reset)) if remaining < 1.0 => {
                *pause = Some(Instant::now() + Duration::from_secs(reset));
            }
            _ => *pause = None,
        }
    }

    pub async fn get_rate_limit_status(&self) -> RateLimitStatus {
        let available_tokens = self.token_bucket.get_available_tokens().await;
        let server_paused = self
            .server_pause_until
            .lock()
            .await
            .map(|until| until > Instant::now())
            .unwrap_or(false);

        RateLimitStatus {
            available_tokens: available_tokens as u32,
            max_tokens: self.config.burst_allowance,
            requests_per_minute: self.config.max_requests,
            server_paused,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub available_tokens: u32,
    pub max_tokens: u32,
    pub requests_per_minute: u32,
    pub server_paused: bool,
}

impl RateLimitStatus {
    pub fn utilization_percentage(&self) -> f64 {
        let used_tokens = self.max_tokens.saturating_sub(self.available_tokens);
        (used_tokens as f64 / self.max_tokens as f64) * 100.0
    }

    pub fn is_near_limit(&self) -> bool {
        self.server_paused || self.utilization_percentage() > 80.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, Duration};

    #[tokio::test]
    async fn test_token_bucket_basic() {
        let config = RateLimitConfig {
            max_requests: 10,
            time_window: Duration::from_secs(10),
            burst_allowance: 5,
        };

        let bucket = TokenBucket::new(&config);

        for _ in 0..5 {
            assert!(bucket.acquire(1.0).await.is_ok());
        }

        assert!(bucket.acquire(1.0).await.is_err());
    }

    #[tokio::test]
    async fn test_token_bucket_refill() {
        let config = RateLimitConfig {
            max_requests: 60, // 1 token per second
            time_window: Duration::from_secs(60),
            burst_allowance: 2,
        };

        let bucket = TokenBucket::new(&config);

        assert!(bucket.acquire(2.0).await.is_ok());
        assert!(bucket.acquire(1.0).await.is_err());

        sleep(Duration::from_millis(1100)).await;

        assert!(bucket.acquire(1.0).await.is_ok());
    }

    #[tokio::test]
    async fn test_rate_limiter_permits() {
        let limiter = RateLimiter::new(RateLimitConfig::reddit_oauth());

        let waited = limiter.acquire_permit().await;
        assert!(waited < Duration::from_secs(1));

        let status = limiter.get_rate_limit_status().await;
        assert!(status.available_tokens < status.max_tokens);
        assert_eq!(status.requests_per_minute, 100);
        assert!(!status.server_paused);
    }

    #[tokio::test]
    async fn test_server_budget_pauses_and_clears() {
        let limiter = RateLimiter::new(RateLimitConfig::reddit_oauth());

        limiter.observe_server_budget(Some(0.0), Some(30)).await;
        let status = limiter.get_rate_limit_status().await;
        assert!(status.server_paused);
        assert!(status.is_near_limit());

        limiter.observe_server_budget(Some(42.0), Some(30)).await;
        let status = limiter.get_rate_limit_status().await;
        assert!(!status.server_paused);
    }

    #[test]
    fn test_utilization_percentage() {
        let status = RateLimitStatus {
            available_tokens: 2,
            max_tokens: 10,
            requests_per_minute: 100,
            server_paused: false,
        };
        assert!((status.utilization_percentage() - 80.0).abs() < f64::EPSILON);
        assert!(!status.is_near_limit());
    }
}
