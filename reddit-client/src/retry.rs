use painpoint_core::{CoreError, RedditApiError};
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Base delay for exponential backoff
    pub base_delay: Duration,
    /// Upper bound for any single wait, server-requested waits included
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Maximum jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
    /// Consecutive failed operations before the circuit opens
    pub failure_threshold: u32,
    /// How long the circuit stays open before a trial request
    pub recovery_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Create retry config tuned for the Reddit API
    pub fn reddit() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitBreakerState {
    Closed,   // Normal operation
    Open,     // Blocking requests
    HalfOpen, // Testing recovery
}

/// Stops hammering the API after repeated failures
#[derive(Debug)]
pub struct CircuitBreaker {
    state: CircuitBreakerState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    failure_threshold: u32,
    recovery_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            state: CircuitBreakerState::Closed,
            failure_count: 0,
            last_failure_time: None,
            failure_threshold: config.failure_threshold,
            recovery_timeout: config.recovery_timeout,
        }
    }

    pub fn allow_request(&mut self) -> bool {
        match self.state {
            CircuitBreakerState::Closed | CircuitBreakerState::HalfOpen => true,
            CircuitBreakerState::Open => match self.last_failure_time {
                Some(last_failure) if last_failure.elapsed() >= self.recovery_timeout => {
                    debug!("Circuit breaker transitioning to half-open for recovery test");
                    self.state = CircuitBreakerState::HalfOpen;
                    true
                }
                _ => false,
            },
        }
    }

    pub fn record_success(&mut self) {
        if self.state == CircuitBreakerState::HalfOpen {
            info!("Circuit breaker recovery successful, returning to closed state");
        }
        self.state = CircuitBreakerState::Closed;
        self.failure_count = 0;
        self.last_failure_time = None;
    }

    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.last_failure_time = Some(Instant::now());

        match self.state {
            CircuitBreakerState::Closed if self.failure_count >= self.failure_threshold => {
                warn!(
                    "Circuit breaker opening due to {} consecutive failures",
                    self.failure_count
                );
                self.state = CircuitBreakerState::Open;
            }
            CircuitBreakerState::HalfOpen => {
                warn!("Circuit breaker recovery failed, returning to open state");
                self.state = CircuitBreakerState::Open;
            }
            _ => {}
        }
    }

    pub fn get_state(&self) -> CircuitBreakerState {
        self.state
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Retry with exponential backoff
    Retry,
    /// Retry after the delay the server asked for
    RetryWithDelay(Duration),
    /// Permanent failure
    NoRetry,
}

pub fn get_retry_strategy(error: &CoreError) -> RetryStrategy {
    match error {
        CoreError::RedditApi(reddit_error) => match reddit_error {
            RedditApiError::RateLimitExceeded { retry_after } => {
                RetryStrategy::RetryWithDelay(Duration::from_secs(*retry_after))
            }
            RedditApiError::ServerError { .. }
            | RedditApiError::RequestTimeout
            | RedditApiError::InvalidResponse { .. }
            | RedditApiError::EndpointUnavailable { .. } => RetryStrategy::Retry,
            // The cached token is dropped by the caller, so one more attempt re-authenticates
            RedditApiError::InvalidToken => RetryStrategy::Retry,
            RedditApiError::AuthenticationFailed { .. }
            | RedditApiError::Forbidden { .. }
            | RedditApiError::SubredditNotFound { .. }
            | RedditApiError::PostNotFound { .. } => RetryStrategy::NoRetry,
        },
        CoreError::Network(reqwest_error) => {
            if reqwest_error.is_timeout() || reqwest_error.is_connect() {
                RetryStrategy::Retry
            } else {
                RetryStrategy::NoRetry
            }
        }
        CoreError::Timeout { .. } => RetryStrategy::Retry,
        _ => RetryStrategy::NoRetry,
    }
}

/// Exponential backoff with jitter, capped at `max_delay`
pub fn calculate_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let multiplier = config.backoff_multiplier.powi(attempt as i32);
    let exponential = config.base_delay.mul_f64(multiplier).min(config.max_delay);

    let jitter_range = (exponential.as_millis() as f64 * config.jitter_factor) as u64;
    let jitter = Duration::from_millis(fastrand::u64(0..=jitter_range));

    (exponential + jitter).min(config.max_delay)
}

#[derive(Debug, Clone, Default)]
pub struct RetryMetrics {
    pub total_retries: u64,
    pub successful_retries: u64,
    pub failed_operations: u64,
    pub circuit_breaker_trips: u64,
}

/// Wraps API calls with retry, backoff and a circuit breaker
#[derive(Debug)]
pub struct RetryExecutor {
    config: RetryConfig,
    circuit_breaker: Mutex<CircuitBreaker>,
    metrics: Mutex<RetryMetrics>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        let circuit_breaker = Mutex::new(CircuitBreaker::new(&config));

        Self {
            config,
            circuit_breaker,
            metrics: Mutex::new(RetryMetrics::default()),
        }
    }

    /// Run `operation` until it succeeds, fails permanently or runs out of
    /// attempts. The last error is returned unchanged.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        if !lock(&self.circuit_breaker).allow_request() {
            lock(&self.metrics).circuit_breaker_trips += 1;
            warn!(
                "Circuit breaker is open, blocking request for {}",
                operation_name
            );
            return Err(CoreError::RedditApi(RedditApiError::EndpointUnavailable {
                endpoint: format!("{} (circuit breaker is open)", operation_name),
            }));
        }

        let mut attempt = 0;
        loop {
            let error = match operation().await {
                Ok(result) => {
                    lock(&self.circuit_breaker).record_success();
                    if attempt > 0 {
                        let mut metrics = lock(&self.metrics);
                        metrics.total_retries += attempt as u64;
                        metrics.successful_retries += 1;
                        info!(
                            "Operation {} succeeded after {} retries",
                            operation_name, attempt
                        );
                    }
                    return Ok(result);
                }
                Err(error) => error,
            };

            let attempts_left = attempt + 1 < self.config.max_attempts;
            let delay = match get_retry_strategy(&error) {
                RetryStrategy::Retry if attempts_left => calculate_delay(attempt, &self.config),
                RetryStrategy::RetryWithDelay(delay) if attempts_left => {
                    delay.min(self.config.max_delay)
                }
                _ => {
                    lock(&self.circuit_breaker).record_failure();
                    let mut metrics = lock(&self.metrics);
                    metrics.total_retries += attempt as u64;
                    metrics.failed_operations += 1;
                    error!(
                        "Operation {} failed after {} attempt(s): {}",
                        operation_name,
                        attempt + 1,
                        error
                    );
                    return Err(error);
                }
            };

            info!(
                "Retrying {} in {:?} due to: {}",
                operation_name, delay, error
            );
            sleep(delay).await;
            attempt += 1;
        }
    }

    pub fn get_metrics(&self) -> RetryMetrics {
        lock(&self.metrics).clone()
    }

    pub fn get_circuit_breaker_state(&self) -> CircuitBreakerState {
        lock(&self.circuit_breaker).get_state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_config() -> RetryConfig {
        RetryConfig {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            ..Default::default()
        }
    }

    #[test]
    fn test_retry_config_reddit() {
        let config = RetryConfig::reddit();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay, Duration::from_secs(2));
        assert_eq!(config.failure_threshold, 3);
    }

    #[test]
    fn test_circuit_breaker_failure_threshold() {
        let config = RetryConfig {
            failure_threshold: 2,
            ..Default::default()
        };
        let mut breaker = CircuitBreaker::new(&config);

        breaker.record_failure();
        assert_eq!(breaker.get_state(), CircuitBreakerState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.get_state(), CircuitBreakerState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn test_circuit_breaker_recovery() {
        let config = RetryConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::ZERO,
            ..Default::default()
        };
        let mut breaker = CircuitBreaker::new(&config);

        breaker.record_failure();
        assert_eq!(breaker.get_state(), CircuitBreakerState::Open);

        assert!(breaker.allow_request());
        assert_eq!(breaker.get_state(), CircuitBreakerState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.get_state(), CircuitBreakerState::Closed);
    }

    #[test]
    fn test_retry_strategy_for_errors() {
        assert_eq!(
            get_retry_strategy(&CoreError::RedditApi(RedditApiError::RateLimitExceeded {
                retry_after: 7
            })),
            RetryStrategy::RetryWithDelay(Duration::from_secs(7))
        );
        assert_eq!(
            get_retry_strategy(&CoreError::RedditApi(RedditApiError::ServerError {
                status_code: 502
            })),
            RetryStrategy::Retry
        );
        assert_eq!(
            get_retry_strategy(&CoreError::RedditApi(RedditApiError::SubredditNotFound {
                subreddit: "nope".to_string()
            })),
            RetryStrategy::NoRetry
        );
        assert_eq!(
            get_retry_strategy(&CoreError::InvalidInput {
                message: "x".to_string()
            }),
            RetryStrategy::NoRetry
        );
    }

    #[test]
    fn test_exponential_backoff_calculation() {
        let config = RetryConfig {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            jitter_factor: 0.0,
            ..Default::default()
        };

        assert_eq!(calculate_delay(0, &config), Duration::from_millis(100));
        assert_eq!(calculate_delay(1, &config), Duration::from_millis(200));
        assert_eq!(calculate_delay(2, &config), Duration::from_millis(400));
        assert_eq!(calculate_delay(10, &config), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_retry_executor_success_after_retries() {
        let executor = RetryExecutor::new(fast_config());
        let attempts = Arc::new(AtomicU32::new(0));

        let result = executor
            .execute("listing r/shopify", || {
                let attempts = attempts.clone();
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(CoreError::RedditApi(RedditApiError::ServerError {
                            status_code: 500,
                        }))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        let metrics = executor.get_metrics();
        assert_eq!(metrics.total_retries, 2);
        assert_eq!(metrics.successful_retries, 1);
    }

    #[tokio::test]
    async fn test_retry_executor_returns_permanent_error_unchanged() {
        let executor = RetryExecutor::new(fast_config());
        let attempts = Arc::new(AtomicU32::new(0));

        let result: Result<(), CoreError> = executor
            .execute("listing r/gone", || {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(CoreError::RedditApi(RedditApiError::SubredditNotFound {
                        subreddit: "gone".to_string(),
                    }))
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(CoreError::RedditApi(RedditApiError::SubredditNotFound { .. }))
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(executor.get_metrics().failed_operations, 1);
    }

    #[tokio::test]
    async fn test_retry_executor_circuit_breaker() {
        let config = RetryConfig {
            max_attempts: 2,
            failure_threshold: 2,
            ..fast_config()
        };
        let executor = RetryExecutor::new(config);

        for _ in 0..2 {
            let result = executor
                .execute("comments abc", || async {
                    Err::<i32, CoreError>(CoreError::RedditApi(RedditApiError::ServerError {
                        status_code: 500,
                    }))
                })
                .await;
            assert!(result.is_err());
        }

        assert_eq!(
            executor.get_circuit_breaker_state(),
            CircuitBreakerState::Open
        );

        let blocked = executor
            .execute("comments def", || async { Ok::<i32, CoreError>(42) })
            .await;
        assert!(matches!(
            blocked,
            Err(CoreError::RedditApi(RedditApiError::EndpointUnavailable { .. }))
        ));
        assert_eq!(executor.get_metrics().circuit_breaker_trips, 1);
    }
}
