use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;

/// Usage of the Reddit API over one research run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub rate_limited_requests: u64,
    pub total_response_time: Duration,
    pub total_throttle_wait: Duration,
    pub last_request_time: Option<SystemTime>,
    /// Keyed by request kind ("token", "listing/hot", "comments", ...).
    pub requests_by_kind: BTreeMap<String, KindMetrics>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KindMetrics {
    pub request_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub total_response_time: Duration,
    pub max_response_time: Duration,
}

#[derive(Debug, Clone)]
pub struct RequestMetrics {
    pub kind: String,
    pub status_code: Option<u16>,
    pub response_time: Duration,
    pub throttle_wait: Duration,
    pub success: bool,
    pub rate_limited: bool,
}

impl KindMetrics {
    fn update(&mut self, metrics: &RequestMetrics) {
        self.request_count += 1;
        self.total_response_time += metrics.response_time;
        self.max_response_time = self.max_response_time.max(metrics.response_time);

        if metrics.success {
            self.success_count += 1;
        } else {
            self.error_count += 1;
        }
    }

    pub fn average_response_time(&self) -> Duration {
        if self.request_count == 0 {
            Duration::ZERO
        } else {
            self.total_response_time / self.request_count as u32
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.request_count == 0 {
            0.0
        } else {
            self.success_count as f64 / self.request_count as f64
        }
    }
}

impl ApiMetrics {
    pub fn average_response_time(&self) -> Duration {
        if self.total_requests == 0 {
            Duration::ZERO
        } else {
            self.total_response_time / self.total_requests as u32
        }
    }
}

#[derive(Debug, Default)]
pub struct MetricsCollector {
    metrics: Arc<RwLock<ApiMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_request(&self, request_metrics: RequestMetrics) {
        let mut metrics = self.metrics.write().await;

        metrics.total_requests += 1;
        metrics.last_request_time = Some(SystemTime::now());
        metrics.total_response_time += request_metrics.response_time;
        metrics.total_throttle_wait += request_metrics.throttle_wait;

        if request_metrics.success {
            metrics.successful_requests += 1;
        } else {
            metrics.failed_requests += 1;
        }

        if request_metrics.rate_limited {
            metrics.rate_limited_requests += 1;
        }

        metrics
            .requests_by_kind
            .entry(request_metrics.kind.clone())
            .or_default()
            .update(&request_metrics);
    }

    pub async fn get_metrics(&self) -> ApiMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn get_kind_metrics(&self, kind: &str) -> Option<KindMetrics> {
        self.metrics.read().await.requests_by_kind.get(kind).cloned()
    }

    pub async fn reset_metrics(&self) {
        let mut metrics = self.metrics.write().await;
        *metrics = ApiMetrics::default();
    }
}
