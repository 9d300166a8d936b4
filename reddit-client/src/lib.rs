pub mod api;
pub mod auth;
pub mod metrics;
pub mod rate_limiter;
pub mod retry;


pub use api::{ListingPage, RedditApiClient};
pub use auth::{AuthState, GrantMode, RedditToken, TokenManager};
pub use metrics::ApiMetrics;
pub use rate_limiter::RateLimitStatus;
pub use retry::{RetryConfig, RetryExecutor, RetryMetrics};

use async_trait::async_trait;
use painpoint_core::{
    ContentSource, CoreError, ListingSort, RawComment, RawItem, RedditApiError, RedditCredentials,
};
use tracing::debug;

/// Read-only Reddit access: OAuth, throttling, retries and pagination.
#[derive(Debug)]
pub struct RedditClient {
    api: RedditApiClient,
    auth: TokenManager,
    retry: RetryExecutor,
}

impl RedditClient {
    /// Build a client. No network traffic happens until the first call.
    pub fn new(credentials: &RedditCredentials, user_agent: &str) -> Result<Self, CoreError> {
        let api = RedditApiClient::new(user_agent.to_string())?;
        let auth = TokenManager::new(credentials, api.http_client(), api.metrics_collector())?;

        Ok(Self {
            api,
            auth,
            retry: RetryExecutor::new(RetryConfig::reddit()),
        })
    }

    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry = RetryExecutor::new(config);
        self
    }

    /// Obtain a token up front so bad credentials surface before collection.
    pub async fn authenticate(&self) -> Result<(), CoreError> {
        self.auth.access_token().await.map(|_| ())
    }

    pub fn grant_mode(&self) -> GrantMode {
        self.auth.grant_mode()
    }

    pub async fn get_auth_state(&self) -> AuthState {
        self.auth.auth_state().await
    }

    pub async fn get_api_metrics(&self) -> ApiMetrics {
        self.api.get_metrics().await
    }

    pub async fn get_rate_limit_status(&self) -> RateLimitStatus {
        self.api.get_rate_limit_status().await
    }

    pub fn get_retry_metrics(&self) -> RetryMetrics {
        self.retry.get_metrics()
    }

    async fn listing_page(
        &self,
        community: &str,
        sort: ListingSort,
        limit: usize,
        after: Option<&str>,
    ) -> Result<ListingPage, CoreError> {
        let token = self.auth.access_token().await?;
        let result = self
            .api
            .get_listing(&token, community, sort, limit, after)
            .await;
        self.drop_rejected_token(&result).await;
        result
    }

    async fn thread_comments(&self, item_id: &str) -> Result<Vec<RawComment>, CoreError> {
        let token = self.auth.access_token().await?;
        let result = self.api.get_comments(&token, item_id).await;
        self.drop_rejected_token(&result).await;
        result
    }

    async fn drop_rejected_token<T>(&self, result: &Result<T, CoreError>) {
        if let Err(CoreError::RedditApi(RedditApiError::InvalidToken)) = result {
            self.auth.invalidate().await;
        }
    }
}

#[async_trait]
impl ContentSource for RedditClient {
    async fn list(
        &self,
        community: &str,
        sort: ListingSort,
        limit: usize,
    ) -> Result<Vec<RawItem>, CoreError> {
        let mut items: Vec<RawItem> = Vec::with_capacity(limit);
        let mut after: Option<String> = None;

        while items.len() < limit {
            let page_size = (limit - items.len()).min(api::MAX_PAGE_SIZE);
            let cursor = after.as_deref();
            let page = self
                .retry
                .execute(&format!("listing r/{}/{}", community, sort), || {
                    self.listing_page(community, sort, page_size, cursor)
                })
                .await?;

            let fetched = page.items.len();
            items.extend(page.items);
            debug!(
                "r/{} ({}): {} items so far, next cursor {:?}",
                community,
                sort,
                items.len(),
                page.after
            );

            match page.after {
                Some(next) if fetched > 0 => after = Some(next),
                _ => break,
            }
        }

        items.truncate(limit);
        Ok(items)
    }

    async fn comments(&self, item_id: &str) -> Result<Vec<RawComment>, CoreError> {
        self.retry
            .execute(&format!("comments {}", item_id), || {
                self.thread_comments(item_id)
            })
            .await
    }
}
