use crate::metrics::{MetricsCollector, RequestMetrics};
use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use chrono::{DateTime, Utc};
use painpoint_core::{CoreError, ListingSort, RawComment, RawItem, RedditApiError};
use reqwest::header::HeaderMap;
use reqwest::{redirect, Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub const REDDIT_API_BASE: &str = "https://oauth.reddit.com";

/// Reddit never returns more than this many children per listing page.
pub const MAX_PAGE_SIZE: usize = 100;

/// Comments requested per thread.
pub const COMMENT_FETCH_LIMIT: usize = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct RedditPostData {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    pub author: Option<String>,
    pub created_utc: f64,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: u64,
    #[serde(default)]
    pub permalink: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditCommentData {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub body: String,
    pub author: Option<String>,
    #[serde(default)]
    pub score: i64,
    pub created_utc: f64,
}

/// One page of a community listing.
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub items: Vec<RawItem>,
    /// Cursor for the next page, absent on the last one.
    pub after: Option<String>,
}

fn timestamp(created_utc: f64) -> Result<DateTime<Utc>, CoreError> {
    if !created_utc.is_finite() {
        return Err(invalid_response(format!(
            "creation time {} is not a number",
            created_utc
        )));
    }
    DateTime::from_timestamp(created_utc.trunc() as i64, 0).ok_or_else(|| {
        invalid_response(format!("creation time {} is out of range", created_utc))
    })
}

fn invalid_response(details: String) -> CoreError {
    CoreError::RedditApi(RedditApiError::InvalidResponse { details })
}

impl TryFrom<RedditPostData> for RawItem {
    type Error = CoreError;

    fn try_from(post: RedditPostData) -> Result<Self, Self::Error> {
        Ok(Self {
            created_utc: timestamp(post.created_utc)?,
            id: post.id,
            title: post.title,
            body: post.selftext,
            author: post.author,
            score: post.score,
            num_comments: post.num_comments,
            permalink: post.permalink,
        })
    }
}

impl TryFrom<RedditCommentData> for RawComment {
    type Error = CoreError;

    fn try_from(comment: RedditCommentData) -> Result<Self, Self::Error> {
        Ok(Self {
            created_utc: timestamp(comment.created_utc)?,
            id: comment.id,
            body: comment.body,
            author: comment.author,
            score: comment.score,
        })
    }
}

fn children(listing: &Value) -> impl Iterator<Item = &Value> {
    listing
        .get("data")
        .and_then(|data| data.get("children"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

/// Parse a listing body. Children that fail to parse are skipped.
pub fn parse_listing(listing: &Value) -> Result<ListingPage, CoreError> {
    if listing.get("kind").and_then(Value::as_str) != Some("Listing") {
        return Err(invalid_response("expected a Listing object".to_string()));
    }

    let mut items = Vec::new();
    for child in children(listing) {
        if child.get("kind").and_then(Value::as_str) != Some("t3") {
            continue;
        }
        let parsed = child
            .get("data")
            .cloned()
            .ok_or_else(|| invalid_response("listing child without data".to_string()))
            .and_then(|data| serde_json::from_value::<RedditPostData>(data).map_err(CoreError::from))
            .and_then(RawItem::try_from);

        match parsed {
            Ok(item) => items.push(item),
            Err(e) => warn!("Skipping malformed post in listing: {}", e),
        }
    }

    let after = listing
        .get("data")
        .and_then(|data| data.get("after"))
        .and_then(Value::as_str)
        .filter(|cursor| !cursor.is_empty())
        .map(str::to_string);

    Ok(ListingPage { items, after })
}

/// Flatten a comment listing breadth-first, dropping "load more" stubs.
pub fn flatten_comment_tree(listing: &Value) -> Vec<RawComment> {
    let mut queue: VecDeque<&Value> = children(listing).collect();
    let mut comments = Vec::new();

    while let Some(child) = queue.pop_front() {
        if child.get("kind").and_then(Value::as_str) != Some("t1") {
            continue;
        }
        let Some(data) = child.get("data") else {
            continue;
        };

        let parsed = serde_json::from_value::<RedditCommentData>(data.clone())
            .map_err(CoreError::from)
            .and_then(RawComment::try_from);
        match parsed {
            Ok(comment) => comments.push(comment),
            Err(e) => warn!("Skipping malformed comment: {}", e),
        }

        // "replies" is an empty string on leaf comments
        if let Some(replies) = data.get("replies") {
            queue.extend(children(replies));
        }
    }

    comments
}

/// Parse the `[post, comments]` pair returned by the thread endpoint.
pub fn parse_thread(thread: &Value) -> Result<Vec<RawComment>, CoreError> {
    let comment_listing = thread
        .as_array()
        .and_then(|parts| parts.get(1))
        .ok_or_else(|| invalid_response("expected a [post, comments] pair".to_string()))?;
    Ok(flatten_comment_tree(comment_listing))
}

fn is_valid_community(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn header_value<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// Map a non-success status to an error. Redirects count as missing
/// resources, since Reddit redirects unknown communities to a search page.
fn status_error(status: StatusCode, headers: &HeaderMap, endpoint: &str) -> CoreError {
    match status.as_u16() {
        300..=399 | 404 => CoreError::NotFound {
            resource: endpoint.to_string(),
        },
        401 => RedditApiError::InvalidToken.into(),
        403 => RedditApiError::Forbidden {
            resource: endpoint.to_string(),
        }
        .into(),
        429 => {
            let retry_after = header_value::<f64>(headers, "retry-after")
                .or_else(|| header_value::<f64>(headers, "x-ratelimit-reset"))
                .map(|secs| secs.max(0.0).ceil() as u64)
                .unwrap_or(60);
            warn!("Rate limited, retry after {} seconds", retry_after);
            RedditApiError::RateLimitExceeded { retry_after }.into()
        }
        code if status.is_server_error() => RedditApiError::ServerError { status_code: code }.into(),
        code => invalid_response(format!("unexpected status {} for {}", code, endpoint)),
    }
}

#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    rate_limiter: Arc<RateLimiter>,
    metrics: Arc<MetricsCollector>,
    user_agent: String,
}

impl RedditApiClient {
    pub fn new(user_agent: String) -> Result<Self, CoreError> {
        let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig::reddit_oauth()));
        let metrics = Arc::new(MetricsCollector::new());

        let http_client = Client::builder()
            .user_agent(&user_agent)
            .timeout(Duration::from_secs(30))
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self {
            http_client,
            rate_limiter,
            metrics,
            user_agent,
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// The configured HTTP client, shared with the token exchange.
    pub fn http_client(&self) -> Client {
        self.http_client.clone()
    }

    pub fn metrics_collector(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    /// Send one authorized GET and decode its JSON body. Metrics are
    /// recorded for every outcome.
    pub async fn make_request(
        &self,
        kind: &str,
        endpoint: &str,
        access_token: &str,
        query_params: &[(&str, String)],
    ) -> Result<Value, CoreError> {
        let url = format!("{}{}", REDDIT_API_BASE, endpoint);

        let throttle_wait = self.rate_limiter.acquire_permit().await;
        debug!("Acquired rate limit permit for {}", endpoint);

        let start_time = Instant::now();
        info!("Making Reddit API request: GET {}", endpoint);
        let sent = self
            .http_client
            .request(Method::GET, &url)
            .bearer_auth(access_token)
            .query(query_params)
            .send()
            .await;

        let mut status_code = None;
        let result = match sent {
            Ok(response) => {
                let status = response.status();
                status_code = Some(status.as_u16());

                let headers = response.headers();
                self.rate_limiter
                    .observe_server_budget(
                        header_value(headers, "x-ratelimit-remaining"),
                        header_value(headers, "x-ratelimit-reset"),
                    )
                    .await;

                if status.is_success() {
                    response.json::<Value>().await.map_err(|e| {
                        error!("Failed to decode body of {}: {}", endpoint, e);
                        invalid_response(format!("undecodable body for {}", endpoint))
                    })
                } else {
                    error!("Request failed with status: {} for {}", status, endpoint);
                    Err(status_error(status, response.headers(), endpoint))
                }
            }
            Err(e) if e.is_timeout() => {
                error!("Request to {} timed out", endpoint);
                Err(RedditApiError::RequestTimeout.into())
            }
            Err(e) => {
                error!("Network error for {}: {}", endpoint, e);
                Err(CoreError::Network(e))
            }
        };

        self.metrics
            .record_request(RequestMetrics {
                kind: kind.to_string(),
                status_code,
                response_time: start_time.elapsed(),
                throttle_wait,
                success: result.is_ok(),
                rate_limited: status_code == Some(429),
            })
            .await;

        result
    }

    pub async fn get_listing(
        &self,
        access_token: &str,
        community: &str,
        sort: ListingSort,
        limit: usize,
        after: Option<&str>,
    ) -> Result<ListingPage, CoreError> {
        if !is_valid_community(community) {
            return Err(CoreError::InvalidInput {
                message: format!("'{}' is not a valid community name", community),
            });
        }

        let endpoint = format!("/r/{}/{}", community, sort);
        let mut params = vec![
            ("limit", limit.min(MAX_PAGE_SIZE).to_string()),
            ("raw_json", "1".to_string()),
        ];
        if sort == ListingSort::Top {
            params.push(("t", "month".to_string()));
        }
        if let Some(cursor) = after {
            params.push(("after", cursor.to_string()));
        }

        let body = self
            .make_request(&format!("listing/{}", sort), &endpoint, access_token, &params)
            .await
            .map_err(|e| match e {
                CoreError::NotFound { .. } => RedditApiError::SubredditNotFound {
                    subreddit: community.to_string(),
                }
                .into(),
                other => other,
            })?;

        let page = parse_listing(&body)?;
        info!(
            "Retrieved {} posts from r/{} ({})",
            page.items.len(),
            community,
            sort
        );
        Ok(page)
    }

    pub async fn get_comments(
        &self,
        access_token: &str,
        post_id: &str,
    ) -> Result<Vec<RawComment>, CoreError> {
        if post_id.is_empty() || !post_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CoreError::InvalidInput {
                message: format!("'{}' is not a valid post id", post_id),
            });
        }

        let endpoint = format!("/comments/{}", post_id);
        let params = [
            ("limit", COMMENT_FETCH_LIMIT.to_string()),
            ("raw_json", "1".to_string()),
        ];

        let body = self
            .make_request("comments", &endpoint, access_token, &params)
            .await
            .map_err(|e| match e {
                CoreError::NotFound { .. } => RedditApiError::PostNotFound {
                    post_id: post_id.to_string(),
                }
                .into(),
                other => other,
            })?;

        let comments = parse_thread(&body)?;
        debug!("Retrieved {} comments for {}", comments.len(), post_id);
        Ok(comments)
    }

    pub async fn get_metrics(&self) -> crate::metrics::ApiMetrics {
        self.metrics.get_metrics().await
    }

    pub async fn get_rate_limit_status(&self) -> crate::rate_limiter::RateLimitStatus {
        self.rate_limiter.get_rate_limit_status().await
    }

    pub async fn reset_metrics(&self) {
        self.metrics.reset_metrics().await;
    }
}
