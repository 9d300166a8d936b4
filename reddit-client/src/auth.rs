use crate::metrics::{MetricsCollector, RequestMetrics};
use oauth2::basic::{BasicClient, BasicErrorResponse, BasicTokenResponse};
use oauth2::{
    AuthUrl, ClientId, ClientSecret, HttpRequest, HttpResponse, RequestTokenError,
    ResourceOwnerPassword, ResourceOwnerUsername, Scope, TokenResponse, TokenUrl,
};
use painpoint_core::{CoreError, RedditApiError, RedditCredentials};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub const AUTH_URL: &str = "https://www.reddit.com/api/v1/authorize";
pub const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

/// Tokens are refreshed this long before Reddit would reject them.
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Reddit hands out one-hour tokens when the response omits a lifetime.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditToken {
    pub access_token: String,
    pub expires_at: SystemTime,
    pub scope: Vec<String>,
}

impl RedditToken {
    pub fn is_expired(&self) -> bool {
        SystemTime::now() + EXPIRY_MARGIN >= self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    NotAuthenticated,
    Authenticated { expires_at: SystemTime },
    TokenExpired { expired_at: SystemTime },
}

/// How the application identifies itself to Reddit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantMode {
    /// Application-only access, read-only.
    ClientCredentials,
    /// Script-app access on behalf of the configured account.
    Password,
}

/// Obtains and caches the bearer token used by every API call.
pub struct TokenManager {
    oauth_client: BasicClient,
    account: Option<(ResourceOwnerUsername, ResourceOwnerPassword)>,
    http_client: reqwest::Client,
    token: RwLock<Option<RedditToken>>,
    metrics: Arc<MetricsCollector>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("grant_mode", &self.grant_mode())
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    pub fn new(
        credentials: &RedditCredentials,
        http_client: reqwest::Client,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self, CoreError> {
        let oauth_client = BasicClient::new(
            ClientId::new(credentials.client_id.clone()),
            Some(ClientSecret::new(credentials.client_secret.clone())),
            AuthUrl::new(AUTH_URL.to_string()).map_err(url_error)?,
            Some(TokenUrl::new(TOKEN_URL.to_string()).map_err(url_error)?),
        );

        let account = credentials.account.as_ref().map(|(username, password)| {
            (
                ResourceOwnerUsername::new(username.clone()),
                ResourceOwnerPassword::new(password.clone()),
            )
        });

        Ok(Self {
            oauth_client,
            account,
            http_client,
            token: RwLock::new(None),
            metrics,
        })
    }

    pub fn grant_mode(&self) -> GrantMode {
        if self.account.is_some() {
            GrantMode::Password
        } else {
            GrantMode::ClientCredentials
        }
    }

    /// Current bearer token, requesting a new one when none is cached or
    /// the cached one is about to expire.
    pub async fn access_token(&self) -> Result<String, CoreError> {
        if let Some(token) = self.token.read().await.as_ref() {
            if !token.is_expired() {
                return Ok(token.access_token.clone());
            }
        }

        let mut cached = self.token.write().await;
        if let Some(token) = cached.as_ref() {
            if !token.is_expired() {
                return Ok(token.access_token.clone());
            }
        }

        let token = self.request_token().await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    /// Forget the cached token after the API rejected it.
    pub async fn invalidate(&self) {
        if self.token.write().await.take().is_some() {
            warn!("Discarding rejected access token");
        }
    }

    pub async fn set_token(&self, token: RedditToken) {
        *self.token.write().await = Some(token);
    }

    pub async fn auth_state(&self) -> AuthState {
        match self.token.read().await.as_ref() {
            None => AuthState::NotAuthenticated,
            Some(token) if token.is_expired() => AuthState::TokenExpired {
                expired_at: token.expires_at,
            },
            Some(token) => AuthState::Authenticated {
                expires_at: token.expires_at,
            },
        }
    }

    async fn request_token(&self) -> Result<RedditToken, CoreError> {
        let mode = self.grant_mode();
        info!("Requesting Reddit access token ({:?})", mode);

        let http_client = self.http_client.clone();
        let send = move |request: HttpRequest| send_token_request(http_client.clone(), request);

        let start_time = Instant::now();
        let response = match &self.account {
            Some((username, password)) => {
                self.oauth_client
                    .exchange_password(username, password)
                    .add_scope(Scope::new("read".to_string()))
                    .request_async(send)
                    .await
            }
            None => {
                self.oauth_client
                    .exchange_client_credentials()
                    .add_scope(Scope::new("read".to_string()))
                    .request_async(send)
                    .await
            }
        };

        self.metrics
            .record_request(RequestMetrics {
                kind: "token".to_string(),
                status_code: None,
                response_time: start_time.elapsed(),
                throttle_wait: Duration::ZERO,
                success: response.is_ok(),
                rate_limited: false,
            })
            .await;

        let token = token_from_response(response.map_err(token_error)?);
        debug!("Access token valid until {:?}", token.expires_at);
        Ok(token)
    }
}

fn token_from_response(response: BasicTokenResponse) -> RedditToken {
    let lifetime = response.expires_in().unwrap_or(DEFAULT_TOKEN_LIFETIME);
    RedditToken {
        access_token: response.access_token().secret().clone(),
        expires_at: SystemTime::now() + lifetime,
        scope: response
            .scopes()
            .map(|scopes| scopes.iter().map(|s| s.to_string()).collect())
            .unwrap_or_default(),
    }
}

async fn send_token_request(
    http_client: reqwest::Client,
    request: HttpRequest,
) -> Result<HttpResponse, reqwest::Error> {
    let response = http_client
        .request(request.method, request.url.as_str())
        .headers(request.headers)
        .body(request.body)
        .send()
        .await?;

    let status_code = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();

    Ok(HttpResponse {
        status_code,
        headers,
        body,
    })
}

fn token_error(error: RequestTokenError<reqwest::Error, BasicErrorResponse>) -> CoreError {
    match error {
        RequestTokenError::ServerResponse(response) => RedditApiError::AuthenticationFailed {
            reason: response.error().to_string(),
        }
        .into(),
        RequestTokenError::Request(e) => CoreError::Network(e),
        RequestTokenError::Parse(e, _) => RedditApiError::InvalidResponse {
            details: format!("token response: {}", e),
        }
        .into(),
        RequestTokenError::Other(reason) => RedditApiError::AuthenticationFailed { reason }.into(),
    }
}

fn url_error(error: oauth2::url::ParseError) -> CoreError {
    CoreError::Internal {
        message: format!("invalid OAuth endpoint: {}", error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials(account: Option<(&str, &str)>) -> RedditCredentials {
        RedditCredentials {
            client_id: "test_client_id".to_string(),
            client_secret: "test_client_secret".to_string(),
            account: account.map(|(u, p)| (u.to_string(), p.to_string())),
        }
    }

    fn manager(account: Option<(&str, &str)>) -> TokenManager {
        TokenManager::new(
            &credentials(account),
            reqwest::Client::new(),
            Arc::new(MetricsCollector::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_grant_mode_follows_account() {
        assert_eq!(manager(None).grant_mode(), GrantMode::ClientCredentials);
        assert_eq!(
            manager(Some(("researcher", "hunter2"))).grant_mode(),
            GrantMode::Password
        );
    }

    #[test]
    fn test_token_expiry_margin() {
        let fresh = RedditToken {
            access_token: "fresh".to_string(),
            expires_at: SystemTime::now() + Duration::from_secs(3600),
            scope: vec!["read".to_string()],
        };
        assert!(!fresh.is_expired());

        let nearly = RedditToken {
            expires_at: SystemTime::now() + Duration::from_secs(30),
            ..fresh.clone()
        };
        assert!(nearly.is_expired());
    }

    #[tokio::test]
    async fn test_cached_token_is_reused_until_invalidated() {
        let manager = manager(None);
        assert_eq!(manager.auth_state().await, AuthState::NotAuthenticated);

        let expires_at = SystemTime::now() + Duration::from_secs(3600);
        manager
            .set_token(RedditToken {
                access_token: "cached".to_string(),
                expires_at,
                scope: vec!["read".to_string()],
            })
            .await;

        assert_eq!(manager.access_token().await.unwrap(), "cached");
        assert_eq!(
            manager.auth_state().await,
            AuthState::Authenticated { expires_at }
        );

        manager.invalidate().await;
        assert_eq!(manager.auth_state().await, AuthState::NotAuthenticated);
    }

    #[tokio::test]
    async fn test_expired_token_state() {
        let manager = manager(None);
        let expired_at = SystemTime::now() - Duration::from_secs(10);
        manager
            .set_token(RedditToken {
                access_token: "stale".to_string(),
                expires_at: expired_at,
                scope: Vec::new(),
            })
            .await;

        assert_eq!(
            manager.auth_state().await,
            AuthState::TokenExpired { expired_at }
        );
    }

    #[test]
    fn test_server_rejection_maps_to_authentication_failure() {
        let response: BasicErrorResponse =
            serde_json::from_str(r#"{"error": "invalid_client"}"#).unwrap();
        let error = token_error(RequestTokenError::ServerResponse(response));
        match error {
            CoreError::RedditApi(RedditApiError::AuthenticationFailed { reason }) => {
                assert_eq!(reason, "invalid_client");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_debug_hides_credentials() {
        let rendered = format!("{:?}", manager(Some(("researcher", "hunter2"))));
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("test_client_secret"));
    }
}
