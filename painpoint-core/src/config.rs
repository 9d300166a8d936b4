//! Run configuration and credentials.
//!
//! Everything a run needs is carried in an explicit [`ResearchConfig`]
//! value handed to the collector and aggregator. Credentials come from the
//! process environment only.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::{CategoryTable, ConfigError, CoreError, ListingSort};

pub const ENV_CLIENT_ID: &str = "REDDIT_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "REDDIT_CLIENT_SECRET";
pub const ENV_USERNAME: &str = "REDDIT_USERNAME";
pub const ENV_PASSWORD: &str = "REDDIT_PASSWORD";

/// Example values shipped in `.env.example` style templates.
const PLACEHOLDERS: &[&str] = &[
    "your_client_id",
    "your_client_id_here",
    "your_client_secret",
    "your_client_secret_here",
    "your_reddit_username",
    "your_reddit_password",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub communities: Vec<String>,
    pub sorts: Vec<ListingSort>,
    pub window_days: u32,
    pub per_community_limit: usize,
    pub inter_request_delay_secs: f64,
    pub safe_mode: bool,
    pub safe_max_per_community: usize,
    pub body_cap: usize,
    pub comment_body_cap: usize,
    pub sentiment_prefix_cap: usize,
    pub comment_posts_pool: usize,
    pub comment_posts_limit: usize,
    pub comments_per_post: usize,
    pub output_dir: PathBuf,
    pub user_agent: String,
    pub categories: CategoryTable,
    pub solution_keywords: Vec<String>,
    pub lexicon_path: Option<PathBuf>,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            communities: ["shopify", "ecommerce", "FacebookAds", "dropshipping", "PPC"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            sorts: vec![ListingSort::Hot, ListingSort::New],
            window_days: 30,
            per_community_limit: 20,
            inter_request_delay_secs: 3.0,
            safe_mode: true,
            safe_max_per_community: 30,
            body_cap: 500,
            comment_body_cap: 300,
            sentiment_prefix_cap: 500,
            comment_posts_pool: 10,
            comment_posts_limit: 5,
            comments_per_post: 20,
            output_dir: PathBuf::from("research_results"),
            user_agent: format!(
                "painpoint-research/{} (read-only research)",
                env!("CARGO_PKG_VERSION")
            ),
            categories: CategoryTable::default(),
            solution_keywords: [
                "tool",
                "software",
                "app",
                "platform",
                "service",
                "recommend",
                "using",
                "tried",
                "works well",
                "helped me",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            lexicon_path: None,
        }
    }
}

impl ResearchConfig {
    /// Parse a TOML document. Missing keys take their default.
    pub fn from_toml_str(s: &str) -> Result<Self, CoreError> {
        let config: Self = toml::from_str(s).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                CoreError::Io(e)
            }
        })?;
        let config = Self::from_toml_str(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load from `path`, using defaults when the file does not exist.
    ///
    /// A file that exists but does not parse is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self, CoreError> {
        match Self::load(path) {
            Err(CoreError::Config(ConfigError::FileNotFound { path })) => {
                warn!("Config file {} not found, using defaults", path);
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
            other => other,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.communities.iter().all(|c| c.trim().is_empty()) {
            return Err(ConfigError::MissingField {
                field: "communities".to_string(),
            }
            .into());
        }
        if self.sorts.is_empty() {
            return Err(ConfigError::MissingField {
                field: "sorts".to_string(),
            }
            .into());
        }
        if self.per_community_limit == 0 {
            return Err(invalid("per_community_limit", "0"));
        }
        if Duration::try_from_secs_f64(self.inter_request_delay_secs).is_err() {
            return Err(invalid(
                "inter_request_delay_secs",
                &self.inter_request_delay_secs.to_string(),
            ));
        }
        if self.safe_mode && self.safe_max_per_community == 0 {
            return Err(invalid("safe_max_per_community", "0"));
        }
        if self.categories.is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: "at least one pain-point category is required".to_string(),
            }
            .into());
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "user_agent".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Per-community item limit after applying the safe-mode cap.
    pub fn effective_limit(&self) -> usize {
        if self.safe_mode {
            self.per_community_limit.min(self.safe_max_per_community)
        } else {
            self.per_community_limit
        }
    }

    /// Delay between items. Values that were never validated are clamped
    /// into the representable range.
    pub fn inter_request_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.inter_request_delay_secs.max(0.0)).unwrap_or(Duration::MAX)
    }

    /// Rough wall-clock estimate of the post phase, for the operator.
    /// Saturates instead of overflowing.
    pub fn estimated_duration(&self) -> Duration {
        let items = self
            .communities
            .len()
            .saturating_mul(self.sorts.len())
            .saturating_mul(self.effective_limit());
        u32::try_from(items)
            .ok()
            .and_then(|items| self.inter_request_delay().checked_mul(items))
            .unwrap_or(Duration::MAX)
    }
}

fn invalid(field: &str, value: &str) -> CoreError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
    .into()
}

/// Reddit application credentials.
#[derive(Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    /// Username and password for the authenticated mode.
    pub account: Option<(String, String)>,
}

impl std::fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("account", &self.account.as_ref().map(|(user, _)| user))
            .finish()
    }
}

impl RedditCredentials {
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build credentials from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let client_id = required(&lookup, ENV_CLIENT_ID)?;
        let client_secret = required(&lookup, ENV_CLIENT_SECRET)?;

        let username = optional(&lookup, ENV_USERNAME)?;
        let password = optional(&lookup, ENV_PASSWORD)?;
        let account = match (username, password) {
            (Some(user), Some(pass)) => Some((user, pass)),
            (None, None) => None,
            (Some(_), None) => {
                return Err(ConfigError::MissingEnvironmentVariable {
                    var_name: ENV_PASSWORD.to_string(),
                }
                .into())
            }
            (None, Some(_)) => {
                return Err(ConfigError::MissingEnvironmentVariable {
                    var_name: ENV_USERNAME.to_string(),
                }
                .into())
            }
        };

        Ok(Self {
            client_id,
            client_secret,
            account,
        })
    }

    pub fn is_authenticated_mode(&self) -> bool {
        self.account.is_some()
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String, CoreError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, key)?.ok_or_else(|| {
        ConfigError::MissingEnvironmentVariable {
            var_name: key.to_string(),
        }
        .into()
    })
}

fn optional<F>(lookup: &F, key: &str) -> Result<Option<String>, CoreError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_string()) {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) if PLACEHOLDERS.contains(&v.to_ascii_lowercase().as_str()) => {
            Err(ConfigError::PlaceholderCredential {
                var_name: key.to_string(),
            }
            .into())
        }
        Some(v) => Ok(Some(v)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ResearchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.effective_limit(), 20);
        assert_eq!(config.inter_request_delay(), Duration::from_secs(3));
        assert_eq!(config.categories.len(), 5);
    }

    #[test]
    fn test_safe_mode_caps_limit() {
        let mut config = ResearchConfig {
            per_community_limit: 100,
            ..Default::default()
        };
        assert_eq!(config.effective_limit(), 30);

        config.safe_mode = false;
        assert_eq!(config.effective_limit(), 100);
    }

    #[test]
    fn test_toml_overrides() {
        let config = ResearchConfig::from_toml_str(
            r#"
            communities = ["rust"]
            sorts = ["top"]
            inter_request_delay_secs = 0.5
            safe_mode = false

            [[categories]]
            name = "tooling"
            triggers = ["Cargo", "crates"]
            "#,
        )
        .unwrap();

        assert_eq!(config.communities, vec!["rust"]);
        assert_eq!(config.sorts, vec![ListingSort::Top]);
        assert_eq!(config.inter_request_delay(), Duration::from_millis(500));
        assert_eq!(config.categories.len(), 1);
        let triggers: Vec<&str> = config.categories.triggers().collect();
        assert_eq!(triggers, vec!["cargo", "crates"]);
        // untouched keys keep their defaults
        assert_eq!(config.window_days, 30);
    }

    #[test]
    fn test_invalid_toml_values() {
        assert!(ResearchConfig::from_toml_str("per_community_limit = 0").is_err());
        assert!(ResearchConfig::from_toml_str("communities = []").is_err());
        assert!(ResearchConfig::from_toml_str("inter_request_delay_secs = -1.0").is_err());
        assert!(ResearchConfig::from_toml_str("sorts = [\"rising\"]").is_err());
    }

    #[test]
    fn test_delay_must_fit_a_duration() {
        let result = ResearchConfig::from_toml_str("inter_request_delay_secs = 1e20");
        assert!(matches!(
            result,
            Err(CoreError::Config(ConfigError::InvalidValue { ref field, .. }))
                if field == "inter_request_delay_secs"
        ));
        assert!(ResearchConfig::from_toml_str("inter_request_delay_secs = 86400.0").is_ok());

        let unchecked = ResearchConfig {
            inter_request_delay_secs: 1e20,
            ..Default::default()
        };
        assert_eq!(unchecked.inter_request_delay(), Duration::MAX);
    }

    #[test]
    fn test_estimated_duration() {
        let config = ResearchConfig::default();
        // 5 communities, 2 sorts, 20 posts, 3 s each
        assert_eq!(config.estimated_duration(), Duration::from_secs(600));

        let huge = ResearchConfig {
            per_community_limit: usize::MAX,
            safe_mode: false,
            ..Default::default()
        };
        assert_eq!(huge.estimated_duration(), Duration::MAX);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ResearchConfig::load_or_default(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.communities.len(), 5);
    }

    #[test]
    fn test_broken_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "communities = [").unwrap();
        let result = ResearchConfig::load_or_default(&path);
        assert!(matches!(
            result,
            Err(CoreError::Config(ConfigError::Parse(_)))
        ));
    }

    #[test]
    fn test_credentials_app_only() {
        let creds = RedditCredentials::from_lookup(lookup_from(&[
            (ENV_CLIENT_ID, "abc"),
            (ENV_CLIENT_SECRET, "def"),
        ]))
        .unwrap();
        assert_eq!(creds.client_id, "abc");
        assert!(!creds.is_authenticated_mode());
        assert!(!format!("{:?}", creds).contains("def"));
    }

    #[test]
    fn test_credentials_missing_and_placeholder() {
        let missing = RedditCredentials::from_lookup(lookup_from(&[(ENV_CLIENT_ID, "abc")]));
        assert!(matches!(
            missing,
            Err(CoreError::Config(ConfigError::MissingEnvironmentVariable { ref var_name }))
                if var_name == ENV_CLIENT_SECRET
        ));

        let placeholder = RedditCredentials::from_lookup(lookup_from(&[
            (ENV_CLIENT_ID, "your_client_id_here"),
            (ENV_CLIENT_SECRET, "def"),
        ]));
        assert!(matches!(
            placeholder,
            Err(CoreError::Config(ConfigError::PlaceholderCredential { .. }))
        ));
    }

    #[test]
    fn test_credentials_account_requires_both_halves() {
        let result = RedditCredentials::from_lookup(lookup_from(&[
            (ENV_CLIENT_ID, "abc"),
            (ENV_CLIENT_SECRET, "def"),
            (ENV_USERNAME, "someone"),
        ]));
        assert!(result.is_err());

        let creds = RedditCredentials::from_lookup(lookup_from(&[
            (ENV_CLIENT_ID, "abc"),
            (ENV_CLIENT_SECRET, "def"),
            (ENV_USERNAME, "someone"),
            (ENV_PASSWORD, "hunter2"),
        ]))
        .unwrap();
        assert!(creds.is_authenticated_mode());
    }
}
