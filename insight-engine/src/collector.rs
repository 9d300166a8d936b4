use crate::classify::{Classifier, SolutionDetector};
use crate::prices::PriceExtractor;
use crate::sentiment::{score_or_neutral, SentimentScorer};
use chrono::{DateTime, Utc};
use painpoint_core::{
    CommentRecord, ContentSource, CoreError, ErrorRecovery, ErrorReporter, ListingSort, RawComment,
    RawItem, Record, RecoveryResult, ResearchConfig, DELETED_AUTHOR,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Collection settings taken from the run configuration.
#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub communities: Vec<String>,
    pub sorts: Vec<ListingSort>,
    pub window_days: u32,
    pub per_community_limit: usize,
    pub inter_request_delay: Duration,
    pub keyword_prefilter: bool,
    pub body_cap: usize,
    pub comment_body_cap: usize,
    pub sentiment_prefix_cap: usize,
    pub comment_posts_pool: usize,
    pub comments_per_post: usize,
}

impl From<&ResearchConfig> for CollectorSettings {
    fn from(config: &ResearchConfig) -> Self {
        Self {
            communities: config.communities.clone(),
            sorts: config.sorts.clone(),
            window_days: config.window_days,
            per_community_limit: config.effective_limit(),
            inter_request_delay: config.inter_request_delay(),
            keyword_prefilter: config.safe_mode,
            body_cap: config.body_cap,
            comment_body_cap: config.comment_body_cap,
            sentiment_prefix_cap: config.sentiment_prefix_cap,
            comment_posts_pool: config.comment_posts_pool,
            comments_per_post: config.comments_per_post,
        }
    }
}

fn truncate_chars(text: &str, cap: usize) -> String {
    text.chars().take(cap).collect()
}

fn author_or_deleted(author: Option<String>) -> String {
    author
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DELETED_AUTHOR.to_string())
}

/// Walks communities and listing sorts and turns raw items into records.
pub struct Collector<S> {
    source: S,
    settings: CollectorSettings,
    classifier: Classifier,
    scorer: Arc<dyn SentimentScorer>,
    prices: PriceExtractor,
    solutions: SolutionDetector,
    reporter: ErrorReporter,
}

impl<S: ContentSource> Collector<S> {
    pub fn new(
        source: S,
        config: &ResearchConfig,
        scorer: Arc<dyn SentimentScorer>,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            source,
            settings: CollectorSettings::from(config),
            classifier: Classifier::new(config.categories.clone()),
            scorer,
            prices: PriceExtractor::new()?,
            solutions: SolutionDetector::new(&config.solution_keywords),
            reporter: ErrorReporter::new(),
        })
    }

    pub fn with_settings(mut self, settings: CollectorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &CollectorSettings {
        &self.settings
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub async fn collect(&self) -> Result<Vec<Record>, CoreError> {
        self.collect_at(Utc::now()).await
    }

    /// Collect posts relative to `now`. Only configuration problems abort;
    /// a failing community is logged and the next one is tried.
    pub async fn collect_at(&self, now: DateTime<Utc>) -> Result<Vec<Record>, CoreError> {
        let cutoff = now - chrono::Duration::days(i64::from(self.settings.window_days));
        let limit = self.settings.per_community_limit;
        let mut records = Vec::new();

        for community in &self.settings.communities {
            info!("Collecting r/{}", community);
            let mut found = 0usize;

            for &sort in &self.settings.sorts {
                if found >= limit {
                    break;
                }

                let fetched = self.source.list(community, sort, limit).await;
                let items = match ErrorRecovery::apply(fetched, Vec::new, &self.reporter) {
                    RecoveryResult::Recovered(items) | RecoveryResult::Degraded(items) => items,
                    RecoveryResult::Skipped => {
                        warn!("Skipping the rest of r/{}", community);
                        break;
                    }
                    RecoveryResult::Failed(error) => return Err(error),
                };

                for item in items {
                    if found >= limit {
                        break;
                    }
                    sleep(self.settings.inter_request_delay).await;

                    if let Some(record) = self.accept(community, sort, item, cutoff) {
                        debug!("Kept {} from r/{} ({})", record.id, community, sort);
                        records.push(record);
                        found += 1;
                    }
                }
            }

            info!("Collected {} posts from r/{}", found, community);
        }

        info!("Collected {} posts in total", records.len());
        Ok(records)
    }

    fn accept(
        &self,
        community: &str,
        sort: ListingSort,
        item: RawItem,
        cutoff: DateTime<Utc>,
    ) -> Option<Record> {
        if item.id.trim().is_empty() {
            warn!("Skipping item without an id from r/{}", community);
            return None;
        }
        if item.created_utc < cutoff {
            return None;
        }

        let text = format!("{} {}", item.title, item.body).to_lowercase();
        if self.settings.keyword_prefilter && !self.classifier.matches_any(&text) {
            return None;
        }

        let sentiment_text = truncate_chars(&text, self.settings.sentiment_prefix_cap);
        Some(Record {
            community: community.to_string(),
            pain_points: self.classifier.classify(&text),
            sentiment: score_or_neutral(self.scorer.as_ref(), &sentiment_text, &self.reporter),
            price_mentions: self.prices.extract(&text),
            body: truncate_chars(&item.body, self.settings.body_cap),
            author: author_or_deleted(item.author),
            url: format!("https://reddit.com{}", item.permalink),
            id: item.id,
            title: item.title,
            created_utc: item.created_utc,
            score: item.score,
            num_comments: item.num_comments,
            sort,
        })
    }

    /// Ids of the posts whose comments are worth fetching: the most
    /// commented records, ties kept in collection order.
    pub fn select_comment_candidates(&self, records: &[Record]) -> Vec<String> {
        let mut ranked: Vec<&Record> = records.iter().collect();
        ranked.sort_by(|a, b| b.num_comments.cmp(&a.num_comments));
        ranked
            .into_iter()
            .take(self.settings.comment_posts_pool)
            .map(|record| record.id.clone())
            .collect()
    }

    /// Fetch comments for the first `max_posts` ids. A post whose comments
    /// cannot be fetched is logged and skipped.
    pub async fn collect_comments(
        &self,
        post_ids: &[String],
        max_posts: usize,
    ) -> Result<Vec<CommentRecord>, CoreError> {
        let selected = &post_ids[..max_posts.min(post_ids.len())];
        info!("Collecting comments for {} posts", selected.len());
        let mut comments = Vec::new();

        for (index, post_id) in selected.iter().enumerate() {
            sleep(self.settings.inter_request_delay).await;

            let fetched = self.source.comments(post_id).await;
            let raw = match ErrorRecovery::apply(fetched, Vec::new, &self.reporter) {
                RecoveryResult::Recovered(raw) | RecoveryResult::Degraded(raw) => raw,
                RecoveryResult::Skipped => {
                    warn!("Skipping comments of {}", post_id);
                    continue;
                }
                RecoveryResult::Failed(error) => return Err(error),
            };

            let before = comments.len();
            comments.extend(
                raw.into_iter()
                    .take(self.settings.comments_per_post)
                    .map(|comment| self.comment_record(post_id, comment)),
            );
            info!(
                "[{}/{}] {} comments from {}",
                index + 1,
                selected.len(),
                comments.len() - before,
                post_id
            );
        }

        Ok(comments)
    }

    fn comment_record(&self, post_id: &str, comment: RawComment) -> CommentRecord {
        CommentRecord {
            post_id: post_id.to_string(),
            mentions_solution: self.solutions.mentions_solution(&comment.body),
            price_mentions: self.prices.extract(&comment.body),
            body: truncate_chars(&comment.body, self.settings.comment_body_cap),
            author: author_or_deleted(comment.author),
            comment_id: comment.id,
            score: comment.score,
            created_utc: comment.created_utc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentiment::LexiconScorer;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use painpoint_core::RedditApiError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeSource {
        listings: HashMap<(String, ListingSort), Vec<RawItem>>,
        failing: Vec<String>,
        comments: HashMap<String, Vec<RawComment>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeSource {
        fn with_listing(mut self, community: &str, sort: ListingSort, items: Vec<RawItem>) -> Self {
            self.listings.insert((community.to_string(), sort), items);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ContentSource for FakeSource {
        async fn list(
            &self,
            community: &str,
            sort: ListingSort,
            limit: usize,
        ) -> Result<Vec<RawItem>, CoreError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("list {} {}", community, sort));
            if self.failing.iter().any(|c| c == community) {
                return Err(RedditApiError::Forbidden {
                    resource: format!("/r/{}/{}", community, sort),
                }
                .into());
            }
            Ok(self
                .listings
                .get(&(community.to_string(), sort))
                .map(|items| items.iter().take(limit).cloned().collect())
                .unwrap_or_default())
        }

        async fn comments(&self, item_id: &str) -> Result<Vec<RawComment>, CoreError> {
            self.calls.lock().unwrap().push(format!("comments {}", item_id));
            self.comments
                .get(item_id)
                .cloned()
                .ok_or_else(|| CoreError::from(RedditApiError::PostNotFound {
                    post_id: item_id.to_string(),
                }))
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn item(id: &str, title: &str, days_old: i64, num_comments: u64) -> RawItem {
        RawItem {
            id: id.to_string(),
            title: title.to_string(),
            body: String::new(),
            author: Some("merchant".to_string()),
            created_utc: now() - chrono::Duration::days(days_old),
            score: 1,
            num_comments,
            permalink: format!("/r/test/comments/{}/", id),
        }
    }

    fn raw_comment(id: &str, body: &str) -> RawComment {
        RawComment {
            id: id.to_string(),
            body: body.to_string(),
            author: None,
            score: 4,
            created_utc: now(),
        }
    }

    fn config(communities: &[&str]) -> ResearchConfig {
        ResearchConfig {
            communities: communities.iter().map(|c| c.to_string()).collect(),
            inter_request_delay_secs: 0.0,
            ..ResearchConfig::default()
        }
    }

    fn collector(source: FakeSource, config: &ResearchConfig) -> Collector<FakeSource> {
        Collector::new(source, config, Arc::new(LexiconScorer::new())).unwrap()
    }

    #[tokio::test]
    async fn test_window_and_keyword_filters() {
        let source = FakeSource::default().with_listing(
            "shopify",
            ListingSort::Hot,
            vec![
                item("fresh", "Ad costs are killing me", 2, 4),
                item("stale", "Ad costs in 2019", 45, 9),
                item("offtopic", "Show off my new logo", 1, 2),
            ],
        );
        let collector = collector(source, &config(&["shopify"]));

        let records = collector.collect_at(now()).await.unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["fresh"]);
        assert_eq!(records[0].pain_points, vec!["ad_cost"]);
        assert_eq!(records[0].sort, ListingSort::Hot);
        assert_eq!(records[0].url, "https://reddit.com/r/test/comments/fresh/");
    }

    #[tokio::test]
    async fn test_collect_all_skips_keyword_filter() {
        let source = FakeSource::default().with_listing(
            "shopify",
            ListingSort::New,
            vec![item("offtopic", "Show off my new logo", 1, 2)],
        );
        let config = ResearchConfig {
            safe_mode: false,
            ..config(&["shopify"])
        };

        let records = collector(source, &config).collect_at(now()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].pain_points.is_empty());
    }

    #[tokio::test]
    async fn test_early_stop_across_sorts() {
        let hot = (0..3)
            .map(|i| item(&format!("h{}", i), "high cpc again", 1, 0))
            .collect();
        let source = FakeSource::default()
            .with_listing("PPC", ListingSort::Hot, hot)
            .with_listing("PPC", ListingSort::New, vec![item("n0", "high cpc", 1, 0)]);
        let config = ResearchConfig {
            per_community_limit: 3,
            ..config(&["PPC"])
        };

        let collector = collector(source, &config);
        let records = collector.collect_at(now()).await.unwrap();
        assert_eq!(records.len(), 3);
        // The limit was reached during "hot", so "new" is never listed
        assert_eq!(collector.source().calls(), vec!["list PPC hot"]);
    }

    #[tokio::test]
    async fn test_failing_community_does_not_abort() {
        let mut source = FakeSource::default().with_listing(
            "ecommerce",
            ListingSort::Hot,
            vec![item("ok", "which metrics matter", 1, 0)],
        );
        source.failing.push("private".to_string());

        let collector = collector(source, &config(&["private", "ecommerce"]));
        let records = collector.collect_at(now()).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].community, "ecommerce");
        let calls = collector.source().calls();
        assert_eq!(calls[0], "list private hot");
        assert!(!calls.contains(&"list private new".to_string()));
    }

    #[tokio::test]
    async fn test_body_truncation_and_deleted_author() {
        let mut long = item("long", "roas decrease", 1, 0);
        long.body = "é".repeat(800);
        long.author = None;
        let source = FakeSource::default().with_listing("shopify", ListingSort::Hot, vec![long]);

        let records = collector(source, &config(&["shopify"]))
            .collect_at(now())
            .await
            .unwrap();
        assert_eq!(records[0].body.chars().count(), 500);
        assert_eq!(records[0].author, DELETED_AUTHOR);
    }

    #[tokio::test]
    async fn test_items_without_id_are_skipped() {
        let source = FakeSource::default().with_listing(
            "shopify",
            ListingSort::Hot,
            vec![item("", "high cpc", 1, 0), item("kept", "high cpc", 1, 0)],
        );
        let records = collector(source, &config(&["shopify"]))
            .collect_at(now())
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "kept");
    }

    #[tokio::test]
    async fn test_comment_candidates_and_collection() {
        let mut source = FakeSource::default();
        source.comments.insert(
            "a".to_string(),
            vec![
                raw_comment("c1", "I recommend a spy tool, $49/mo"),
                raw_comment("c2", "same here"),
                raw_comment("c3", "beyond the per-post cap"),
            ],
        );
        let config = ResearchConfig {
            comments_per_post: 2,
            ..config(&[])
        };
        let collector = collector(source, &config);

        let records = vec![
            Record {
                id: "b".to_string(),
                num_comments: 3,
                ..sample_record()
            },
            Record {
                id: "a".to_string(),
                num_comments: 30,
                ..sample_record()
            },
            Record {
                id: "missing".to_string(),
                num_comments: 3,
                ..sample_record()
            },
        ];
        let candidates = collector.select_comment_candidates(&records);
        assert_eq!(candidates, vec!["a", "b", "missing"]);

        let comments = collector.collect_comments(&candidates, 5).await.unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].post_id, "a");
        assert!(comments[0].mentions_solution);
        assert_eq!(comments[0].price_mentions, vec!["$49/mo"]);
        assert_eq!(comments[0].author, DELETED_AUTHOR);
        assert!(!comments[1].mentions_solution);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_precedes_every_item_and_comment_fetch() {
        let mut source = FakeSource::default().with_listing(
            "PPC",
            ListingSort::Hot,
            vec![
                item("a", "high cpc", 1, 0),
                item("b", "high cpc", 1, 0),
                item("off", "my new logo", 1, 0),
                item("c", "high cpc", 1, 0),
            ],
        );
        source.comments.insert("a".to_string(), vec![raw_comment("c1", "ok")]);
        source.comments.insert("b".to_string(), Vec::new());
        let config = ResearchConfig {
            inter_request_delay_secs: 3.0,
            per_community_limit: 10,
            ..config(&["PPC"])
        };
        let collector = collector(source, &config);

        let started = tokio::time::Instant::now();
        let records = collector.collect_at(now()).await.unwrap();
        assert_eq!(records.len(), 3);
        // Rejected items are paced too
        let elapsed = started.elapsed();
        assert!(
            elapsed >= Duration::from_secs(12) && elapsed < Duration::from_secs(13),
            "{:?}",
            elapsed
        );

        let ids = vec!["a".to_string(), "missing".to_string(), "b".to_string()];
        let started = tokio::time::Instant::now();
        let comments = collector.collect_comments(&ids, 3).await.unwrap();
        assert_eq!(comments.len(), 1);
        let elapsed = started.elapsed();
        assert!(
            elapsed >= Duration::from_secs(9) && elapsed < Duration::from_secs(10),
            "{:?}",
            elapsed
        );
    }

    fn sample_record() -> Record {
        Record {
            community: "shopify".to_string(),
            id: String::new(),
            title: "title".to_string(),
            body: String::new(),
            author: "someone".to_string(),
            created_utc: now(),
            score: 0,
            num_comments: 0,
            url: String::new(),
            sort: ListingSort::Hot,
            pain_points: Vec::new(),
            sentiment: Default::default(),
            price_mentions: Vec::new(),
        }
    }
}
