//! Turns collected records into the aggregate report of a run.

use chrono::NaiveDateTime;
use painpoint_core::{CommentRecord, Record};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

pub const RUN_ID_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const GENERATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Run identifier shared by every artifact of one run.
pub fn run_id(at: NaiveDateTime) -> String {
    at.format(RUN_ID_FORMAT).to_string()
}

/// Polarity ranges reported in the sentiment histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentBucket {
    VeryNegative,
    Negative,
    Neutral,
    Positive,
    VeryPositive,
}

impl SentimentBucket {
    pub const ALL: [SentimentBucket; 5] = [
        SentimentBucket::VeryNegative,
        SentimentBucket::Negative,
        SentimentBucket::Neutral,
        SentimentBucket::Positive,
        SentimentBucket::VeryPositive,
    ];

    pub fn for_polarity(polarity: f64) -> Self {
        if polarity.is_nan() {
            SentimentBucket::Neutral
        } else if polarity < -0.5 {
            SentimentBucket::VeryNegative
        } else if polarity < -0.1 {
            SentimentBucket::Negative
        } else if polarity <= 0.1 {
            SentimentBucket::Neutral
        } else if polarity <= 0.5 {
            SentimentBucket::Positive
        } else {
            SentimentBucket::VeryPositive
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SentimentBucket::VeryNegative => "Very negative",
            SentimentBucket::Negative => "Negative",
            SentimentBucket::Neutral => "Neutral",
            SentimentBucket::Positive => "Positive",
            SentimentBucket::VeryPositive => "Very positive",
        }
    }

    pub fn range(&self) -> &'static str {
        match self {
            SentimentBucket::VeryNegative => "< -0.5",
            SentimentBucket::Negative => "-0.5 to -0.1",
            SentimentBucket::Neutral => "-0.1 to 0.1",
            SentimentBucket::Positive => "0.1 to 0.5",
            SentimentBucket::VeryPositive => "> 0.5",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentDistribution {
    pub very_negative: usize,
    pub negative: usize,
    pub neutral: usize,
    pub positive: usize,
    pub very_positive: usize,
}

impl SentimentDistribution {
    pub fn count(&self, bucket: SentimentBucket) -> usize {
        match bucket {
            SentimentBucket::VeryNegative => self.very_negative,
            SentimentBucket::Negative => self.negative,
            SentimentBucket::Neutral => self.neutral,
            SentimentBucket::Positive => self.positive,
            SentimentBucket::VeryPositive => self.very_positive,
        }
    }

    fn add(&mut self, bucket: SentimentBucket) {
        let slot = match bucket {
            SentimentBucket::VeryNegative => &mut self.very_negative,
            SentimentBucket::Negative => &mut self.negative,
            SentimentBucket::Neutral => &mut self.neutral,
            SentimentBucket::Positive => &mut self.positive,
            SentimentBucket::VeryPositive => &mut self.very_positive,
        };
        *slot += 1;
    }

    pub fn total(&self) -> usize {
        SentimentBucket::ALL.iter().map(|b| self.count(*b)).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentSummary {
    pub average_sentiment: f64,
    /// Bucket counts sit next to the average in the JSON report.
    #[serde(flatten)]
    pub distribution: SentimentDistribution,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub run_id: String,
    pub generated_at: String,
    pub posts_analyzed: usize,
    pub comments_analyzed: usize,
    pub communities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceCount {
    pub price: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discussion {
    pub title: String,
    pub community: String,
    pub score: i64,
    pub num_comments: u64,
    pub url: String,
    pub pain_points: Vec<String>,
    pub price_mentions: Vec<String>,
}

impl From<&Record> for Discussion {
    fn from(record: &Record) -> Self {
        Self {
            title: record.title.clone(),
            community: record.community.clone(),
            score: record.score,
            num_comments: record.num_comments,
            url: record.url.clone(),
            pain_points: record.pain_points.clone(),
            price_mentions: record.price_mentions.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionMentions {
    pub total: usize,
    /// Share of comments, in percent, one decimal.
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub pain_points: Vec<CategoryCount>,
    pub sentiment_analysis: SentimentSummary,
    pub top_discussions: Vec<Discussion>,
    pub price_insights: Vec<PriceCount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution_mentions: Option<SolutionMentions>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mood {
    Negative,
    Neutral,
    Positive,
}

impl Mood {
    pub fn from_average(average: f64) -> Self {
        if average < -0.1 {
            Mood::Negative
        } else if average > 0.1 {
            Mood::Positive
        } else {
            Mood::Neutral
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mood::Negative => "negative",
            Mood::Neutral => "neutral",
            Mood::Positive => "positive",
        })
    }
}

/// Headline facts for the operator summary.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyFindings {
    pub top_pain_point: Option<CategoryCount>,
    pub mood: Mood,
    pub top_price: Option<PriceCount>,
}

/// Frequency table that remembers first-seen order for ties.
#[derive(Default)]
struct Tally {
    index: HashMap<String, usize>,
    entries: Vec<(String, usize)>,
}

impl Tally {
    fn add(&mut self, key: &str) {
        match self.index.get(key) {
            Some(&slot) => self.entries[slot].1 += 1,
            None => {
                self.index.insert(key.to_string(), self.entries.len());
                self.entries.push((key.to_string(), 1));
            }
        }
    }

    /// Descending by count; the sort is stable so ties keep first-seen order.
    fn ranked(mut self) -> Vec<(String, usize)> {
        self.entries.sort_by(|a, b| b.1.cmp(&a.1));
        self.entries
    }
}

/// Round to `decimals` places, halves to the even neighbour.
fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    let scaled = value * factor;
    let rounded = if (scaled - scaled.trunc()).abs() == 0.5 {
        (scaled / 2.0).round() * 2.0
    } else {
        scaled.round()
    };
    rounded / factor
}

#[derive(Debug, Clone)]
pub struct Aggregator {
    /// Records considered for top discussions.
    pub discussion_pool: usize,
    /// Top discussions kept in the report.
    pub discussion_limit: usize,
    pub price_limit: usize,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self {
            discussion_pool: 10,
            discussion_limit: 5,
            price_limit: 10,
        }
    }
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the report. `comments` is `None` when no comment phase ran.
    /// Empty inputs produce zero counts, never an error.
    pub fn aggregate(
        &self,
        records: &[Record],
        comments: Option<&[CommentRecord]>,
        generated_at: NaiveDateTime,
    ) -> Report {
        let report = Report {
            metadata: ReportMetadata {
                run_id: run_id(generated_at),
                generated_at: generated_at.format(GENERATED_AT_FORMAT).to_string(),
                posts_analyzed: records.len(),
                comments_analyzed: comments.map_or(0, <[CommentRecord]>::len),
                communities: distinct_communities(records),
            },
            pain_points: self.category_counts(records),
            sentiment_analysis: self.sentiment_summary(records),
            top_discussions: self.top_discussions(records),
            price_insights: self.price_insights(records, comments.unwrap_or(&[])),
            solution_mentions: comments.map(|c| self.solution_mentions(c)),
        };
        debug!(
            "Aggregated {} posts into {} categories",
            records.len(),
            report.pain_points.len()
        );
        report
    }

    pub fn category_counts(&self, records: &[Record]) -> Vec<CategoryCount> {
        let mut tally = Tally::default();
        for category in records.iter().flat_map(|r| r.pain_points.iter()) {
            tally.add(category);
        }
        tally
            .ranked()
            .into_iter()
            .map(|(category, count)| CategoryCount { category, count })
            .collect()
    }

    pub fn sentiment_summary(&self, records: &[Record]) -> SentimentSummary {
        let mut distribution = SentimentDistribution::default();
        for record in records {
            distribution.add(SentimentBucket::for_polarity(record.sentiment.polarity));
        }

        let average_sentiment = if records.is_empty() {
            0.0
        } else {
            let sum: f64 = records.iter().map(|r| r.sentiment.polarity).sum();
            round_to(sum / records.len() as f64, 2)
        };

        SentimentSummary {
            average_sentiment,
            distribution,
        }
    }

    /// Most commented records first; ties keep collection order.
    pub fn top_discussions(&self, records: &[Record]) -> Vec<Discussion> {
        let mut ranked: Vec<&Record> = records.iter().collect();
        ranked.sort_by(|a, b| b.num_comments.cmp(&a.num_comments));
        ranked
            .into_iter()
            .take(self.discussion_pool)
            .take(self.discussion_limit)
            .map(Discussion::from)
            .collect()
    }

    pub fn price_insights(&self, records: &[Record], comments: &[CommentRecord]) -> Vec<PriceCount> {
        let mut tally = Tally::default();
        let post_prices = records.iter().flat_map(|r| r.price_mentions.iter());
        let comment_prices = comments.iter().flat_map(|c| c.price_mentions.iter());
        for price in post_prices.chain(comment_prices) {
            tally.add(price);
        }
        tally
            .ranked()
            .into_iter()
            .take(self.price_limit)
            .map(|(price, count)| PriceCount { price, count })
            .collect()
    }

    pub fn solution_mentions(&self, comments: &[CommentRecord]) -> SolutionMentions {
        let total = comments.iter().filter(|c| c.mentions_solution).count();
        let percentage = if comments.is_empty() {
            0.0
        } else {
            round_to(total as f64 / comments.len() as f64 * 100.0, 1)
        };
        SolutionMentions { total, percentage }
    }

    /// Records by score plus comment count, highest first, stable on ties.
    pub fn rank_by_engagement<'a>(&self, records: &'a [Record]) -> Vec<&'a Record> {
        let mut ranked: Vec<&Record> = records.iter().collect();
        ranked.sort_by(|a, b| b.engagement().cmp(&a.engagement()));
        ranked
    }

    pub fn key_findings(&self, report: &Report) -> KeyFindings {
        KeyFindings {
            top_pain_point: report.pain_points.first().cloned(),
            mood: Mood::from_average(report.sentiment_analysis.average_sentiment),
            top_price: report.price_insights.first().cloned(),
        }
    }
}

fn distinct_communities(records: &[Record]) -> Vec<String> {
    let mut communities: Vec<String> = Vec::new();
    for record in records {
        if !communities.contains(&record.community) {
            communities.push(record.community.clone());
        }
    }
    communities
}
