pub mod aggregator;
pub mod classify;
pub mod collector;
pub mod prices;
pub mod sentiment;

pub use aggregator::{
    run_id, Aggregator, CategoryCount, Discussion, KeyFindings, Mood, PriceCount, Report,
    ReportMetadata, SentimentBucket, SentimentDistribution, SentimentSummary, SolutionMentions,
};
pub use classify::{Classifier, SolutionDetector};
pub use collector::{Collector, CollectorSettings};
pub use prices::{PriceExtractor, MAX_PRICE_MENTIONS};
pub use sentiment::{score_or_neutral, LexiconEntry, LexiconScorer, SentimentScorer};
