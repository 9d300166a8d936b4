//! Lexicon-based sentiment scoring.
//!
//! Polarity is the mean polarity of the sentiment-bearing words in a text,
//! after applying intensifiers ("very good") and negators ("not good").
//! Text without any known word scores neutral.

use painpoint_core::{ConfigError, CoreError, ErrorReporter, Sentiment};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

pub trait SentimentScorer: Send + Sync {
    fn score(&self, text: &str) -> Result<Sentiment, CoreError>;
}

/// Score with `scorer`, substituting a neutral sentiment on failure.
pub fn score_or_neutral(
    scorer: &dyn SentimentScorer,
    text: &str,
    reporter: &ErrorReporter,
) -> Sentiment {
    match scorer.score(text) {
        Ok(sentiment) => sentiment,
        Err(error) => {
            reporter.report_warning(&error);
            Sentiment::neutral()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LexiconEntry {
    pub polarity: f64,
    pub subjectivity: f64,
}

const BUILTIN_LEXICON: &[(&str, f64, f64)] = &[
    ("good", 0.7, 0.6),
    ("great", 0.8, 0.75),
    ("excellent", 1.0, 1.0),
    ("amazing", 0.6, 0.9),
    ("awesome", 1.0, 1.0),
    ("best", 1.0, 0.3),
    ("better", 0.5, 0.5),
    ("love", 0.5, 0.6),
    ("nice", 0.6, 1.0),
    ("happy", 0.8, 1.0),
    ("helpful", 0.5, 0.5),
    ("easy", 0.43, 0.83),
    ("profitable", 0.5, 0.5),
    ("successful", 0.75, 0.95),
    ("useful", 0.3, 0.0),
    ("worth", 0.3, 0.1),
    ("recommend", 0.4, 0.5),
    ("cheap", 0.4, 0.7),
    ("affordable", 0.4, 0.6),
    ("works", 0.2, 0.3),
    ("fine", 0.42, 0.5),
    ("bad", -0.7, 0.67),
    ("worse", -0.4, 0.6),
    ("worst", -1.0, 1.0),
    ("terrible", -1.0, 1.0),
    ("awful", -1.0, 1.0),
    ("horrible", -1.0, 1.0),
    ("hate", -0.8, 0.9),
    ("expensive", -0.5, 0.7),
    ("costly", -0.5, 0.6),
    ("overpriced", -0.6, 0.7),
    ("waste", -0.5, 0.5),
    ("wasted", -0.5, 0.5),
    ("losing", -0.4, 0.5),
    ("lost", -0.3, 0.4),
    ("broken", -0.4, 0.4),
    ("confusing", -0.4, 0.6),
    ("frustrating", -0.6, 0.8),
    ("frustrated", -0.6, 0.8),
    ("annoying", -0.8, 0.9),
    ("difficult", -0.5, 1.0),
    ("hard", -0.3, 0.54),
    ("problem", -0.3, 0.4),
    ("struggling", -0.5, 0.6),
    ("useless", -0.5, 0.2),
    ("scam", -0.7, 0.8),
    ("slow", -0.3, 0.4),
    ("poor", -0.4, 0.6),
    ("wrong", -0.5, 0.9),
];

const INTENSIFIERS: &[(&str, f64)] = &[
    ("very", 1.3),
    ("really", 1.2),
    ("extremely", 1.5),
    ("super", 1.3),
    ("so", 1.2),
    ("too", 1.3),
    ("incredibly", 1.5),
    ("slightly", 0.6),
    ("somewhat", 0.7),
];

const NEGATORS: &[&str] = &[
    "not", "no", "never", "don't", "doesn't", "didn't", "isn't", "wasn't", "aren't", "can't",
    "won't", "cannot", "hardly",
];

/// Word-lexicon scorer with intensifier and negation handling.
#[derive(Debug, Clone)]
pub struct LexiconScorer {
    lexicon: HashMap<String, LexiconEntry>,
    intensifiers: HashMap<String, f64>,
}

impl Default for LexiconScorer {
    fn default() -> Self {
        let lexicon = BUILTIN_LEXICON
            .iter()
            .map(|(word, polarity, subjectivity)| {
                (
                    word.to_string(),
                    LexiconEntry {
                        polarity: *polarity,
                        subjectivity: *subjectivity,
                    },
                )
            })
            .collect();
        let intensifiers = INTENSIFIERS
            .iter()
            .map(|(word, factor)| (word.to_string(), *factor))
            .collect();

        Self {
            lexicon,
            intensifiers,
        }
    }
}

impl LexiconScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in lexicon extended by a JSON object of
    /// `{"word": {"polarity": p, "subjectivity": s}}` entries.
    pub fn with_lexicon_file(path: &Path) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                CoreError::Io(e)
            }
        })?;
        let entries: HashMap<String, LexiconEntry> =
            serde_json::from_str(&text).map_err(|e| ConfigError::InvalidFormat {
                details: format!("{}: {}", path.display(), e),
            })?;

        let mut scorer = Self::default();
        let count = entries.len();
        for (word, entry) in entries {
            scorer.insert(&word, entry)?;
        }
        info!("Loaded {} lexicon entries from {}", count, path.display());
        Ok(scorer)
    }

    /// Add or replace one entry. Values outside the valid ranges are rejected.
    pub fn insert(&mut self, word: &str, entry: LexiconEntry) -> Result<(), CoreError> {
        let valid = (-1.0..=1.0).contains(&entry.polarity)
            && (0.0..=1.0).contains(&entry.subjectivity);
        if !valid {
            return Err(ConfigError::InvalidValue {
                field: format!("lexicon.{}", word),
                value: format!("({}, {})", entry.polarity, entry.subjectivity),
            }
            .into());
        }
        self.lexicon.insert(word.to_lowercase(), entry);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lexicon.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lexicon.is_empty()
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|token| token.trim_matches('\'').to_lowercase())
        .filter(|token| !token.is_empty())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl SentimentScorer for LexiconScorer {
    fn score(&self, text: &str) -> Result<Sentiment, CoreError> {
        let mut polarities = Vec::new();
        let mut subjectivities = Vec::new();
        let mut intensity = 1.0;
        let mut negated = false;

        for token in tokens(text) {
            if NEGATORS.contains(&token.as_str()) {
                negated = true;
                continue;
            }
            if let Some(factor) = self.intensifiers.get(&token) {
                intensity *= factor;
                continue;
            }

            if let Some(entry) = self.lexicon.get(&token) {
                let mut polarity = entry.polarity * intensity;
                if negated {
                    polarity *= -0.5;
                }
                polarities.push(polarity.clamp(-1.0, 1.0));
                subjectivities.push((entry.subjectivity * intensity).clamp(0.0, 1.0));
            }

            // Modifiers only reach the word directly after them
            intensity = 1.0;
            negated = false;
        }

        if polarities.is_empty() {
            return Ok(Sentiment::neutral());
        }

        let count = polarities.len() as f64;
        let polarity = polarities.iter().sum::<f64>() / count;
        let subjectivity = subjectivities.iter().sum::<f64>() / count;
        debug!("Scored {} sentiment words", polarities.len());

        Ok(Sentiment::new(
            round2(polarity.clamp(-1.0, 1.0)),
            round2(subjectivity.clamp(0.0, 1.0)),
        ))
    }
}
