use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::CoreError;

/// Author recorded when the remote account no longer exists.
pub const DELETED_AUTHOR: &str = "[deleted]";

/// Ordering mode of a community listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingSort {
    Hot,
    New,
    Top,
}

impl ListingSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingSort::Hot => "hot",
            ListingSort::New => "new",
            ListingSort::Top => "top",
        }
    }
}

impl fmt::Display for ListingSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingSort {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hot" => Ok(ListingSort::Hot),
            "new" => Ok(ListingSort::New),
            "top" => Ok(ListingSort::Top),
            other => Err(CoreError::InvalidInput {
                message: format!("unknown listing sort '{}'", other),
            }),
        }
    }
}

/// A post as handed over by a content source, before any filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct RawItem {
    pub id: String,
    pub title: String,
    pub body: String,
    pub author: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub score: i64,
    pub num_comments: u64,
    pub permalink: String,
}

/// A comment as handed over by a content source.
#[derive(Debug, Clone, PartialEq)]
pub struct RawComment {
    pub id: String,
    pub body: String,
    pub author: Option<String>,
    pub score: i64,
    pub created_utc: DateTime<Utc>,
}

/// Polarity in [-1, 1], subjectivity in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Sentiment {
    pub polarity: f64,
    pub subjectivity: f64,
}

impl Sentiment {
    pub fn new(polarity: f64, subjectivity: f64) -> Self {
        Self {
            polarity,
            subjectivity,
        }
    }

    pub fn neutral() -> Self {
        Self::default()
    }
}

/// A collected post, enriched with its derived fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub community: String,
    pub id: String,
    pub title: String,
    pub body: String,
    pub author: String,
    pub created_utc: DateTime<Utc>,
    pub score: i64,
    pub num_comments: u64,
    pub url: String,
    pub sort: ListingSort,
    pub pain_points: Vec<String>,
    pub sentiment: Sentiment,
    pub price_mentions: Vec<String>,
}

impl Record {
    /// Engagement used for ranking discussions by overall activity.
    pub fn engagement(&self) -> i64 {
        self.score.saturating_add(self.num_comments as i64)
    }
}

/// A collected comment with its derived fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub post_id: String,
    pub comment_id: String,
    pub body: String,
    pub author: String,
    pub score: i64,
    pub created_utc: DateTime<Utc>,
    pub mentions_solution: bool,
    pub price_mentions: Vec<String>,
}

/// One pain-point category and the phrases that trigger it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    /// Human-readable label used in narrative reports.
    #[serde(default)]
    pub label: Option<String>,
    pub triggers: Vec<String>,
}

impl Category {
    pub fn new(name: &str, label: &str, triggers: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            label: Some(label.to_string()),
            triggers: triggers.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

/// Ordered category keyword table, read-only for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Category>", into = "Vec<Category>")]
pub struct CategoryTable {
    categories: Vec<Category>,
}

impl CategoryTable {
    pub fn new(categories: Vec<Category>) -> Self {
        let categories = categories
            .into_iter()
            .map(|mut category| {
                category.triggers = category
                    .triggers
                    .iter()
                    .map(|t| t.to_lowercase())
                    .filter(|t| !t.is_empty())
                    .collect();
                category
            })
            .collect();
        Self { categories }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|c| c.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// Label for a category name, falling back to the name itself.
    pub fn label_for<'a>(&'a self, name: &'a str) -> &'a str {
        self.get(name).map(Category::display_label).unwrap_or(name)
    }

    pub fn triggers(&self) -> impl Iterator<Item = &str> {
        self.categories
            .iter()
            .flat_map(|c| c.triggers.iter().map(String::as_str))
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }
}

impl From<Vec<Category>> for CategoryTable {
    fn from(categories: Vec<Category>) -> Self {
        Self::new(categories)
    }
}

impl From<CategoryTable> for Vec<Category> {
    fn from(table: CategoryTable) -> Self {
        table.categories
    }
}

impl Default for CategoryTable {
    fn default() -> Self {
        Self::new(vec![
            Category::new(
                "competitor_spying",
                "Competitor monitoring",
                &[
                    "spy on competitors",
                    "competitor ads",
                    "what ads running",
                    "competitive analysis",
                    "competitor research",
                    "spy tool",
                    "see competitor ads",
                    "track competitors",
                ],
            ),
            Category::new(
                "ad_cost",
                "Ad cost",
                &[
                    "ads expensive",
                    "high cpc",
                    "rising costs",
                    "budget waste",
                    "cpm increase",
                    "roas decrease",
                    "losing money",
                    "ad costs",
                    "too expensive",
                    "burning money",
                ],
            ),
            Category::new(
                "optimization",
                "Optimization",
                &[
                    "optimize ads",
                    "improve performance",
                    "better roas",
                    "conversion rate",
                    "ad fatigue",
                    "creative ideas",
                    "what works",
                    "best practices",
                ],
            ),
            Category::new(
                "analytics",
                "Analytics",
                &[
                    "track metrics",
                    "understand data",
                    "analytics confusing",
                    "which metrics",
                    "reporting",
                    "dashboard",
                    "measure roi",
                ],
            ),
            Category::new(
                "targeting",
                "Audience targeting",
                &[
                    "audience targeting",
                    "find customers",
                    "interests",
                    "lookalike",
                    "custom audience",
                    "retargeting",
                    "who to target",
                ],
            ),
        ])
    }
}
