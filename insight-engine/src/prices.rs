use painpoint_core::CoreError;
use regex::Regex;

/// At most this many price mentions are kept per text.
pub const MAX_PRICE_MENTIONS: usize = 3;

const PRICE_PATTERNS: &[&str] = &[
    r"\$\d+(?:\.\d{2})?(?:/(?:month|mo|year|yr))?",
    r"\d+\s*(?:dollars|usd|bucks)",
    r"(?:pay|spend|cost|budget)\s*\d+",
];

/// Pulls price-like substrings out of free text.
#[derive(Debug, Clone)]
pub struct PriceExtractor {
    patterns: Vec<Regex>,
}

impl PriceExtractor {
    pub fn new() -> Result<Self, CoreError> {
        let patterns = PRICE_PATTERNS
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| CoreError::Internal {
                    message: format!("invalid price pattern {}: {}", pattern, e),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Matches against the lower-cased text, pattern by pattern, first
    /// found first.
    pub fn extract(&self, text: &str) -> Vec<String> {
        let text = text.to_lowercase();
        self.patterns
            .iter()
            .flat_map(|pattern| pattern.find_iter(&text))
            .take(MAX_PRICE_MENTIONS)
            .map(|m| m.as_str().to_string())
            .collect()
    }

    pub fn patterns(&self) -> &[Regex] {
        &self.patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_subscription_price() {
        let extractor = PriceExtractor::new().unwrap();
        assert_eq!(
            extractor.extract("ads are too expensive, need a spy tool for $99/month"),
            vec!["$99/month"]
        );
    }

    #[test]
    fn test_extract_all_pattern_kinds() {
        let extractor = PriceExtractor::new().unwrap();
        let found = extractor.extract("I Spend 500 dollars a week, was $12.50 before");
        assert_eq!(found, vec!["$12.50", "500 dollars", "spend 500"]);
    }

    #[test]
    fn test_extract_caps_at_three() {
        let extractor = PriceExtractor::new().unwrap();
        let found = extractor.extract("$1 $2 $3 $4 $5/yr");
        assert_eq!(found.len(), MAX_PRICE_MENTIONS);
        assert_eq!(found, vec!["$1", "$2", "$3"]);
    }

    #[test]
    fn test_every_match_fits_a_pattern() {
        let extractor = PriceExtractor::new().unwrap();
        for mention in extractor.extract("budget 300, 40 bucks, $7/mo") {
            assert!(extractor.patterns().iter().any(|p| p.is_match(&mention)));
        }
    }

    #[test]
    fn test_no_prices() {
        let extractor = PriceExtractor::new().unwrap();
        assert!(extractor.extract("no numbers at all").is_empty());
        assert!(extractor.extract("").is_empty());
    }
}
