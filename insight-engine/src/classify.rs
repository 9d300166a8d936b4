use painpoint_core::CategoryTable;

/// Tags text with the pain-point categories whose trigger phrases it contains.
#[derive(Debug, Clone)]
pub struct Classifier {
    table: CategoryTable,
}

impl Classifier {
    pub fn new(table: CategoryTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &CategoryTable {
        &self.table
    }

    /// Names of every matching category, in table order.
    pub fn classify(&self, text: &str) -> Vec<String> {
        let text = text.to_lowercase();
        self.table
            .categories()
            .iter()
            .filter(|category| category.triggers.iter().any(|t| text.contains(t.as_str())))
            .map(|category| category.name.clone())
            .collect()
    }

    /// Whether any trigger phrase of any category occurs in `text`.
    pub fn matches_any(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.table.triggers().any(|t| text.contains(t))
    }
}

/// Detects comments that point at an existing tool or service.
#[derive(Debug, Clone)]
pub struct SolutionDetector {
    keywords: Vec<String>,
}

impl SolutionDetector {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    pub fn mentions_solution(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }
}
