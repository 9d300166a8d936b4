use insight_engine::{Report, SentimentBucket};
use painpoint_core::CategoryTable;
use std::fmt::Write;

fn percent_of(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

fn joined_or(values: &[String], empty: &str) -> String {
    if values.is_empty() {
        empty.to_string()
    } else {
        values.join(", ")
    }
}

/// Render the human-readable narrative of a report.
pub fn render_markdown(report: &Report, categories: &CategoryTable) -> String {
    let mut md = String::new();
    // Writing into a String cannot fail
    let _ = write_report(&mut md, report, categories);
    md
}

fn write_report(
    md: &mut String,
    report: &Report,
    categories: &CategoryTable,
) -> std::fmt::Result {
    let meta = &report.metadata;
    let communities: Vec<String> = meta.communities.iter().map(|c| format!("r/{}", c)).collect();

    writeln!(md, "# Pain-point research report - {}", meta.run_id)?;
    writeln!(md)?;
    writeln!(md, "## Overview")?;
    writeln!(md, "- **Generated at**: {}", meta.generated_at)?;
    writeln!(md, "- **Posts analyzed**: {}", meta.posts_analyzed)?;
    writeln!(md, "- **Comments analyzed**: {}", meta.comments_analyzed)?;
    writeln!(md, "- **Communities**: {}", joined_or(&communities, "none"))?;
    writeln!(md)?;

    writeln!(md, "## Pain points")?;
    writeln!(md)?;
    if report.pain_points.is_empty() {
        writeln!(md, "No pain points were matched.")?;
    }
    for entry in &report.pain_points {
        writeln!(
            md,
            "- **{}**: {} mentions ({:.1}% of posts)",
            categories.label_for(&entry.category),
            entry.count,
            percent_of(entry.count, meta.posts_analyzed)
        )?;
    }
    writeln!(md)?;

    let sentiment = &report.sentiment_analysis;
    writeln!(md, "## Sentiment")?;
    writeln!(
        md,
        "- **Average polarity**: {} (-1 most negative, 1 most positive)",
        sentiment.average_sentiment
    )?;
    for bucket in SentimentBucket::ALL {
        writeln!(
            md,
            "- **{}** ({}): {} posts",
            bucket.label(),
            bucket.range(),
            sentiment.distribution.count(bucket)
        )?;
    }
    writeln!(md)?;

    writeln!(md, "## Top discussions")?;
    for (rank, post) in report.top_discussions.iter().enumerate() {
        let labels: Vec<String> = post
            .pain_points
            .iter()
            .map(|p| categories.label_for(p).to_string())
            .collect();
        writeln!(md)?;
        writeln!(md, "### {}. {}", rank + 1, post.title)?;
        writeln!(md, "- **Community**: r/{}", post.community)?;
        writeln!(
            md,
            "- **Engagement**: {} points, {} comments",
            post.score, post.num_comments
        )?;
        writeln!(md, "- **Pain points**: {}", joined_or(&labels, "none identified"))?;
        writeln!(md, "- **Prices mentioned**: {}", joined_or(&post.price_mentions, "none"))?;
        writeln!(md, "- **[View thread]({})**", post.url)?;
    }

    if !report.price_insights.is_empty() {
        writeln!(md)?;
        writeln!(md, "## Price insights")?;
        writeln!(md)?;
        for entry in &report.price_insights {
            writeln!(md, "- `{}`: {} mentions", entry.price, entry.count)?;
        }
    }

    if let Some(solutions) = &report.solution_mentions {
        writeln!(md)?;
        writeln!(md, "## Solution discussions")?;
        writeln!(md, "- **Comments mentioning a solution**: {}", solutions.total)?;
        writeln!(md, "- **Share of all comments**: {}%", solutions.percentage)?;
    }

    writeln!(md)?;
    writeln!(md, "---")?;
    writeln!(md, "*Generated at {}*", meta.generated_at)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use insight_engine::Aggregator;

    fn empty_report() -> Report {
        let at = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        Aggregator::new().aggregate(&[], None, at)
    }

    #[test]
    fn test_empty_report_renders() {
        let md = render_markdown(&empty_report(), &CategoryTable::default());
        assert!(md.starts_with("# Pain-point research report - 20240102_030405"));
        assert!(md.contains("- **Posts analyzed**: 0"));
        assert!(md.contains("No pain points were matched."));
        assert!(md.contains("- **Very negative** (< -0.5): 0 posts"));
        assert!(!md.contains("## Price insights"));
        assert!(!md.contains("## Solution discussions"));
    }

    #[test]
    fn test_labels_and_percentages() {
        let mut report = empty_report();
        report.metadata.posts_analyzed = 4;
        report.pain_points = vec![
            insight_engine::CategoryCount {
                category: "competitor_spying".to_string(),
                count: 3,
            },
            insight_engine::CategoryCount {
                category: "shipping".to_string(),
                count: 1,
            },
        ];

        let md = render_markdown(&report, &CategoryTable::default());
        assert!(md.contains("- **Competitor monitoring**: 3 mentions (75.0% of posts)"));
        assert!(md.contains("- **shipping**: 1 mentions (25.0% of posts)"));
    }

    #[test]
    fn test_percentage_with_no_posts() {
        assert_eq!(percent_of(3, 0), 0.0);
    }
}
