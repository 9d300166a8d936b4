use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use insight_engine::{Aggregator, Collector, LexiconScorer, SentimentScorer};
use painpoint_core::{CoreError, ErrorExt, RedditCredentials, ResearchConfig};
use reddit_client::RedditClient;
use report_export::{Exporter, RunOutput};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Collect public Reddit discussions and summarise advertising pain points.
#[derive(Parser, Debug)]
#[command(name = "painpoint", version, about)]
struct Cli {
    /// TOML configuration file; defaults apply when it does not exist
    #[arg(short, long, default_value = "painpoint.toml")]
    config: PathBuf,

    /// Directory for the exported files
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Keep every post, not only those matching a pain-point phrase
    #[arg(long)]
    collect_all: bool,

    /// Collect comments without asking
    #[arg(long, conflicts_with = "no_comments")]
    comments: bool,

    /// Skip comment collection without asking
    #[arg(long)]
    no_comments: bool,

    /// Only keep posts from the last N days
    #[arg(long)]
    window_days: Option<u32>,

    /// Posts to keep per community
    #[arg(long)]
    limit: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let default_filter = ["painpoint", "insight_engine", "reddit_client", "report_export"]
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect::<Vec<_>>()
        .join(",");

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();
}

fn load_config(cli: &Cli) -> Result<ResearchConfig> {
    let mut config = ResearchConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    if cli.collect_all {
        config.safe_mode = false;
    }
    if let Some(days) = cli.window_days {
        config.window_days = days;
    }
    if let Some(limit) = cli.limit {
        config.per_community_limit = limit;
    }
    config.validate().context("validating command line overrides")?;
    Ok(config)
}

fn load_scorer(config: &ResearchConfig) -> Result<Arc<dyn SentimentScorer>> {
    let scorer = match &config.lexicon_path {
        Some(path) => LexiconScorer::with_lexicon_file(path)
            .with_context(|| format!("loading lexicon {}", path.display()))?,
        None => LexiconScorer::new(),
    };
    let scorer: Arc<dyn SentimentScorer> = Arc::new(scorer);
    Ok(scorer)
}

fn ask_yes_no(question: &str) -> io::Result<bool> {
    print!("{} (y/n): ", question);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let credentials = RedditCredentials::from_env().context("reading Reddit credentials")?;
    let scorer = load_scorer(&config)?;

    let client = RedditClient::new(&credentials, &config.user_agent)?;
    info!("Authenticating with Reddit ({:?})", client.grant_mode());
    client.authenticate().await.context("authenticating with Reddit")?;

    info!(
        "Collecting from {} communities (safe mode: {}, up to {} posts each), estimated {} min",
        config.communities.len(),
        config.safe_mode,
        config.effective_limit(),
        config.estimated_duration().as_secs() / 60
    );

    let collector = Collector::new(client, &config, scorer)?;
    let records = collector.collect().await?;
    if records.is_empty() {
        warn!("No matching posts found, nothing to export");
        return Ok(());
    }

    let want_comments = if cli.comments {
        true
    } else if cli.no_comments {
        false
    } else {
        ask_yes_no(&format!(
            "Collect comments for the top {} discussions? This takes a few more minutes.",
            config.comment_posts_limit
        ))?
    };

    let comments = if want_comments {
        let candidates = collector.select_comment_candidates(&records);
        Some(
            collector
                .collect_comments(&candidates, config.comment_posts_limit)
                .await?,
        )
    } else {
        None
    };

    let aggregator = Aggregator::new();
    let report = aggregator.aggregate(&records, comments.as_deref(), Local::now().naive_local());

    let exported = Exporter::new(&config.output_dir).export(RunOutput {
        records: &records,
        comments: comments.as_deref(),
        report: &report,
        categories: &config.categories,
    })?;

    let metrics = collector.source().get_api_metrics().await;
    info!(
        "API usage: {} requests ({} failed, {} rate limited), average response {:?}, throttled {:?}",
        metrics.total_requests,
        metrics.failed_requests,
        metrics.rate_limited_requests,
        metrics.average_response_time(),
        metrics.total_throttle_wait
    );
    let retries = collector.source().get_retry_metrics();
    info!(
        "Retries: {} attempted, {} recovered, {} operations failed, circuit opened {} times",
        retries.total_retries,
        retries.successful_retries,
        retries.failed_operations,
        retries.circuit_breaker_trips
    );

    let findings = aggregator.key_findings(&report);
    println!();
    println!("Research complete, run {}", exported.run_id);
    for file in exported.files() {
        println!("  {}", file.display());
    }
    println!();
    println!("Key findings:");
    if let Some(top) = &findings.top_pain_point {
        println!(
            "  - Main pain point: {} ({} mentions)",
            config.categories.label_for(&top.category),
            top.count
        );
    }
    println!(
        "  - Overall mood: {} (average polarity {})",
        findings.mood, report.sentiment_analysis.average_sentiment
    );
    if let Some(price) = &findings.top_price {
        println!("  - Most mentioned price: {}", price.price);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            match error.downcast_ref::<CoreError>() {
                Some(core_error) => {
                    core_error.log_error();
                    eprintln!("Error: {}", core_error.user_friendly_message());
                }
                None => tracing::error!("{:#}", error),
            }
            eprintln!("Run aborted, no artifacts were written.");
            ExitCode::FAILURE
        }
    }
}
