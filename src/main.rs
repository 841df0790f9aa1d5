/*
newswatch - main.rs
Thin CLI over the ingestion pipeline: loads configuration, initializes the
store and the LLM provider, runs the pipeline and renders its output.
*/

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use newswatch::config::Config;
use newswatch::llm::remote::RemoteLlmProvider;
use newswatch::pipeline;
use newswatch::storage::ArticleStore;

#[derive(Parser, Debug)]
#[command(name = "newswatch", about = "News scraper with LLM relevance analysis")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scrape all sources, classify new articles and persist them (default)
    Run,
    /// List stored articles above a relevance threshold
    Articles {
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value_t = 0.7)]
        min_relevance: f64,
        #[arg(long)]
        source: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    // Resolve config paths: shipped defaults, optionally overridden
    let default_path = PathBuf::from("config.default.toml");
    let override_path = if let Some(p) = args.config {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            return Err(anyhow::anyhow!("Config file not found: {}", p.display()));
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() {
            Some(p)
        } else {
            None
        }
    };

    let config = Config::load_with_defaults(
        if default_path.exists() {
            Some(&default_path)
        } else {
            None
        },
        override_path.as_deref(),
    )
    .await
    .context("failed to load configuration")?;
    info!(default = ?default_path, override = ?override_path, "configuration loaded");

    let store = ArticleStore::open(&config.database.path)
        .await
        .context("failed to open article store")?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run_pipeline(&config, &store).await,
        Command::Articles {
            limit,
            min_relevance,
            source,
        } => show_articles(&store, limit, min_relevance, source.as_deref()).await,
    }
}

async fn run_pipeline(config: &Config, store: &ArticleStore) -> Result<()> {
    // Missing credential is the one fatal startup error
    let api_key = std::env::var(&config.classifier.api_key_env).with_context(|| {
        format!(
            "LLM API key env var '{}' not set",
            config.classifier.api_key_env
        )
    })?;

    let provider = RemoteLlmProvider::new(
        config.classifier.api_url.clone(),
        api_key,
        config.classifier.model.clone(),
    )
    .with_defaults(
        config.classifier.timeout_seconds,
        config.classifier.max_tokens,
        0.3,
    );

    let summary = pipeline::run(config, store, Arc::new(provider)).await?;

    println!("{}", "=".repeat(60));
    println!("Run summary");
    println!("{}", "=".repeat(60));
    println!("Articles scraped:  {}", summary.scraped);
    println!("New articles:      {}", summary.new);
    println!("Articles saved:    {}", summary.saved);
    println!("Relevant articles: {}", summary.relevant);

    let stats = store.stats().await?;
    println!();
    println!("Total articles in database: {}", stats.total_articles);
    println!("Relevant articles (>= 0.5): {}", stats.relevant_articles);
    println!("Articles by source:");
    for (source, count) in stats.by_source.iter().take(10) {
        println!("  - {}: {}", source, count);
    }
    if stats.by_source.len() > 10 {
        println!("  ... and {} more sources", stats.by_source.len() - 10);
    }

    println!();
    println!("Top relevant articles (score >= 0.7):");
    println!("{}", "-".repeat(60));
    let top = store.relevant_articles(10, 0.7, None).await?;
    print_articles(&top);

    Ok(())
}

async fn show_articles(
    store: &ArticleStore,
    limit: usize,
    min_relevance: f64,
    source: Option<&str>,
) -> Result<()> {
    let articles = store.relevant_articles(limit, min_relevance, source).await?;
    if articles.is_empty() {
        println!("No articles at or above relevance {}", min_relevance);
        return Ok(());
    }
    print_articles(&articles);
    Ok(())
}

fn print_articles(articles: &[newswatch::storage::Article]) {
    for (i, article) in articles.iter().enumerate() {
        println!("\n{}. {}", i + 1, article.title);
        println!("   Source: {}", article.source);
        if let Some(score) = article.relevance_score {
            println!("   Relevance: {:.2}", score);
        }
        if !article.areas.is_empty() {
            println!("   Areas: {}", article.areas.join(", "));
        }
        println!("   URL: {}", article.url);
        if let Some(summary) = &article.summary {
            println!("   {}", summary);
        }
    }
}
