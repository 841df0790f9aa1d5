/*!
Run orchestration: scrape all sources, filter against the store, classify
whatever is new, persist, and log per-source statistics. Every stage tolerates
partial failure: a dead source, a dedup collision or a failed classification
reduces the run's yield, never aborts it.
*/

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use crate::classifier::RelevanceClassifier;
use crate::config::Config;
use crate::llm::LlmProvider;
use crate::scrape::Scraper;
use crate::storage::{Article, ArticleStore};

/// Counts reported after one full pipeline run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Articles produced by scraping, before dedup
    pub scraped: usize,
    /// Articles not previously known to the store
    pub new: usize,
    /// Articles actually persisted this run
    pub saved: usize,
    /// Persisted articles meeting the relevance threshold
    pub relevant: usize,
}

/// Execute one ingestion-and-classification run over the configured sources.
pub async fn run(
    config: &Config,
    store: &ArticleStore,
    provider: Arc<dyn LlmProvider>,
) -> Result<RunSummary> {
    let sources = match config.scraper.max_sources {
        Some(max) => &config.sources[..config.sources.len().min(max)],
        None => &config.sources[..],
    };
    info!("starting run over {} sources", sources.len());

    // Step 1: scrape all sources
    let scraper = Arc::new(Scraper::new(config.scraper.clone())?);
    let reports = scraper.scrape_all(sources).await;
    let scraped: usize = reports.iter().map(|r| r.articles.len()).sum();
    info!("total articles scraped: {}", scraped);

    // Step 2: filter out articles the store already knows
    let mut new_articles: Vec<Article> = Vec::new();
    for report in &reports {
        for article in &report.articles {
            match store.exists(&article.url, &article.title).await {
                Ok(true) => {}
                Ok(false) => new_articles.push(article.clone()),
                Err(e) => {
                    // Treat a failed lookup as already-known; the article
                    // will be picked up again on the next run.
                    warn!("existence check failed for {}: {:#}", article.url, e);
                }
            }
        }
    }
    let new_count = new_articles.len();
    info!("new articles found: {}", new_count);

    // Step 3: log one row per source before the classification stage so the
    // audit trail survives even if classification goes poorly
    for report in &reports {
        let found = report.articles.len();
        let new = report
            .articles
            .iter()
            .filter(|a| new_articles.iter().any(|n| n.url == a.url))
            .count();
        let status = if report.error.is_some() { "error" } else { "success" };
        if let Err(e) = store
            .log_run(&report.source, found, new, status, report.error.as_deref())
            .await
        {
            warn!("failed to log run for {}: {:#}", report.source, e);
        }
    }

    if new_articles.is_empty() {
        info!("no new articles to analyze");
        return Ok(RunSummary {
            scraped,
            ..Default::default()
        });
    }

    // Step 4: classify new articles (sequential, rate limited)
    let classifier = RelevanceClassifier::new(
        provider,
        &config.classifier,
        config.interest_areas.clone(),
    );
    classifier.classify_batch(&mut new_articles).await;

    // Step 5: persist. A collision here means another writer got there
    // first; the article is skipped, not an error.
    let mut saved = 0usize;
    let mut relevant = 0usize;
    for article in &new_articles {
        match store.save(article).await {
            Ok(true) => {
                saved += 1;
                if article.relevance_score.unwrap_or(0.0) >= classifier.threshold() {
                    relevant += 1;
                }
            }
            Ok(false) => {
                info!("skipped already-known article: {}", article.url);
            }
            Err(e) => {
                warn!("failed to save article {}: {:#}", article.url, e);
            }
        }
    }

    info!(
        "run complete: scraped={} new={} saved={} relevant={}",
        scraped, new_count, saved, relevant
    );

    Ok(RunSummary {
        scraped,
        new: new_count,
        saved,
        relevant,
    })
}
