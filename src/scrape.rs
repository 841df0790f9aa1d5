/*!
Per-source scraping and the batch scheduler.

A source is either a syndication feed or a plain HTML site. Feeds are the
cheap path: one fetch, one parse. HTML sites cost a homepage fetch plus one
fetch per article link, paced with an inter-request delay. The scheduler runs
sources in fixed-size concurrent batches with a cooldown between batches, and
converts any per-source failure into an empty result so sibling sources are
never affected.
*/

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};
use url::Url;

use crate::config::{ScraperConfig, SourceConfig};
use crate::extract::{extract_article, extract_article_links};
use crate::feed::parse_entries;
use crate::fetch::Fetcher;
use crate::storage::Article;

/// URL fragments conventionally associated with syndication feeds. Checked
/// even when `is_rss` is false, as a safety net against misconfigured
/// source entries.
const FEED_URL_PATTERNS: [&str; 6] = ["/feed", "/rss", ".xml", ".atom", "feedburner", "feeds."];

/// True when the source should be scraped via the feed path.
pub fn uses_feed_strategy(source: &SourceConfig) -> bool {
    if source.is_rss {
        return true;
    }
    let url = source.url.to_lowercase();
    FEED_URL_PATTERNS.iter().any(|p| url.contains(p))
}

/// Scrape outcome for one source within a run.
#[derive(Debug)]
pub struct SourceReport {
    pub source: String,
    pub articles: Vec<Article>,
    pub error: Option<String>,
}

pub struct Scraper {
    fetcher: Fetcher,
    config: ScraperConfig,
}

impl Scraper {
    pub fn new(config: ScraperConfig) -> Result<Self> {
        let fetcher = Fetcher::new(config.timeout_seconds, &config.user_agent)?;
        Ok(Self { fetcher, config })
    }

    /// Scrape one source, choosing the feed or HTML strategy. Returned
    /// articles carry no classification fields yet.
    pub async fn scrape_source(&self, source: &SourceConfig) -> Result<Vec<Article>> {
        info!("scraping {}...", source.name);

        if uses_feed_strategy(source) {
            let articles = self.scrape_feed(source).await?;
            info!("found {} articles from feed: {}", articles.len(), source.name);
            return Ok(articles);
        }

        self.scrape_html(source).await
    }

    async fn scrape_feed(&self, source: &SourceConfig) -> Result<Vec<Article>> {
        let Ok(feed_text) = self.fetcher.fetch(&source.url).await else {
            // Fetch already logged the condition; a failed fetch simply
            // yields zero articles for this source.
            return Ok(Vec::new());
        };

        let entries = parse_entries(&feed_text, self.config.max_articles_per_site);

        Ok(entries
            .into_iter()
            .filter(|entry| !entry.link.is_empty())
            .map(|entry| {
                Article::new(
                    entry.link,
                    entry.title,
                    entry.content,
                    source.name.clone(),
                    entry.published.map(|d| d.to_rfc3339()),
                )
            })
            .collect())
    }

    async fn scrape_html(&self, source: &SourceConfig) -> Result<Vec<Article>> {
        let Ok(html) = self.fetcher.fetch(&source.url).await else {
            return Ok(Vec::new());
        };

        let base_url = Url::parse(&source.url)
            .with_context(|| format!("invalid source URL: {}", source.url))?;
        let links = extract_article_links(
            &html,
            &base_url,
            source.selectors.as_ref(),
            self.config.max_articles_per_site,
        );
        info!("found {} article links on {}", links.len(), source.name);

        let mut articles = Vec::new();
        for (i, link) in links.iter().enumerate() {
            if i > 0 {
                sleep(Duration::from_millis(self.config.request_delay_ms)).await;
            }

            let Ok(page) = self.fetcher.fetch(link).await else {
                continue;
            };
            let extracted = extract_article(&page, source.selectors.as_ref());
            if extracted.content.is_empty() {
                continue;
            }
            articles.push(Article::new(
                link.clone(),
                extracted.title,
                extracted.content,
                source.name.clone(),
                extracted.date,
            ));
        }

        Ok(articles)
    }

    /// Scrape all sources in fixed-size concurrent batches with a cooldown
    /// between batches. A failing source contributes an empty report with its
    /// error recorded; it never cancels siblings in flight.
    pub async fn scrape_all(self: &Arc<Self>, sources: &[SourceConfig]) -> Vec<SourceReport> {
        let batch_size = self.config.concurrent_sources.max(1);
        let batch_delay = Duration::from_millis(self.config.batch_delay_ms);
        let mut reports = Vec::with_capacity(sources.len());

        for (batch_index, batch) in sources.chunks(batch_size).enumerate() {
            if batch_index > 0 {
                info!("waiting {:?} before next batch...", batch_delay);
                sleep(batch_delay).await;
            }
            info!(
                "processing batch {} ({} sources)...",
                batch_index + 1,
                batch.len()
            );

            let mut handles = Vec::with_capacity(batch.len());
            for source in batch {
                let scraper = Arc::clone(self);
                let source = source.clone();
                let name = source.name.clone();
                handles.push((
                    name,
                    tokio::spawn(async move { scraper.scrape_source(&source).await }),
                ));
            }

            for (name, handle) in handles {
                let report = match handle.await {
                    Ok(Ok(articles)) => SourceReport {
                        source: name,
                        articles,
                        error: None,
                    },
                    Ok(Err(e)) => {
                        error!("error scraping {}: {:#}", name, e);
                        SourceReport {
                            source: name,
                            articles: Vec::new(),
                            error: Some(format!("{:#}", e)),
                        }
                    }
                    Err(e) => {
                        warn!("scrape task for {} panicked: {}", name, e);
                        SourceReport {
                            source: name,
                            articles: Vec::new(),
                            error: Some(format!("task failure: {}", e)),
                        }
                    }
                };
                reports.push(report);
            }
        }

        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(url: &str, is_rss: bool) -> SourceConfig {
        SourceConfig {
            name: "Test".to_string(),
            url: url.to_string(),
            is_rss,
            selectors: None,
        }
    }

    #[test]
    fn explicit_flag_selects_feed_path() {
        assert!(uses_feed_strategy(&source("https://example.com/news", true)));
    }

    #[test]
    fn feed_urls_are_autodetected() {
        for url in [
            "https://example.com/feed/",
            "https://example.com/rss",
            "https://example.com/news.xml",
            "https://example.com/index.atom",
            "https://feedburner.google.com/example",
            "https://feeds.example.com/latest",
            "https://EXAMPLE.com/FEED/",
        ] {
            assert!(uses_feed_strategy(&source(url, false)), "{}", url);
        }
    }

    #[test]
    fn plain_sites_use_html_path() {
        assert!(!uses_feed_strategy(&source("https://example.com/news", false)));
    }
}
