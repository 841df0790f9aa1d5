/*!
Configuration types for newswatch.

Deserialized from TOML. A default file (`config.default.toml`) can be merged
with an override file (`config.toml`); the override takes precedence. All of
this is loaded once at startup and passed into the pipeline as an immutable
value.
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Database configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the sqlite database file (e.g. "data/newswatch.db")
    pub path: String,
}

/// Scraper settings: request pacing, batching and per-source caps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Maximum number of articles ingested per source per run
    #[serde(default = "default_max_articles_per_site")]
    pub max_articles_per_site: usize,
    /// Delay between consecutive article fetches on the same source
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    /// HTTP request timeout
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Number of sources scraped concurrently within one batch
    #[serde(default = "default_concurrent_sources")]
    pub concurrent_sources: usize,
    /// Cooldown between batches of concurrent source scrapes
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    /// Optional cap on how many sources a run processes (None = all)
    #[serde(default)]
    pub max_sources: Option<usize>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            max_articles_per_site: default_max_articles_per_site(),
            request_delay_ms: default_request_delay_ms(),
            timeout_seconds: default_timeout_seconds(),
            user_agent: default_user_agent(),
            concurrent_sources: default_concurrent_sources(),
            batch_delay_ms: default_batch_delay_ms(),
            max_sources: None,
        }
    }
}

fn default_max_articles_per_site() -> usize {
    50
}
fn default_request_delay_ms() -> u64 {
    1000
}
fn default_timeout_seconds() -> u64 {
    30
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0.0.0 Safari/537.36"
        .to_string()
}
fn default_concurrent_sources() -> usize {
    10
}
fn default_batch_delay_ms() -> u64 {
    5000
}

/// Classifier settings: which model to call and how to apply its output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// OpenAI-compatible chat completions endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Minimum relevance score for an article to be considered relevant
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f64,
    /// Maximum characters of article content sent to the model
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_llm_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Delay between consecutive classification calls
    #[serde(default = "default_classify_delay_ms")]
    pub request_delay_ms: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key_env: default_api_key_env(),
            model: default_model(),
            relevance_threshold: default_relevance_threshold(),
            max_content_length: default_max_content_length(),
            max_tokens: default_llm_max_tokens(),
            timeout_seconds: default_llm_timeout_seconds(),
            request_delay_ms: default_classify_delay_ms(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_relevance_threshold() -> f64 {
    0.5
}
fn default_max_content_length() -> usize {
    5000
}
fn default_llm_max_tokens() -> usize {
    500
}
fn default_llm_timeout_seconds() -> u64 {
    30
}
fn default_classify_delay_ms() -> u64 {
    500
}

/// Optional CSS selector hints for a single source. Anything left unset falls
/// back to the generic selector lists in the extractor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectorHints {
    pub article_links: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub date: Option<String>,
}

/// One configured news source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Unique human-readable name; foreign key for articles and run logs
    pub name: String,
    pub url: String,
    /// Explicit feed flag. When false, the URL is still checked against
    /// feed-indicative patterns before falling back to HTML scraping.
    #[serde(default)]
    pub is_rss: bool,
    pub selectors: Option<SelectorHints>,
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    /// Closed vocabulary of topic labels articles are classified against
    #[serde(default)]
    pub interest_areas: Vec<String>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Load configuration with an optional default file and an optional
    /// override file. If both are present, they are merged (override takes
    /// precedence).
    pub async fn load_with_defaults(
        default_path: Option<&Path>,
        override_path: Option<&Path>,
    ) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        if let Some(path) = default_path {
            if path.exists() {
                let data = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read default config: {}", path.display()))?;
                let val: toml::Value =
                    toml::from_str(&data).context("Failed to parse default configuration")?;
                merge_toml(&mut config_value, val);
            }
        }

        if let Some(path) = override_path {
            if path.exists() {
                let data = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read override config: {}", path.display()))?;
                let val: toml::Value =
                    toml::from_str(&data).context("Failed to parse override configuration")?;
                merge_toml(&mut config_value, val);
            }
        }

        let cfg: Config = config_value
            .try_into()
            .context("Failed to parse merged configuration")?;
        Ok(cfg)
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_string() {
        let toml = r#"
            interest_areas = ["cybersecurity", "disinformation"]

            [database]
            path = "data/test.db"

            [scraper]
            concurrent_sources = 4

            [[sources]]
            name = "Example Feed"
            url = "https://example.com/feed/"
            is_rss = true

            [[sources]]
            name = "Example Site"
            url = "https://example.com"
            [sources.selectors]
            content = ".story-body"
        "#;

        let cfg: Config = toml::from_str(toml).expect("parse config");
        assert_eq!(cfg.scraper.concurrent_sources, 4);
        // Unset fields keep their defaults
        assert_eq!(cfg.scraper.max_articles_per_site, 50);
        assert_eq!(cfg.classifier.relevance_threshold, 0.5);
        assert_eq!(cfg.interest_areas.len(), 2);
        assert_eq!(cfg.sources.len(), 2);
        assert!(cfg.sources[0].is_rss);
        assert!(!cfg.sources[1].is_rss);
        assert_eq!(
            cfg.sources[1]
                .selectors
                .as_ref()
                .and_then(|s| s.content.as_deref()),
            Some(".story-body")
        );
    }

    #[test]
    fn merge_override_wins() {
        let mut base: toml::Value = toml::from_str(
            r#"
            [database]
            path = "data/default.db"
            [scraper]
            timeout_seconds = 30
        "#,
        )
        .unwrap();
        let over: toml::Value = toml::from_str(
            r#"
            [database]
            path = "data/override.db"
        "#,
        )
        .unwrap();
        merge_toml(&mut base, over);
        let cfg: Config = base.try_into().unwrap();
        assert_eq!(cfg.database.path, "data/override.db");
        assert_eq!(cfg.scraper.timeout_seconds, 30);
    }
}
