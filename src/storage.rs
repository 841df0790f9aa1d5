/*!
SQLite-backed article store.

The store is the sole arbiter of article uniqueness: both the URL and the
(url, title) fingerprint carry UNIQUE constraints, and `save` treats a
constraint violation as "already known" rather than an error. That makes
concurrent writers racing on the same article benign and re-runs over
unchanged sources idempotent.
*/

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// One scraped article. Classification fields stay unset until the
/// relevance classifier has run; once persisted the record is immutable.
#[derive(Debug, Clone)]
pub struct Article {
    pub url: String,
    pub title: String,
    pub content: String,
    /// Name of the source this article came from
    pub source: String,
    /// Source-supplied publication date: RFC 3339 when the feed gave a
    /// structured timestamp, otherwise whatever string the page exposed.
    pub published: Option<String>,
    /// Assigned when the article is first seen by the scraper
    pub scraped_at: DateTime<Utc>,
    pub relevance_score: Option<f64>,
    pub areas: Vec<String>,
    pub summary: Option<String>,
    /// Set once a downstream consumer has acted on the article. New records
    /// always start unprocessed.
    pub processed: bool,
}

impl Article {
    pub fn new(
        url: String,
        title: String,
        content: String,
        source: String,
        published: Option<String>,
    ) -> Self {
        Self {
            url,
            title,
            content,
            source,
            published,
            scraped_at: Utc::now(),
            relevance_score: None,
            areas: Vec::new(),
            summary: None,
            processed: false,
        }
    }
}

/// Outcome counts and status for one (source, run) pair.
#[derive(Debug, Clone)]
pub struct RunLogEntry {
    pub source: String,
    pub run_date: DateTime<Utc>,
    pub articles_found: i64,
    pub articles_new: i64,
    pub status: String,
    pub error_message: Option<String>,
}

/// Aggregate numbers for the CLI summary display.
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub total_articles: i64,
    pub relevant_articles: i64,
    pub by_source: Vec<(String, i64)>,
    pub recent_runs: Vec<RunLogEntry>,
}

/// Deterministic dedup key derived from url + title. Identical inputs always
/// produce the identical key.
pub fn fingerprint(url: &str, title: &str) -> String {
    format!("{:x}", md5::compute(format!("{}{}", url, title)))
}

pub struct ArticleStore {
    pool: SqlitePool,
}

impl ArticleStore {
    /// Open (creating if necessary) the database at `path` and ensure the
    /// schema exists. The parent directory is created when missing.
    pub async fn open(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.with_context(|| {
                    format!("Failed to create DB parent directory: {}", parent.display())
                })?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to sqlite database at path: {}", path))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT UNIQUE NOT NULL,
                title TEXT NOT NULL,
                content TEXT,
                source TEXT NOT NULL,
                published_date TEXT,
                scraped_date TEXT NOT NULL,
                relevance_score REAL,
                areas_of_interest TEXT,
                summary TEXT,
                fingerprint TEXT UNIQUE NOT NULL,
                processed BOOLEAN DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create articles table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scraping_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source TEXT NOT NULL,
                run_date TEXT NOT NULL,
                articles_found INTEGER,
                articles_new INTEGER,
                status TEXT,
                error_message TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create scraping_log table")?;

        for stmt in [
            "CREATE INDEX IF NOT EXISTS idx_url ON articles(url)",
            "CREATE INDEX IF NOT EXISTS idx_fingerprint ON articles(fingerprint)",
            "CREATE INDEX IF NOT EXISTS idx_scraped_date ON articles(scraped_date)",
            "CREATE INDEX IF NOT EXISTS idx_relevance_score ON articles(relevance_score)",
        ] {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .context("failed to create index")?;
        }

        Ok(())
    }

    /// True if a record with the same fingerprint or the same URL exists.
    pub async fn exists(&self, url: &str, title: &str) -> Result<bool> {
        let key = fingerprint(url, title);
        let row = sqlx::query("SELECT 1 FROM articles WHERE fingerprint = ? OR url = ?")
            .bind(&key)
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .context("failed to check existing article")?;
        Ok(row.is_some())
    }

    /// Insert the article if it is not already known. Returns false both when
    /// the pre-check finds it and when a concurrent writer won the race to
    /// the uniqueness constraint; that race is benign because article
    /// identity derives purely from the article's own content.
    pub async fn save(&self, article: &Article) -> Result<bool> {
        if self.exists(&article.url, &article.title).await? {
            return Ok(false);
        }

        let key = fingerprint(&article.url, &article.title);
        let areas = if article.areas.is_empty() {
            None
        } else {
            Some(article.areas.join(","))
        };

        let result = sqlx::query(
            r#"
            INSERT INTO articles
            (url, title, content, source, published_date, scraped_date,
             relevance_score, areas_of_interest, summary, fingerprint, processed)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&article.url)
        .bind(&article.title)
        .bind(&article.content)
        .bind(&article.source)
        .bind(&article.published)
        .bind(article.scraped_at)
        .bind(article.relevance_score)
        .bind(&areas)
        .bind(&article.summary)
        .bind(&key)
        .bind(article.processed)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(db)) if db.message().contains("UNIQUE constraint failed") => {
                debug!("article already present (lost insert race): {}", article.url);
                Ok(false)
            }
            Err(e) => Err(e).context("failed to insert article"),
        }
    }

    /// Append one audit row for a (source, run) pair. Never updated.
    pub async fn log_run(
        &self,
        source: &str,
        articles_found: usize,
        articles_new: usize,
        status: &str,
        error_message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scraping_log
            (source, run_date, articles_found, articles_new, status, error_message)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(source)
        .bind(Utc::now())
        .bind(articles_found as i64)
        .bind(articles_new as i64)
        .bind(status)
        .bind(error_message)
        .execute(&self.pool)
        .await
        .context("failed to log scraping run")?;
        Ok(())
    }

    /// Articles at or above `min_relevance`, newest scrape first, ties broken
    /// by relevance, optionally restricted to one source.
    pub async fn relevant_articles(
        &self,
        limit: usize,
        min_relevance: f64,
        source: Option<&str>,
    ) -> Result<Vec<Article>> {
        let rows = if let Some(source) = source {
            sqlx::query(
                r#"
                SELECT url, title, content, source, published_date, scraped_date,
                       relevance_score, areas_of_interest, summary, processed
                FROM articles
                WHERE relevance_score >= ? AND source = ?
                ORDER BY scraped_date DESC, relevance_score DESC
                LIMIT ?
                "#,
            )
            .bind(min_relevance)
            .bind(source)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query(
                r#"
                SELECT url, title, content, source, published_date, scraped_date,
                       relevance_score, areas_of_interest, summary, processed
                FROM articles
                WHERE relevance_score >= ?
                ORDER BY scraped_date DESC, relevance_score DESC
                LIMIT ?
                "#,
            )
            .bind(min_relevance)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
        }
        .context("failed to query relevant articles")?;

        Ok(rows.iter().map(row_to_article).collect())
    }

    /// Aggregate statistics for the run summary display.
    pub async fn stats(&self) -> Result<StoreStats> {
        let total_articles: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await
            .context("failed to count articles")?;

        let relevant_articles: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE relevance_score >= 0.5")
                .fetch_one(&self.pool)
                .await
                .context("failed to count relevant articles")?;

        let by_source = sqlx::query(
            "SELECT source, COUNT(*) as count FROM articles GROUP BY source ORDER BY count DESC",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to count articles by source")?
        .iter()
        .map(|row| (row.get::<String, _>("source"), row.get::<i64, _>("count")))
        .collect();

        let recent_runs = sqlx::query(
            r#"
            SELECT source, run_date, articles_found, articles_new, status, error_message
            FROM scraping_log
            ORDER BY run_date DESC
            LIMIT 50
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch recent runs")?
        .iter()
        .map(|row| RunLogEntry {
            source: row.get("source"),
            run_date: row.get("run_date"),
            articles_found: row.get("articles_found"),
            articles_new: row.get("articles_new"),
            status: row.get("status"),
            error_message: row.get("error_message"),
        })
        .collect();

        Ok(StoreStats {
            total_articles,
            relevant_articles,
            by_source,
            recent_runs,
        })
    }
}

fn row_to_article(row: &sqlx::sqlite::SqliteRow) -> Article {
    let areas: Option<String> = row.get("areas_of_interest");
    Article {
        url: row.get("url"),
        title: row.get("title"),
        content: row.get::<Option<String>, _>("content").unwrap_or_default(),
        source: row.get("source"),
        published: row.get("published_date"),
        scraped_at: row.get("scraped_date"),
        relevance_score: row.get("relevance_score"),
        areas: areas
            .map(|s| s.split(',').map(str::to_string).collect())
            .unwrap_or_default(),
        summary: row.get("summary"),
        processed: row.get("processed"),
    }
}
