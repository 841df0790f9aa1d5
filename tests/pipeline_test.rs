use std::sync::Arc;
use std::time::SystemTime;

use newswatch::config::{ClassifierConfig, Config, DatabaseConfig, ScraperConfig, SourceConfig};
use newswatch::llm::remote::RemoteLlmProvider;
use newswatch::pipeline;
use newswatch::storage::{Article, ArticleStore};

const FEED_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Mock Channel</title>
    <link>https://example.com</link>
    <item>
      <title>First Story</title>
      <link>https://example.com/first</link>
      <description>Already known to the store.</description>
    </item>
    <item>
      <title>Second Story</title>
      <link>https://example.com/second</link>
      <description>A fresh report on a coordinated intrusion campaign.</description>
    </item>
  </channel>
</rss>"#;

fn oracle_body(analysis: &str) -> String {
    serde_json::json!({
        "model": "gpt-4o-mini",
        "choices": [{
            "message": {"role": "assistant", "content": analysis},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    })
    .to_string()
}

async fn setup_store(tag: &str) -> ArticleStore {
    let now = SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("time")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("newswatch_pipeline_{}_{}", tag, now));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    ArticleStore::open(&dir.join("newswatch.db").to_string_lossy())
        .await
        .expect("open store")
}

fn test_config(feed_url: String) -> Config {
    Config {
        database: DatabaseConfig {
            path: "unused".to_string(),
        },
        scraper: ScraperConfig {
            request_delay_ms: 0,
            batch_delay_ms: 0,
            ..Default::default()
        },
        classifier: ClassifierConfig {
            request_delay_ms: 0,
            ..Default::default()
        },
        interest_areas: vec!["cybersecurity".to_string(), "defense".to_string()],
        sources: vec![SourceConfig {
            name: "Mock Source".to_string(),
            url: feed_url,
            is_rss: true,
            selectors: None,
        }],
    }
}

#[tokio::test]
async fn feed_with_one_known_entry_yields_one_new_article() {
    let mut server = mockito::Server::new_async().await;

    let feed_mock = server
        .mock("GET", "/feed")
        .with_status(200)
        .with_header("content-type", "application/rss+xml")
        .with_body(FEED_XML)
        .expect_at_least(1)
        .create_async()
        .await;

    // The second (new) entry is the only one that should reach the oracle
    let oracle_mock = server
        .mock("POST", "/oracle")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(oracle_body(
            "RELEVANCE_SCORE: 0.9\nAREAS: cybersecurity\nSUMMARY: Coordinated intrusion campaign.",
        ))
        .expect(1)
        .create_async()
        .await;

    let store = setup_store("known_entry").await;

    // Seed the store with the first entry's URL
    let known = Article::new(
        "https://example.com/first".to_string(),
        "First Story".to_string(),
        "Already known to the store.".to_string(),
        "Mock Source".to_string(),
        None,
    );
    assert!(store.save(&known).await.unwrap());

    let config = test_config(format!("{}/feed", server.url()));
    let provider = Arc::new(RemoteLlmProvider::new(
        format!("{}/oracle", server.url()),
        "fake-key",
        "gpt-4o-mini",
    ));

    let summary = pipeline::run(&config, &store, provider.clone())
        .await
        .expect("pipeline run");

    assert_eq!(summary.scraped, 2);
    assert_eq!(summary.new, 1);
    assert_eq!(summary.saved, 1);
    assert_eq!(summary.relevant, 1);

    // Run log records pre-filter vs post-dedup counts
    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_articles, 2);
    let run = &stats.recent_runs[0];
    assert_eq!(run.source, "Mock Source");
    assert_eq!(run.articles_found, 2);
    assert_eq!(run.articles_new, 1);
    assert_eq!(run.status, "success");

    // The new article carries its classification
    let relevant = store.relevant_articles(10, 0.5, None).await.unwrap();
    assert_eq!(relevant.len(), 1);
    assert_eq!(relevant[0].url, "https://example.com/second");
    assert_eq!(relevant[0].areas, vec!["cybersecurity"]);

    // Second run over the unchanged source: nothing new, oracle untouched
    let summary2 = pipeline::run(&config, &store, provider)
        .await
        .expect("second pipeline run");
    assert_eq!(summary2.scraped, 2);
    assert_eq!(summary2.new, 0);
    assert_eq!(summary2.saved, 0);

    let stats2 = store.stats().await.unwrap();
    assert_eq!(stats2.total_articles, 2);

    feed_mock.assert_async().await;
    oracle_mock.assert_async().await;
}

#[tokio::test]
async fn dead_source_is_isolated_and_logged() {
    let mut server = mockito::Server::new_async().await;

    let feed_mock = server
        .mock("GET", "/feed")
        .with_status(200)
        .with_header("content-type", "application/rss+xml")
        .with_body(FEED_XML)
        .create_async()
        .await;

    let oracle_mock = server
        .mock("POST", "/oracle")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(oracle_body(
            "RELEVANCE_SCORE: 0.2\nAREAS: none\nSUMMARY: Not relevant.",
        ))
        .expect(2)
        .create_async()
        .await;

    let store = setup_store("dead_source").await;

    let mut config = test_config(format!("{}/feed", server.url()));
    // A source whose fetch will fail outright; it must not affect the other
    config.sources.push(SourceConfig {
        name: "Dead Source".to_string(),
        url: format!("{}/missing-feed", server.url()),
        is_rss: true,
        selectors: None,
    });

    let provider = Arc::new(RemoteLlmProvider::new(
        format!("{}/oracle", server.url()),
        "fake-key",
        "gpt-4o-mini",
    ));

    let summary = pipeline::run(&config, &store, provider)
        .await
        .expect("pipeline run");

    // Both feed entries are new this time; the dead source contributes zero
    assert_eq!(summary.scraped, 2);
    assert_eq!(summary.new, 2);
    assert_eq!(summary.saved, 2);
    assert_eq!(summary.relevant, 0);

    let stats = store.stats().await.unwrap();
    let dead = stats
        .recent_runs
        .iter()
        .find(|r| r.source == "Dead Source")
        .expect("run row for dead source");
    assert_eq!(dead.articles_found, 0);
    assert_eq!(dead.articles_new, 0);

    feed_mock.assert_async().await;
    oracle_mock.assert_async().await;
}
