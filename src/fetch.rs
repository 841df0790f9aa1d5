use anyhow::Context;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Failure modes of a single HTTP retrieval. No retries happen at this layer;
/// a failed fetch yields zero articles for the unit of work that needed it.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("unexpected status: {0}")]
    Status(StatusCode),
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
}

/// Timeout-bounded HTTP retrieval with a fixed user agent, shared by the feed
/// and HTML scraping paths.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(timeout_secs: u64, user_agent: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self { client })
    }

    /// Fetch the body of `url` as text. Non-2xx statuses and network errors
    /// are logged and returned as typed failures, never panics.
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                let err = if e.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Transport(e)
                };
                warn!("fetch failed for {}: {}", url, err);
                return Err(err);
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!("fetch failed for {}: status {}", url, status);
            return Err(FetchError::Status(status));
        }

        response.text().await.map_err(|e| {
            let err = if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Transport(e)
            };
            warn!("failed to read body from {}: {}", url, err);
            err
        })
    }
}
