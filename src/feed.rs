use chrono::{DateTime, Utc};
use feed_rs::parser;
use tracing::warn;

use crate::extract::strip_html;

/// A normalized syndication entry, independent of RSS/Atom flavor.
#[derive(Debug, Clone)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    /// Plain text; any embedded HTML has been stripped with line breaks kept.
    pub content: String,
    pub published: Option<DateTime<Utc>>,
}

/// Parse a feed document into normalized entries, capped at `max_entries`.
///
/// Content fields are taken in priority order: full content body, then
/// summary (feed-rs folds RSS `description` into the summary field). A
/// malformed document yields an empty list and a warning rather than an
/// error; one bad feed must not abort a run.
pub fn parse_entries(feed_text: &str, max_entries: usize) -> Vec<FeedEntry> {
    let feed = match parser::parse(feed_text.as_bytes()) {
        Ok(feed) => feed,
        Err(e) => {
            warn!("failed to parse feed document: {}", e);
            return Vec::new();
        }
    };

    feed.entries
        .iter()
        .take(max_entries)
        .map(|entry| {
            let title = entry
                .title
                .as_ref()
                .map(|t| t.content.clone())
                .unwrap_or_else(|| "No title".to_string());
            let link = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .unwrap_or_default();

            let raw_content = entry
                .content
                .as_ref()
                .and_then(|c| c.body.clone())
                .or_else(|| entry.summary.as_ref().map(|s| s.content.clone()))
                .unwrap_or_default();
            let content = if raw_content.is_empty() {
                raw_content
            } else {
                strip_html(&raw_content)
            };

            FeedEntry {
                title,
                link,
                content,
                published: entry.published,
            }
        })
        .collect()
}
