/*!
Selector-driven extraction of article data from raw HTML.

Every lookup is best-effort: a source-specific selector hint is tried first,
then an ordered list of generic fallbacks. A candidate only wins once its
text clears a minimum length, which guards against picking up teasers or
navigation fragments on pages with several matching elements.
*/

use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::debug;
use url::Url;

use crate::config::SelectorHints;

/// Tags whose subtrees never contain article text.
const EXCLUDED_TAGS: [&str; 6] = ["script", "style", "nav", "footer", "header", "aside"];

const TITLE_FALLBACKS: [&str; 5] = ["h1", ".article-title", ".post-title", ".headline", "title"];
const CONTENT_FALLBACKS: [&str; 6] = [
    "article",
    "main",
    ".content",
    ".article-content",
    ".post-content",
    ".entry-content",
];
const DATE_FALLBACKS: [&str; 5] = ["time", ".date", ".published-date", ".article-date", "[datetime]"];

/// Minimum character count for a title to be considered meaningful.
const MIN_TITLE_LEN: usize = 5;
/// Minimum character count for content to be considered substantive.
const MIN_CONTENT_LEN: usize = 100;

/// Best-effort extraction result. `content` is empty when no substantive
/// candidate was found; callers treat that as "no article here".
#[derive(Debug, Clone)]
pub struct Extracted {
    pub title: String,
    pub content: String,
    pub date: Option<String>,
}

/// Extract title, main content and publication date from an article page.
pub fn extract_article(html: &str, hints: Option<&SelectorHints>) -> Extracted {
    let doc = Html::parse_document(html);

    let title = select_title(&doc, hints);
    let content = select_content(&doc, hints);
    let date = select_date(&doc, hints);

    Extracted {
        title: title.unwrap_or_else(|| "No title found".to_string()),
        content: content.unwrap_or_default(),
        date,
    }
}

fn select_title(doc: &Html, hints: Option<&SelectorHints>) -> Option<String> {
    let hint = hints.and_then(|h| h.title.as_deref());
    for sel in hint.into_iter().chain(TITLE_FALLBACKS) {
        let Ok(selector) = Selector::parse(sel) else {
            debug!("skipping unparseable title selector: {}", sel);
            continue;
        };
        if let Some(element) = doc.select(&selector).next() {
            let text = collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "));
            if text.chars().count() > MIN_TITLE_LEN {
                return Some(text);
            }
        }
    }
    None
}

fn select_content(doc: &Html, hints: Option<&SelectorHints>) -> Option<String> {
    let hint = hints.and_then(|h| h.content.as_deref());
    for sel in hint.into_iter().chain(CONTENT_FALLBACKS) {
        let Ok(selector) = Selector::parse(sel) else {
            debug!("skipping unparseable content selector: {}", sel);
            continue;
        };
        if let Some(element) = doc.select(&selector).next() {
            let text = element_text(element);
            if text.chars().count() > MIN_CONTENT_LEN {
                return Some(text);
            }
        }
    }
    None
}

fn select_date(doc: &Html, hints: Option<&SelectorHints>) -> Option<String> {
    let hint = hints.and_then(|h| h.date.as_deref());
    for sel in hint.into_iter().chain(DATE_FALLBACKS) {
        let Ok(selector) = Selector::parse(sel) else {
            debug!("skipping unparseable date selector: {}", sel);
            continue;
        };
        if let Some(element) = doc.select(&selector).next() {
            // Prefer a machine-readable datetime attribute over visible text
            let date = element
                .value()
                .attr("datetime")
                .map(str::to_string)
                .unwrap_or_else(|| collapse_whitespace(&element.text().collect::<Vec<_>>().join(" ")));
            if !date.is_empty() {
                return Some(date);
            }
        }
    }
    None
}

/// Extract same-domain article links from a homepage, resolving relative
/// URLs against `base_url`. Cross-domain links are discarded so outbound
/// references are never treated as source content. Order-preserving dedup,
/// capped at `max_links`.
pub fn extract_article_links(
    html: &str,
    base_url: &Url,
    hints: Option<&SelectorHints>,
    max_links: usize,
) -> Vec<String> {
    let doc = Html::parse_document(html);
    let link_selector = hints
        .and_then(|h| h.article_links.as_deref())
        .unwrap_or("a");
    let Ok(selector) = Selector::parse(link_selector) else {
        debug!("unparseable link selector: {}", link_selector);
        return Vec::new();
    };

    let base_host = base_url.host_str().unwrap_or_default();
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in doc.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(resolved) = base_url.join(href) else {
            continue;
        };
        if resolved.host_str() != Some(base_host) {
            continue;
        }
        let url = resolved.to_string();
        if seen.insert(url.clone()) {
            links.push(url);
            if links.len() >= max_links {
                break;
            }
        }
    }

    links
}

/// Collect the text of `element`, skipping excluded subtrees entirely.
/// Text segments are trimmed and joined with newlines so paragraph breaks
/// survive into the plain-text form.
pub fn element_text(element: ElementRef<'_>) -> String {
    let mut parts: Vec<String> = Vec::new();
    // Depth-first walk; children pushed in reverse keeps document order.
    let mut stack = vec![*element];
    while let Some(node) = stack.pop() {
        if let Some(el) = node.value().as_element() {
            if EXCLUDED_TAGS.contains(&el.name()) {
                continue;
            }
        }
        if let Some(text) = node.value().as_text() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                parts.push(trimmed.to_string());
            }
        }
        let children: Vec<_> = node.children().collect();
        for child in children.into_iter().rev() {
            stack.push(child);
        }
    }
    parts.join("\n")
}

/// Strip embedded HTML markup down to plain text with newline separators.
/// Used for feed content fields that carry HTML bodies.
pub fn strip_html(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    element_text(fragment.root_element())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
