/*!
Relevance classification of articles against a fixed interest-area vocabulary.

The classifier owns prompt construction and response parsing; the model behind
the `LlmProvider` trait is treated as an opaque text-in/text-out capability.
Parsing is deliberately lenient: free-text generation is unreliable, so each
expected line is recovered independently and a full-text score scan backs up
the labeled line. Any provider failure degrades to a zero-confidence,
non-relevant result so one bad call never aborts a batch.
*/

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::config::ClassifierConfig;
use crate::llm::{LlmProvider, LlmRequest};
use crate::storage::Article;

/// Matches a decimal in [0, 1] written as 0.x or 1.0
static SCORE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(0\.\d+|1\.0)\b").expect("score regex is valid"));

/// Structured classification result for one article.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Always equals `score >= threshold`; never asserted by the model itself
    pub relevant: bool,
    pub score: f64,
    /// Matched entries from the interest-area vocabulary, deduplicated
    pub areas: Vec<String>,
    pub summary: String,
}

pub struct RelevanceClassifier {
    provider: Arc<dyn LlmProvider>,
    interest_areas: Vec<String>,
    threshold: f64,
    max_content_length: usize,
    max_tokens: usize,
    timeout_seconds: u64,
    request_delay: Duration,
}

impl RelevanceClassifier {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        config: &ClassifierConfig,
        interest_areas: Vec<String>,
    ) -> Self {
        Self {
            provider,
            interest_areas,
            threshold: config.relevance_threshold,
            max_content_length: config.max_content_length,
            max_tokens: config.max_tokens,
            timeout_seconds: config.timeout_seconds,
            request_delay: Duration::from_millis(config.request_delay_ms),
        }
    }

    /// System instructions: the vocabulary plus the exact three-line response
    /// format the parser expects.
    fn instructions(&self) -> String {
        let areas_list = self
            .interest_areas
            .iter()
            .map(|area| format!("- {}", area))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "You are a news article analyzer. Your task is to:\n\
             1. Analyze news articles for relevance to specific areas of interest\n\
             2. Determine if an article is relevant to any of these areas:\n\n\
             {}\n\n\
             3. Assign a relevance score from 0.0 to 1.0 where:\n\
             - 1.0 = Highly relevant, directly discusses one or more areas\n\
             - 0.7-0.9 = Moderately relevant, significant implications\n\
             - 0.5-0.6 = Somewhat relevant, tangential connection\n\
             - 0.0-0.4 = Not relevant\n\n\
             4. Identify which specific areas of interest the article relates to\n\n\
             Always provide your analysis in this exact format:\n\
             RELEVANCE_SCORE: [0.0-1.0]\n\
             AREAS: [comma-separated list of areas or \"none\"]\n\
             SUMMARY: [brief 1-2 sentence explanation of relevance]",
            areas_list
        )
    }

    /// Build the per-article prompt. Content is truncated to the configured
    /// character budget, keeping the leading portion: relevance signal is
    /// front-loaded in news writing.
    fn build_prompt(&self, title: &str, content: &str, url: &str) -> String {
        let truncated: String = content.chars().take(self.max_content_length).collect();
        format!(
            "Analyze this news article for relevance to the areas of interest:\n\n\
             Title: {}\n\
             URL: {}\n\
             Content: {}\n\n\
             Please provide your analysis in the required format:\n\
             RELEVANCE_SCORE: [0.0-1.0]\n\
             AREAS: [comma-separated list or \"none\"]\n\
             SUMMARY: [brief explanation]",
            title, url, truncated
        )
    }

    /// Parse the model's free-text analysis. Pure function: each labeled line
    /// is recovered independently, a missing score line falls back to a
    /// full-text scan, claimed areas are reconciled against the vocabulary
    /// with case-insensitive bidirectional containment, and a missing summary
    /// falls back to the leading 200 characters of the raw response.
    pub fn parse_analysis(&self, raw: &str) -> Classification {
        let mut score = 0.0f64;
        let mut areas: Vec<String> = Vec::new();
        let mut summary = String::new();

        for line in raw.lines() {
            let line = line.trim();
            if let Some(rest) = line.strip_prefix("RELEVANCE_SCORE:") {
                if let Some(m) = SCORE_RE.find(rest) {
                    score = m.as_str().parse().unwrap_or(0.0);
                }
            } else if let Some(rest) = line.strip_prefix("AREAS:") {
                areas = self.reconcile_areas(rest);
            } else if let Some(rest) = line.strip_prefix("SUMMARY:") {
                summary = rest.trim().to_string();
            }
        }

        // Labeled line missing or unparseable: scan the whole response for
        // any decimal in range before giving up and defaulting to 0.0
        if score == 0.0 {
            if let Some(m) = SCORE_RE.find(raw) {
                score = m.as_str().parse().unwrap_or(0.0);
            }
        }

        if summary.is_empty() {
            summary = if raw.is_empty() {
                "No summary available".to_string()
            } else {
                raw.chars().take(200).collect()
            };
        }

        Classification {
            relevant: score >= self.threshold,
            score,
            areas,
            summary,
        }
    }

    /// Validate claimed areas against the vocabulary: a claim is accepted if
    /// it contains, or is contained by, a known entry (case-insensitively).
    /// Known heuristic; accepted matches always use the vocabulary spelling.
    fn reconcile_areas(&self, claimed: &str) -> Vec<String> {
        let claimed = claimed.trim().to_lowercase();
        if claimed.is_empty() || claimed == "none" {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let mut matched = Vec::new();
        for claim in claimed.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            for interest in &self.interest_areas {
                let known = interest.to_lowercase();
                if known.contains(claim) || claim.contains(&known) {
                    if seen.insert(interest.clone()) {
                        matched.push(interest.clone());
                    }
                    break;
                }
            }
        }
        matched
    }

    /// Classify one article. Provider failures are absorbed into a
    /// zero-confidence result carrying the error text as the summary.
    pub async fn classify(&self, title: &str, content: &str, url: &str) -> Classification {
        let request = LlmRequest {
            system: Some(self.instructions()),
            prompt: self.build_prompt(title, content, url),
            max_tokens: Some(self.max_tokens),
            temperature: Some(0.3),
            timeout_seconds: Some(self.timeout_seconds),
        };

        match self.provider.generate(request).await {
            Ok(response) => self.parse_analysis(&response.content),
            Err(e) => {
                error!("error analyzing article {}: {:#}", url, e);
                Classification {
                    relevant: false,
                    score: 0.0,
                    areas: Vec::new(),
                    summary: format!("Analysis error: {}", e),
                }
            }
        }
    }

    /// Classify a batch sequentially with a fixed inter-call delay. The
    /// sequencing is backpressure against a rate-limited API, not a
    /// limitation of the classifier. Classification fields are written into
    /// the articles in place.
    pub async fn classify_batch(&self, articles: &mut [Article]) {
        let total = articles.len();
        for (i, article) in articles.iter_mut().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.request_delay).await;
            }

            let result = self
                .classify(&article.title, &article.content, &article.url)
                .await;
            article.relevance_score = Some(result.score);
            article.areas = result.areas;
            article.summary = Some(result.summary);

            if (i + 1) % 10 == 0 {
                info!("analyzed {}/{} articles", i + 1, total);
            }
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmResponse;
    use anyhow::Result;

    struct StaticProvider;

    #[async_trait::async_trait]
    impl LlmProvider for StaticProvider {
        async fn generate(&self, _request: LlmRequest) -> Result<LlmResponse> {
            unreachable!("parse tests never call the provider")
        }
    }

    fn classifier_with_areas(areas: &[&str]) -> RelevanceClassifier {
        RelevanceClassifier::new(
            Arc::new(StaticProvider),
            &ClassifierConfig::default(),
            areas.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn parses_well_formed_response() {
        let classifier = classifier_with_areas(&["cybersecurity", "disinformation"]);
        let raw = "RELEVANCE_SCORE: 0.85\n\
                   AREAS: cybersecurity, disinformation\n\
                   SUMMARY: Discusses a coordinated intrusion and influence campaign.";
        let result = classifier.parse_analysis(raw);
        assert!(result.relevant);
        assert_eq!(result.score, 0.85);
        assert_eq!(result.areas, vec!["cybersecurity", "disinformation"]);
        assert!(result.summary.starts_with("Discusses"));
    }

    #[test]
    fn recovers_score_from_noisy_line() {
        let classifier = classifier_with_areas(&["cybersecurity"]);
        let raw = "RELEVANCE_SCORE: I'd estimate around 0.7 given the subject\n\
                   AREAS: none\n\
                   SUMMARY: Tangential.";
        let result = classifier.parse_analysis(raw);
        assert_eq!(result.score, 0.7);
        assert!(result.areas.is_empty());
    }

    #[test]
    fn full_text_fallback_when_label_missing() {
        let classifier = classifier_with_areas(&["cybersecurity"]);
        let raw = "The article scores roughly 0.6 on relevance overall.";
        let result = classifier.parse_analysis(raw);
        assert_eq!(result.score, 0.6);
        // No SUMMARY line: the leading raw text stands in
        assert!(result.summary.starts_with("The article scores"));
    }

    #[test]
    fn unparseable_response_defaults_to_zero() {
        let classifier = classifier_with_areas(&["cybersecurity"]);
        let result = classifier.parse_analysis("no numbers here at all");
        assert!(!result.relevant);
        assert_eq!(result.score, 0.0);
        assert!(result.areas.is_empty());
        assert_eq!(result.summary, "no numbers here at all");
    }

    #[test]
    fn empty_response_gets_placeholder_summary() {
        let classifier = classifier_with_areas(&["cybersecurity"]);
        let result = classifier.parse_analysis("");
        assert_eq!(result.summary, "No summary available");
    }

    #[test]
    fn threshold_purity_holds_at_boundary() {
        let classifier = classifier_with_areas(&["cybersecurity"]);
        let at = classifier.parse_analysis("RELEVANCE_SCORE: 0.5\nAREAS: none\nSUMMARY: x y z.");
        assert!(at.relevant);
        assert_eq!(at.relevant, at.score >= classifier.threshold());

        let below = classifier.parse_analysis("RELEVANCE_SCORE: 0.49\nAREAS: none\nSUMMARY: x.");
        assert!(!below.relevant);
        assert_eq!(below.relevant, below.score >= classifier.threshold());
    }

    #[test]
    fn areas_match_bidirectionally_and_dedupe() {
        let classifier = classifier_with_areas(&["threat intelligence", "defense"]);
        // "intelligence" is contained by "threat intelligence";
        // "national defense policy" contains "defense"
        let raw = "RELEVANCE_SCORE: 0.9\n\
                   AREAS: intelligence, national defense policy, Defense\n\
                   SUMMARY: s.";
        let result = classifier.parse_analysis(raw);
        assert_eq!(result.areas, vec!["threat intelligence", "defense"]);
    }

    #[test]
    fn unknown_areas_are_rejected() {
        let classifier = classifier_with_areas(&["cybersecurity"]);
        let raw = "RELEVANCE_SCORE: 0.8\nAREAS: gardening, cooking\nSUMMARY: s.";
        let result = classifier.parse_analysis(raw);
        assert!(result.areas.is_empty());
    }

    #[test]
    fn prompt_truncates_content_on_char_boundary() {
        let provider = Arc::new(StaticProvider);
        let config = ClassifierConfig {
            max_content_length: 10,
            ..Default::default()
        };
        let classifier = RelevanceClassifier::new(provider, &config, vec![]);
        // Multibyte characters must not split
        let content = "éééééééééééééééééééé";
        let prompt = classifier.build_prompt("t", content, "u");
        assert!(prompt.contains(&"é".repeat(10)));
        assert!(!prompt.contains(&"é".repeat(11)));
    }

    #[test]
    fn instructions_embed_vocabulary_and_format() {
        let classifier = classifier_with_areas(&["cybersecurity", "hybrid threats"]);
        let instructions = classifier.instructions();
        assert!(instructions.contains("- cybersecurity"));
        assert!(instructions.contains("- hybrid threats"));
        assert!(instructions.contains("RELEVANCE_SCORE:"));
        assert!(instructions.contains("AREAS:"));
        assert!(instructions.contains("SUMMARY:"));
    }
}
