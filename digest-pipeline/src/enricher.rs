use crate::config::EnrichConfig;
use crate::traits::PageFetcher;
use crate::types::{DigestError, Item, Result};
use crate::utils::text::{strip_html, truncate_chars};
use crate::utils::url::is_on_domain;
use futures::future::join_all;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// Paragraphs shorter than this are navigation crumbs, captions or bylines.
const MIN_PARAGRAPH_CHARS: usize = 40;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichReport {
    pub total: usize,
    pub skipped: usize,
    pub enriched: usize,
}

/// Fills in `body_text` for a run's items with bounded concurrency.
pub struct ContentEnricher {
    pages: Arc<dyn PageFetcher>,
    config: EnrichConfig,
    permits: Arc<Semaphore>,
}

impl ContentEnricher {
    pub fn new(pages: Arc<dyn PageFetcher>, config: EnrichConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.concurrency.max(1)));
        Self { pages, config, permits }
    }

    /// Enriches every item in place. One semaphore spans the whole batch,
    /// so the ceiling holds no matter how many topics contributed items.
    pub async fn enrich(&self, items: Vec<&mut Item>) -> EnrichReport {
        let total = items.len();
        let outcomes = join_all(items.into_iter().map(|item| self.enrich_one(item))).await;

        let report = EnrichReport {
            total,
            skipped: outcomes.iter().filter(|o| matches!(o, Outcome::Skipped)).count(),
            enriched: outcomes.iter().filter(|o| matches!(o, Outcome::Enriched)).count(),
        };
        info!("Enriched {}/{} items ({} skipped)", report.enriched, report.total, report.skipped);
        report
    }

    fn should_skip(&self, item: &Item) -> bool {
        item.url.trim().is_empty()
            || self
                .config
                .skip_domains
                .iter()
                .any(|domain| is_on_domain(&item.url, domain))
    }

    async fn enrich_one(&self, item: &mut Item) -> Outcome {
        if self.should_skip(item) {
            return Outcome::Skipped;
        }

        match self.fetch_body(&item.url).await {
            Ok(body) => {
                item.body_text = Some(body);
                Outcome::Enriched
            }
            Err(e) => {
                debug!("Enrichment failed for {}: {}", item.url, e);
                Outcome::Failed
            }
        }
    }

    async fn fetch_body(&self, url: &str) -> Result<String> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| DigestError::General(e.to_string()))?;

        let timeout = Duration::from_secs(self.config.timeout_seconds);
        let html = tokio::time::timeout(timeout, self.pages.fetch_page(url))
            .await
            .map_err(|_| DigestError::General(format!("timed out after {:?}", timeout)))??;

        extract_article_text(&html, self.config.max_body_chars)
            .ok_or_else(|| DigestError::Parse("no article text found".to_string()))
    }
}

enum Outcome {
    Skipped,
    Enriched,
    Failed,
}

fn boilerplate_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        ["script", "style", "noscript", "nav", "header", "footer"]
            .iter()
            .map(|tag| Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")).expect("static block pattern"))
            .collect()
    })
}

fn paragraph_pattern() -> &'static Regex {
    static PARAGRAPH: OnceLock<Regex> = OnceLock::new();
    PARAGRAPH.get_or_init(|| Regex::new(r"(?is)<p\b[^>]*>(.*?)</p\s*>").expect("static paragraph pattern"))
}

/// Readable body text of an article page, or `None` when nothing meaningful remains.
pub fn extract_article_text(html: &str, max_chars: usize) -> Option<String> {
    let mut cleaned = html.to_string();
    for pattern in boilerplate_patterns() {
        cleaned = pattern.replace_all(&cleaned, " ").into_owned();
    }

    let paragraphs: Vec<String> = paragraph_pattern()
        .captures_iter(&cleaned)
        .filter_map(|caps| caps.get(1))
        .map(|m| strip_html(m.as_str()))
        .filter(|p| p.chars().count() >= MIN_PARAGRAPH_CHARS)
        .collect();

    if paragraphs.is_empty() {
        return None;
    }

    let text = paragraphs.join("\n\n");
    Some(truncate_chars(&text, max_chars).trim_end().to_string())
}
