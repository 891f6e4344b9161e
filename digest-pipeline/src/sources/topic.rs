use crate::config::{SourceConfig, TopicSpec};
use crate::sources::keywords::KeywordFilter;
use crate::sources::news_api::search_request;
use crate::sources::{dedupe_by_url, FetchOutcome, SourceFailure};
use crate::traits::{FeedReader, SearchApi};
use crate::types::{Item, Result};
use crate::utils::time::days_before;
use chrono::NaiveDate;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Fetches one topic's items using either its curated feeds or the generic
/// search-then-feeds strategy.
pub struct TopicFetcher {
    search: Arc<dyn SearchApi>,
    feeds: Arc<dyn FeedReader>,
    config: SourceConfig,
}

impl TopicFetcher {
    pub fn new(search: Arc<dyn SearchApi>, feeds: Arc<dyn FeedReader>, config: SourceConfig) -> Self {
        Self { search, feeds, config }
    }

    /// At most `cap` distinct items in fetch order. Only an invalid keyword
    /// set is an error; unavailable sources are reported in the outcome.
    pub async fn fetch_topic(&self, topic: &TopicSpec, cap: usize, today: NaiveDate) -> Result<FetchOutcome> {
        let keywords = topic.validated_keywords()?;
        let filter = KeywordFilter::new(keywords.as_slice())?;

        let mut collected = Collected::new(cap);

        if topic.curated_feeds.is_empty() {
            self.search_stage(topic, &keywords, &filter, today, &mut collected).await;
            if collected.remaining() > 0 {
                let generic: Vec<String> = self
                    .config
                    .generic_feeds
                    .iter()
                    .take(self.config.generic_feed_count)
                    .cloned()
                    .collect();
                let items = self.read_feeds(&generic, &mut collected.failures).await;
                collected.extend(filter.retain(items));
            }
        } else {
            // Curated feeds are the filter; their entries are never keyword-checked.
            let items = self.read_feeds(&topic.curated_feeds, &mut collected.failures).await;
            collected.extend(items);
            if collected.remaining() > 0 {
                self.search_stage(topic, &keywords, &filter, today, &mut collected).await;
            }
        }

        info!("Topic '{}': {} items ({} source failures)", topic.name, collected.items.len(), collected.failures.len());
        Ok(FetchOutcome {
            items: collected.items,
            failures: collected.failures,
        })
    }

    async fn search_stage(
        &self,
        topic: &TopicSpec,
        keywords: &[String],
        filter: &KeywordFilter,
        today: NaiveDate,
        collected: &mut Collected,
    ) {
        if !self.search.is_enabled() {
            debug!("Search API disabled, skipping search for '{}'", topic.name);
            return;
        }

        let wanted = collected.remaining();
        let from = days_before(today, self.config.days_back);
        let request = search_request(keywords, topic.exclude_keywords.as_slice(), wanted, from);

        match self.search.search(&request).await {
            Ok(items) => collected.extend(filter.retain(items)),
            Err(e) => {
                warn!("Search failed for topic '{}': {}", topic.name, e);
                collected.failures.push(SourceFailure {
                    source: format!("search:{}", topic.name),
                    message: e.to_string(),
                });
            }
        }
    }

    /// Reads every feed concurrently and concatenates results in feed order.
    async fn read_feeds(&self, feed_urls: &[String], failures: &mut Vec<SourceFailure>) -> Vec<Item> {
        let limit = self.config.entries_per_feed;
        let results = join_all(feed_urls.iter().map(|url| self.feeds.read_feed(url, limit))).await;

        let mut items = Vec::new();
        for (url, result) in feed_urls.iter().zip(results) {
            match result {
                Ok(feed_items) => items.extend(feed_items),
                Err(e) => {
                    warn!("Failed to read feed {}: {}", url, e);
                    failures.push(SourceFailure {
                        source: url.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }
        items
    }
}

/// Running, deduplicated, capped result of a topic fetch.
struct Collected {
    cap: usize,
    items: Vec<Item>,
    seen: HashSet<String>,
    failures: Vec<SourceFailure>,
}

impl Collected {
    fn new(cap: usize) -> Self {
        Self {
            cap,
            items: Vec::new(),
            seen: HashSet::new(),
            failures: Vec::new(),
        }
    }

    fn remaining(&self) -> usize {
        self.cap.saturating_sub(self.items.len())
    }

    fn extend(&mut self, items: Vec<Item>) {
        for item in dedupe_by_url(items) {
            if self.remaining() == 0 {
                break;
            }
            if self.seen.insert(item.url.clone()) {
                self.items.push(item);
            }
        }
    }
}
