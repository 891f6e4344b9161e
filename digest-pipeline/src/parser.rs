use crate::types::{DigestError, Item, OriginKind, Result};
use crate::utils::text::strip_html;
use chrono::Utc;
use feed_rs::parser;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub items: Vec<Item>,
}

/// Turns RSS/Atom documents into feed-entry items.
pub struct FeedParser {
    seen_urls: HashSet<String>,
}

impl FeedParser {
    pub fn new() -> Self {
        Self {
            seen_urls: HashSet::new(),
        }
    }

    /// Parses at most `limit` entries. `fallback_source` names the items when the feed has no title.
    pub fn parse_feed(&mut self, content: &str, limit: usize, fallback_source: &str) -> Result<ParsedFeed> {
        debug!("Parsing feed content ({} bytes)", content.len());

        let feed = parser::parse(content.as_bytes())
            .map_err(|e| DigestError::Parse(format!("Failed to parse feed: {}", e)))?;

        let title = feed
            .title
            .map(|t| strip_html(&t.content))
            .filter(|t| !t.is_empty());
        let source_name = title.clone().unwrap_or_else(|| fallback_source.to_string());

        // The limit applies to raw entries, matching what a reader of the feed would see.
        let items = feed
            .entries
            .into_iter()
            .take(limit)
            .filter_map(|entry| self.parse_entry(entry, &source_name))
            .collect::<Vec<_>>();

        debug!("Parsed feed '{}' with {} entries", source_name, items.len());
        Ok(ParsedFeed { title, items })
    }

    fn parse_entry(&mut self, entry: feed_rs::model::Entry, source_name: &str) -> Option<Item> {
        let url = entry.links.first()?.href.trim().to_string();
        if url.is_empty() {
            return None;
        }

        if !self.seen_urls.insert(url.clone()) {
            debug!("Skipping duplicate entry with URL: {}", url);
            return None;
        }

        let title = entry
            .title
            .map(|t| strip_html(&t.content))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Untitled".to_string());
        let description = entry.summary.map(|s| strip_html(&s.content));
        let published_at = entry
            .published
            .or(entry.updated)
            .map(|dt| dt.with_timezone(&Utc));

        Some(
            Item::new(url, title, source_name, OriginKind::FeedEntry)
                .with_description(description)
                .with_published_at(published_at),
        )
    }
}

impl Default for FeedParser {
    fn default() -> Self {
        Self::new()
    }
}
