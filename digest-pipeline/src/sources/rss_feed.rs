use crate::fetcher::HttpFetcher;
use crate::parser::FeedParser;
use crate::traits::FeedReader;
use crate::types::{Item, Result};
use crate::utils::url::domain_label;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Fetches and parses syndication feeds over HTTP.
pub struct RssFeedReader {
    fetcher: Arc<HttpFetcher>,
}

impl RssFeedReader {
    pub fn new(fetcher: Arc<HttpFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl FeedReader for RssFeedReader {
    async fn read_feed(&self, feed_url: &str, limit: usize) -> Result<Vec<Item>> {
        let content = self.fetcher.get_text(feed_url).await?;

        let mut parser = FeedParser::new();
        let parsed = parser.parse_feed(&content, limit, &domain_label(feed_url))?;

        info!("Pulled {} items from feed {}", parsed.items.len(), feed_url);
        Ok(parsed.items)
    }
}
