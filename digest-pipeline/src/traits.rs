use crate::config::WatchedCompany;
use crate::types::{Item, Result};
use async_trait::async_trait;
use chrono::NaiveDate;

/// A keyword search against a news index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub from: NaiveDate,
    pub page_size: usize,
}

/// Search API returning already-normalized items.
#[async_trait]
pub trait SearchApi: Send + Sync {
    /// False when the API has no credentials; callers then treat it as returning nothing.
    fn is_enabled(&self) -> bool;

    async fn search(&self, request: &SearchRequest) -> Result<Vec<Item>>;
}

/// Reads at most `limit` entries from one syndication feed.
#[async_trait]
pub trait FeedReader: Send + Sync {
    async fn read_feed(&self, feed_url: &str, limit: usize) -> Result<Vec<Item>>;
}

/// One row of a company's filing index, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilingRecord {
    pub form: String,
    pub filing_date: String,
    pub accession_number: String,
    pub primary_document: String,
    pub items: String,
}

#[async_trait]
pub trait FilingIndex: Send + Sync {
    async fn recent_filings(&self, company: &WatchedCompany) -> Result<Vec<FilingRecord>>;
}

/// Retrieves a raw HTML page for body extraction.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<String>;
}
