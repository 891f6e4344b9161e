// Test doubles for the pipeline's collaborators. Each scenario test binary
// uses a different subset, so unused items are expected.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use digest_pipeline::config::{DigestConfig, TopicSpec, WatchedCompany};
use digest_pipeline::traits::{FeedReader, FilingIndex, FilingRecord, PageFetcher, SearchApi, SearchRequest};
use digest_pipeline::types::{
    ArticleHistory, DaySynthesis, DigestEnvelope, DigestError, DigestRecord, HistoryEntry, Item, ModelIdentity,
    OriginKind, Result,
};
use interfaces::defs::{CompletionModel, DeliveryChannel, DigestRecorder, HistoryStore};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, Once};

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .try_init()
            .ok();
    });
}

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 20).unwrap()
}

pub fn article(prefix: &str, n: usize) -> Item {
    Item::new(
        format!("https://{}.example/{}", prefix, n),
        format!("{} story {}", prefix, n),
        format!("{} wire", prefix),
        OriginKind::FeedEntry,
    )
    .with_description(Some(format!("What happened in {} story {}", prefix, n)))
}

pub fn articles(prefix: &str, count: usize) -> Vec<Item> {
    (1..=count).map(|n| article(prefix, n)).collect()
}

/// Config with filings off and no network defaults in play.
pub fn test_config(topics: Vec<TopicSpec>) -> DigestConfig {
    let mut config = DigestConfig::default();
    config.topics = topics;
    config.filings.enabled = false;
    config.sources.generic_feeds = Vec::new();
    config
}

pub fn feed_topic(name: &str, feed_url: &str) -> TopicSpec {
    TopicSpec::new(name, &["news"]).with_curated_feeds(&[feed_url])
}

/// Completion model that writes one cited sentence per listed source.
#[derive(Default)]
pub struct ScriptedModel {
    failing_topics: HashSet<String>,
    fail_overview: bool,
    fail_everything: bool,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_topic(mut self, topic: &str) -> Self {
        self.failing_topics.insert(topic.to_string());
        self
    }

    pub fn failing_overview(mut self) -> Self {
        self.fail_overview = true;
        self
    }

    pub fn failing_everything(mut self) -> Self {
        self.fail_everything = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

fn synthesis_topic(prompt: &str) -> Option<&str> {
    let start = prompt.find("sources for the \"")? + "sources for the \"".len();
    let end = prompt[start..].find('"')?;
    Some(&prompt[start..start + end])
}

fn listed_sources(prompt: &str) -> usize {
    prompt
        .lines()
        .filter(|line| {
            line.strip_prefix('[')
                .and_then(|rest| rest.split_once("] "))
                .is_some_and(|(n, _)| n.parse::<usize>().is_ok())
        })
        .count()
}

#[async_trait]
impl CompletionModel for ScriptedModel {
    fn identify(&self) -> ModelIdentity {
        ModelIdentity::new("Scripted", "test-model")
    }

    async fn complete_text(&self, _system: &str, prompt: &str, _max_tokens: u32) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());

        if self.fail_everything {
            anyhow::bail!("model unavailable");
        }
        if prompt.contains("overview paragraph") {
            if self.fail_overview {
                anyhow::bail!("overview refused");
            }
            return Ok("A busy day across the board.".to_string());
        }
        if let Some(topic) = synthesis_topic(prompt) {
            if self.failing_topics.contains(topic) {
                anyhow::bail!("synthesis refused for {}", topic);
            }
            let sentences: Vec<String> = (1..=listed_sources(prompt))
                .map(|n| format!("Development {0} [{0}].", n))
                .collect();
            return Ok(sentences.join(" "));
        }
        Ok("A short summary.".to_string())
    }
}

/// Search API returning a fixed result list, truncated to the requested page size.
pub struct StaticSearchApi {
    enabled: bool,
    results: Vec<Item>,
    fail: bool,
    requests: Mutex<Vec<SearchRequest>>,
}

impl StaticSearchApi {
    pub fn new(results: Vec<Item>) -> Self {
        Self {
            enabled: true,
            results,
            fail: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(Vec::new())
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn requests(&self) -> Vec<SearchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchApi for StaticSearchApi {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<Item>> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(DigestError::General("search index down".to_string()));
        }
        Ok(self.results.iter().take(request.page_size).cloned().collect())
    }
}

/// Feed reader serving canned entries per feed url. Unknown feeds are empty.
#[derive(Default)]
pub struct StaticFeedReader {
    feeds: HashMap<String, Vec<Item>>,
    failing: HashSet<String>,
}

impl StaticFeedReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feed(mut self, url: &str, items: Vec<Item>) -> Self {
        self.feeds.insert(url.to_string(), items);
        self
    }

    pub fn with_failing_feed(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }
}

#[async_trait]
impl FeedReader for StaticFeedReader {
    async fn read_feed(&self, feed_url: &str, limit: usize) -> Result<Vec<Item>> {
        if self.failing.contains(feed_url) {
            return Err(DigestError::Parse(format!("{} is not a feed", feed_url)));
        }
        Ok(self
            .feeds
            .get(feed_url)
            .map(|items| items.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct StaticFilingIndex {
    filings: HashMap<String, Vec<FilingRecord>>,
}

impl StaticFilingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filings(mut self, ticker: &str, records: Vec<FilingRecord>) -> Self {
        self.filings.insert(ticker.to_string(), records);
        self
    }
}

#[async_trait]
impl FilingIndex for StaticFilingIndex {
    async fn recent_filings(&self, company: &WatchedCompany) -> Result<Vec<FilingRecord>> {
        self.filings
            .get(&company.ticker)
            .cloned()
            .ok_or_else(|| DigestError::General(format!("no index for {}", company.ticker)))
    }
}

pub fn filing_record(form: &str, date: &str, items: &str) -> FilingRecord {
    FilingRecord {
        form: form.to_string(),
        filing_date: date.to_string(),
        accession_number: format!("0001193125-25-{}", date.replace('-', "")),
        primary_document: format!("{}.htm", form.to_lowercase().replace('/', "")),
        items: items.to_string(),
    }
}

/// Page fetcher with canned HTML. Anything else fails like a dead link.
#[derive(Default)]
pub struct StaticPageFetcher {
    pages: HashMap<String, String>,
}

impl StaticPageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }
}

#[async_trait]
impl PageFetcher for StaticPageFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| DigestError::General(format!("404 for {}", url)))
    }
}

/// History held in memory, pruned on write like the gist store.
pub struct MemoryHistoryStore {
    history: Mutex<ArticleHistory>,
    retention_days: u64,
    today: NaiveDate,
    writes: AtomicUsize,
}

impl MemoryHistoryStore {
    pub fn new(history: ArticleHistory) -> Self {
        Self {
            history: Mutex::new(history),
            retention_days: 7,
            today: today(),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::new(ArticleHistory::default())
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> ArticleHistory {
        self.history.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn read(&self) -> ArticleHistory {
        self.snapshot()
    }

    async fn write(&self, new_entries: &[HistoryEntry], new_syntheses: &[DaySynthesis], existing: &ArticleHistory) -> bool {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let updated = existing
            .merged(new_entries, new_syntheses)
            .pruned(self.retention_days, self.today);
        *self.history.lock().unwrap() = updated;
        true
    }
}

/// Delivery channel that keeps every envelope, or refuses all of them.
#[derive(Default)]
pub struct RecordingDelivery {
    envelopes: Mutex<Vec<DigestEnvelope>>,
    refuse: bool,
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    pub fn delivered(&self) -> Vec<DigestEnvelope> {
        self.envelopes.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryChannel for RecordingDelivery {
    async fn deliver(&self, envelope: &DigestEnvelope) -> anyhow::Result<Option<String>> {
        if self.refuse {
            return Ok(None);
        }
        let mut envelopes = self.envelopes.lock().unwrap();
        envelopes.push(envelope.clone());
        Ok(Some(format!("msg-{}", envelopes.len())))
    }
}

#[derive(Default)]
pub struct RecordingRecorder {
    records: Mutex<Vec<DigestRecord>>,
}

impl RecordingRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<DigestRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl DigestRecorder for RecordingRecorder {
    async fn record(&self, record: &DigestRecord) -> anyhow::Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}
