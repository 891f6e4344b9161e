use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Structured fields of a regulatory filing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingMeta {
    pub company: String,
    pub ticker: String,
    pub form_type: String,
    pub filed_on: NaiveDate,
    /// Event codes exactly as the filing index reports them, e.g. "2.02,9.01".
    pub event_codes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OriginKind {
    SearchResult,
    FeedEntry,
    Filing(FilingMeta),
}

/// A single fetched unit of content. The url is its identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub url: String,
    pub title: String,
    pub body_text: Option<String>,
    pub short_description: Option<String>,
    pub source_name: String,
    pub published_at: Option<DateTime<Utc>>,
    pub origin: OriginKind,
}

impl Item {
    pub fn new(url: impl Into<String>, title: impl Into<String>, source_name: impl Into<String>, origin: OriginKind) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            body_text: None,
            short_description: None,
            source_name: source_name.into(),
            published_at: None,
            origin,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.short_description = description.filter(|d| !d.trim().is_empty());
        self
    }

    pub fn with_published_at(mut self, published_at: Option<DateTime<Utc>>) -> Self {
        self.published_at = published_at;
        self
    }

    pub fn description(&self) -> Option<&str> {
        self.short_description.as_deref().filter(|d| !d.trim().is_empty())
    }

    /// Best available text for synthesis: enriched body, then description, then title.
    pub fn synthesis_content(&self) -> &str {
        self.body_text
            .as_deref()
            .filter(|b| !b.trim().is_empty())
            .or_else(|| self.description())
            .unwrap_or(&self.title)
    }

    pub fn filing(&self) -> Option<&FilingMeta> {
        match &self.origin {
            OriginKind::Filing(meta) => Some(meta),
            _ => None,
        }
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for Item {}

impl Hash for Item {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}

/// One topic's items in fetch order. That order becomes local citation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicBundle {
    pub topic: String,
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifiedFilings {
    pub notable: Vec<Item>,
    pub routine: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelIdentity {
    pub provider: String,
    pub model: String,
}

impl ModelIdentity {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    pub fn fallback() -> Self {
        Self::new("Fallback", "none")
    }

    pub fn is_fallback(&self) -> bool {
        self.provider == "Fallback"
    }
}

/// Narrative prose for one topic. Citation markers are local to the topic's source list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Synthesis {
    pub topic: String,
    pub prose: String,
    pub model: ModelIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReference {
    pub number: usize,
    pub title: String,
    pub source_name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineFilingRow {
    pub company: String,
    pub form_type: String,
    pub date: NaiveDate,
    pub url: String,
    pub short_detail: String,
}

/// Per-article summary for topics rendered as briefs instead of narrative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemBrief {
    pub title: String,
    pub url: String,
    pub source_name: String,
    pub summary: String,
    pub model: ModelIdentity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SectionBody {
    Narrative { prose: String, model: ModelIdentity },
    Briefs { briefs: Vec<ItemBrief> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicSection {
    pub topic: String,
    pub body: SectionBody,
}

/// Orchestrator states, in the order a successful run passes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    FetchingSources,
    Enriching,
    ClassifyingFilings,
    Synthesizing,
    Renumbering,
    AwaitingDelivery,
    Recording,
    Done,
}

/// A failure that was absorbed without halting the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialFailure {
    pub stage: PipelineStage,
    /// Topic name, feed url or collaborator the failure belongs to.
    pub scope: String,
    pub message: String,
}

/// Everything presentation needs to render one digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestOutput {
    pub generated_at: DateTime<Utc>,
    pub overview: Option<String>,
    pub sections: Vec<TopicSection>,
    pub references: Vec<SourceReference>,
    pub routine_filings: Vec<RoutineFilingRow>,
    pub model: ModelIdentity,
    pub partial_failures: Vec<PartialFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestEnvelope {
    pub recipient: Recipient,
    pub subject: String,
    pub body: DigestOutput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedArticle {
    pub topic: String,
    pub item: Item,
    pub summary: Option<String>,
}

/// "This was sent" record handed to persistence after a successful delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestRecord {
    pub digest_id: String,
    pub recipient: String,
    pub model: ModelIdentity,
    pub subject: String,
    pub delivery_id: String,
    pub sent_at: DateTime<Utc>,
    pub articles: Vec<RecordedArticle>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub url: String,
    pub title: String,
    pub topic: String,
    pub date_sent: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySynthesis {
    pub topic: String,
    pub prose: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleHistory {
    pub entries: Vec<HistoryEntry>,
    pub syntheses: Vec<DaySynthesis>,
}

fn window_start(today: NaiveDate, days: u64) -> NaiveDate {
    today.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN)
}

impl ArticleHistory {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.syntheses.is_empty()
    }

    /// Urls sent within the last `days` days, counting back from `today`.
    pub fn sent_urls(&self, days: u64, today: NaiveDate) -> HashSet<&str> {
        let cutoff = window_start(today, days);
        self.entries
            .iter()
            .filter(|e| e.date_sent >= cutoff)
            .map(|e| e.url.as_str())
            .collect()
    }

    /// Recent syntheses grouped by topic, newest first within each topic.
    pub fn recent_syntheses_by_topic(&self, days: u64, today: NaiveDate) -> HashMap<&str, Vec<&DaySynthesis>> {
        let cutoff = window_start(today, days);
        let mut by_topic: HashMap<&str, Vec<&DaySynthesis>> = HashMap::new();
        for synthesis in self.syntheses.iter().filter(|s| s.date >= cutoff) {
            by_topic.entry(synthesis.topic.as_str()).or_default().push(synthesis);
        }
        for list in by_topic.values_mut() {
            list.sort_by(|a, b| b.date.cmp(&a.date));
        }
        by_topic
    }

    pub fn merged(&self, new_entries: &[HistoryEntry], new_syntheses: &[DaySynthesis]) -> Self {
        let mut entries = self.entries.clone();
        entries.extend_from_slice(new_entries);
        let mut syntheses = self.syntheses.clone();
        syntheses.extend_from_slice(new_syntheses);
        Self { entries, syntheses }
    }

    /// Drops everything older than `retention_days` before `today`.
    pub fn pruned(mut self, retention_days: u64, today: NaiveDate) -> Self {
        let cutoff = window_start(today, retention_days);
        self.entries.retain(|e| e.date_sent >= cutoff);
        self.syntheses.retain(|s| s.date >= cutoff);
        self
    }
}

// Collaborator contracts.
//
// The pipeline only ever talks to the outside world through these traits.
// Implementations are chosen once when the pipeline is built and shared as
// `Arc<dyn ...>` for the lifetime of a run.

#[async_trait]
pub trait CompletionModel: Send + Sync {
    fn identify(&self) -> ModelIdentity;

    async fn complete_text(&self, system: &str, prompt: &str, max_tokens: u32) -> Result<String>;
}

#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Returns the transport's message identifier. `None` counts as a failed delivery.
    async fn deliver(&self, envelope: &DigestEnvelope) -> Result<Option<String>>;
}

#[async_trait]
pub trait DigestRecorder: Send + Sync {
    async fn record(&self, record: &DigestRecord) -> Result<()>;
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Must degrade to an empty history on any failure.
    async fn read(&self) -> ArticleHistory;

    async fn write(&self, new_entries: &[HistoryEntry], new_syntheses: &[DaySynthesis], existing: &ArticleHistory) -> bool;
}
