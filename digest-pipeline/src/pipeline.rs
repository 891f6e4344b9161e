//! One digest run for one recipient.
//!
//! The run walks `Idle → FetchingSources → Enriching → ClassifyingFilings →
//! Synthesizing → Renumbering → AwaitingDelivery → Recording → Done`. Source,
//! topic, overview, recorder and history failures are collected as
//! [`PartialFailure`]s and the run keeps going. Only two outcomes end a run
//! early: no topic produced any content, or delivery did not succeed.

use crate::citations::{renumber, TopicSources};
use crate::classifier::{classify_filings, routine_rows};
use crate::config::{DigestConfig, TopicMode, TopicSpec};
use crate::delivery::build_subject;
use crate::digest::{fallback_synthesis, OverviewInput, Synthesizer};
use crate::enricher::{ContentEnricher, EnrichReport};
use crate::llm_adapter::build_model;
use crate::sources::{FetchOutcome, FilingFetcher, SourceFailure, TopicFetcher};
use crate::traits::{FeedReader, FilingIndex, PageFetcher, SearchApi};
use crate::types::{
    ArticleHistory, ClassifiedFilings, DaySynthesis, DigestEnvelope, DigestError, DigestOutput, DigestRecord,
    HistoryEntry, Item, ItemBrief, PartialFailure, PipelineStage, Recipient, RecordedArticle, Result, SectionBody,
    Synthesis, TopicBundle, TopicSection,
};
use crate::utils::time;
use chrono::{NaiveDate, Utc};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use interfaces::defs::{CompletionModel, DeliveryChannel, DigestRecorder, HistoryStore};
use interfaces::noop::NoopRecorder;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Topic label routine filings are recorded under.
pub const ROUTINE_FILINGS_TOPIC: &str = "SEC Filings";

/// What a finished (or aborted) run looked like.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub stage: PipelineStage,
    pub digest_id: String,
    pub delivery_id: String,
    pub subject: String,
    pub topics_with_content: usize,
    pub items_fetched: usize,
    pub duplicates_removed: usize,
    pub filings_fetched: usize,
    pub notable_filings: usize,
    pub enrichment: EnrichReport,
    pub references: usize,
    pub recorded: bool,
    pub history_written: bool,
    pub partial_failures: Vec<PartialFailure>,
    pub output: DigestOutput,
}

/// Current stage plus the failures absorbed so far.
struct RunState {
    stage: PipelineStage,
    failures: Vec<PartialFailure>,
}

impl RunState {
    fn new() -> Self {
        Self {
            stage: PipelineStage::Idle,
            failures: Vec::new(),
        }
    }

    fn advance(&mut self, next: PipelineStage) {
        info!("Pipeline stage {:?} -> {:?}", self.stage, next);
        self.stage = next;
    }

    fn absorb(&mut self, scope: impl Into<String>, message: impl Into<String>) {
        self.failures.push(PartialFailure {
            stage: self.stage,
            scope: scope.into(),
            message: message.into(),
        });
    }

    fn absorb_sources(&mut self, failures: Vec<SourceFailure>) {
        for failure in failures {
            self.absorb(failure.source, failure.message);
        }
    }
}

/// A configured topic and the bundle it ended up with.
struct TopicWork<'a> {
    spec: &'a TopicSpec,
    bundle: TopicBundle,
}

enum Draft {
    Narrative(Result<Synthesis>),
    Briefs(Vec<ItemBrief>),
}

pub struct DigestPipeline {
    config: DigestConfig,
    topics: TopicFetcher,
    filings: Option<FilingFetcher>,
    enricher: ContentEnricher,
    synthesizer: Synthesizer,
    delivery: Arc<dyn DeliveryChannel>,
    recorder: Arc<dyn DigestRecorder>,
    history: Arc<dyn HistoryStore>,
    today: Option<NaiveDate>,
}

impl DigestPipeline {
    pub fn builder(config: DigestConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    /// Runs the whole pipeline once. Errors only with `NoContent` or `DeliveryFailed`.
    pub async fn run(&self, recipient: &Recipient) -> Result<RunReport> {
        let today = self.today.unwrap_or_else(time::today);
        let mut state = RunState::new();
        info!("Starting digest run for {} ({} topics)", recipient.email, self.config.topics.len());

        let history = self.history.read().await;

        // Fetch
        state.advance(PipelineStage::FetchingSources);
        let (topic_results, filing_outcome) = tokio::join!(
            join_all(
                self.config
                    .topics
                    .iter()
                    .map(|topic| self.topics.fetch_topic(topic, self.config.sources.max_items_per_topic, today))
            ),
            self.fetch_filings(today)
        );

        let sent = history.sent_urls(self.config.history.dedup_days, today);
        let mut duplicates_removed = 0;
        let mut unsent = |items: Vec<Item>| {
            let before = items.len();
            let kept: Vec<Item> = items.into_iter().filter(|i| !sent.contains(i.url.as_str())).collect();
            duplicates_removed += before - kept.len();
            kept
        };

        let mut work = Vec::with_capacity(self.config.topics.len());
        for (spec, result) in self.config.topics.iter().zip(topic_results) {
            match result {
                Ok(outcome) => {
                    state.absorb_sources(outcome.failures);
                    work.push(TopicWork {
                        spec,
                        bundle: TopicBundle {
                            topic: spec.name.clone(),
                            items: unsent(outcome.items),
                        },
                    });
                }
                Err(e) => {
                    warn!("Topic '{}' contributed nothing: {}", spec.name, e);
                    state.absorb(&spec.name, e.to_string());
                }
            }
        }
        state.absorb_sources(filing_outcome.failures);
        let mut filings = unsent(filing_outcome.items);

        work.retain(|topic| !topic.bundle.items.is_empty());
        if work.is_empty() {
            warn!("No topic produced content for {}", recipient.email);
            return Err(DigestError::NoContent {
                recipient: recipient.email.clone(),
            });
        }
        let items_fetched: usize = work.iter().map(|t| t.bundle.items.len()).sum();
        let filings_fetched = filings.len();
        info!(
            "Fetched {} items across {} topics, {} filings ({} already sent)",
            items_fetched,
            work.len(),
            filings_fetched,
            duplicates_removed
        );

        // Enrich
        state.advance(PipelineStage::Enriching);
        let targets: Vec<&mut Item> = work
            .iter_mut()
            .flat_map(|topic| topic.bundle.items.iter_mut())
            .chain(filings.iter_mut())
            .collect();
        let enrichment = self.enricher.enrich(targets).await;

        // Classify
        state.advance(PipelineStage::ClassifyingFilings);
        let mut classified = classify_filings(filings);
        let narrative_index = work.iter().position(|topic| {
            topic.spec.name == self.config.filings.narrative_topic && topic.spec.mode == TopicMode::Synthesis
        });
        if narrative_index.is_none() && !classified.notable.is_empty() {
            info!(
                "Topic '{}' has no content, listing {} notable filings as routine",
                self.config.filings.narrative_topic,
                classified.notable.len()
            );
            classified.routine.append(&mut classified.notable);
            classified.routine.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        }
        let notable_filings = classified.notable.len();
        info!("{} notable and {} routine filings", notable_filings, classified.routine.len());

        // Synthesize
        state.advance(PipelineStage::Synthesizing);
        let recent = history.recent_syntheses_by_topic(self.config.history.context_days, today);
        let drafts: Vec<Draft> = stream::iter(work.iter().enumerate().map(|(index, topic)| {
            let appended = self.appended_filings(index, narrative_index, &classified.notable);
            let previous = recent
                .get(topic.spec.name.as_str())
                .and_then(|list| list.first())
                .map(|s| s.prose.as_str());
            self.draft_topic(topic, appended, previous)
        }))
        .buffered(self.config.model.synthesis_concurrency.max(1))
        .collect()
        .await;

        let mut narratives: Vec<(usize, Synthesis)> = Vec::new();
        let mut briefs: HashMap<usize, Vec<ItemBrief>> = HashMap::new();
        for (index, draft) in drafts.into_iter().enumerate() {
            let topic = &work[index];
            match draft {
                Draft::Narrative(Ok(synthesis)) => narratives.push((index, synthesis)),
                Draft::Narrative(Err(e)) => {
                    error!("Synthesis failed for '{}', using headline fallback: {}", topic.spec.name, e);
                    state.absorb(&topic.spec.name, e.to_string());
                    let appended = self.appended_filings(index, narrative_index, &classified.notable);
                    narratives.push((index, fallback_synthesis(&topic.spec.name, &topic.bundle.items, appended)));
                }
                Draft::Briefs(list) => {
                    briefs.insert(index, list);
                }
            }
        }

        let overview = self.overview(&work, &narratives, &mut state).await;

        // Renumber
        state.advance(PipelineStage::Renumbering);
        let sources: Vec<TopicSources<'_>> = narratives
            .iter()
            .map(|(index, synthesis)| TopicSources {
                synthesis,
                sources: work[*index]
                    .bundle
                    .items
                    .iter()
                    .chain(self.appended_filings(*index, narrative_index, &classified.notable))
                    .collect(),
            })
            .collect();
        let renumbered = renumber(&sources, self.config.citation_style);
        info!("Assigned {} citation numbers", renumbered.references.len());

        let mut rewritten: HashMap<usize, Synthesis> = narratives
            .iter()
            .map(|(index, _)| *index)
            .zip(renumbered.syntheses)
            .collect();
        let mut sections = Vec::with_capacity(work.len());
        for (index, topic) in work.iter().enumerate() {
            let body = match rewritten.remove(&index) {
                Some(synthesis) => SectionBody::Narrative {
                    prose: synthesis.prose,
                    model: synthesis.model,
                },
                None => SectionBody::Briefs {
                    briefs: briefs.remove(&index).unwrap_or_default(),
                },
            };
            sections.push(TopicSection {
                topic: topic.spec.name.clone(),
                body,
            });
        }

        let output = DigestOutput {
            generated_at: Utc::now(),
            overview,
            sections,
            references: renumbered.references,
            routine_filings: routine_rows(&classified.routine),
            model: self.synthesizer.model_identity(),
            partial_failures: state.failures.clone(),
        };

        // Deliver
        state.advance(PipelineStage::AwaitingDelivery);
        let topic_names: Vec<&str> = output.sections.iter().map(|s| s.topic.as_str()).collect();
        let envelope = DigestEnvelope {
            recipient: recipient.clone(),
            subject: build_subject(&topic_names),
            body: output,
        };
        let delivery_id = match self.delivery.deliver(&envelope).await {
            Ok(Some(id)) if !id.trim().is_empty() => id,
            Ok(_) => {
                error!("Delivery to {} returned no message id", recipient.email);
                return Err(DigestError::DeliveryFailed("no message id returned".to_string()));
            }
            Err(e) => {
                error!("Delivery to {} failed: {}", recipient.email, e);
                return Err(DigestError::DeliveryFailed(e.to_string()));
            }
        };
        info!("Delivered digest to {} ({})", recipient.email, delivery_id);

        // Record
        state.advance(PipelineStage::Recording);
        let articles = delivered_articles(&work, &envelope.body.sections, narrative_index, &classified);
        let digest_id = Uuid::new_v4().to_string();
        let record = DigestRecord {
            digest_id: digest_id.clone(),
            recipient: recipient.email.clone(),
            model: envelope.body.model.clone(),
            subject: envelope.subject.clone(),
            delivery_id: delivery_id.clone(),
            sent_at: Utc::now(),
            articles,
        };
        let recorded = match self.recorder.record(&record).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to record digest {}: {}", digest_id, e);
                state.absorb("recorder", e.to_string());
                false
            }
        };

        let history_written = self
            .write_history(&history, &record.articles, &narratives, today)
            .await;
        if !history_written {
            warn!("History was not updated for {}", recipient.email);
        }

        state.advance(PipelineStage::Done);
        Ok(RunReport {
            stage: state.stage,
            digest_id,
            delivery_id,
            subject: envelope.subject,
            topics_with_content: work.len(),
            items_fetched,
            duplicates_removed,
            filings_fetched,
            notable_filings,
            enrichment,
            references: envelope.body.references.len(),
            recorded,
            history_written,
            partial_failures: state.failures,
            output: envelope.body,
        })
    }

    async fn fetch_filings(&self, today: NaiveDate) -> FetchOutcome {
        match &self.filings {
            Some(fetcher) => fetcher.fetch_recent(today).await,
            None => FetchOutcome::default(),
        }
    }

    fn appended_filings<'a>(&self, index: usize, narrative_index: Option<usize>, notable: &'a [Item]) -> &'a [Item] {
        if Some(index) == narrative_index {
            notable
        } else {
            &[]
        }
    }

    async fn draft_topic(&self, topic: &TopicWork<'_>, appended: &[Item], previous: Option<&str>) -> Draft {
        match topic.spec.mode {
            TopicMode::Summaries => Draft::Briefs(self.synthesizer.summarize_items(&topic.bundle.items, topic.spec).await),
            TopicMode::Synthesis => Draft::Narrative(
                self.synthesizer
                    .synthesize_topic(&topic.bundle.topic, &topic.bundle.items, appended, previous)
                    .await,
            ),
        }
    }

    /// Written from model prose when any exists, otherwise from headlines.
    async fn overview(
        &self,
        work: &[TopicWork<'_>],
        narratives: &[(usize, Synthesis)],
        state: &mut RunState,
    ) -> Option<String> {
        let written: Vec<Synthesis> = narratives
            .iter()
            .filter(|(_, s)| !s.model.is_fallback())
            .map(|(_, s)| s.clone())
            .collect();

        let result = if written.is_empty() {
            let headlines: Vec<(String, Vec<String>)> = work
                .iter()
                .map(|topic| {
                    let titles = topic.bundle.items.iter().map(|item| item.title.clone()).collect();
                    (topic.spec.name.clone(), titles)
                })
                .collect();
            self.synthesizer
                .generate_overview(OverviewInput::Headlines(&headlines))
                .await
        } else {
            self.synthesizer
                .generate_overview(OverviewInput::Syntheses(&written))
                .await
        };

        match result {
            Ok(overview) => Some(overview),
            Err(e) => {
                warn!("Overview failed, sending without one: {}", e);
                state.absorb("overview", e.to_string());
                None
            }
        }
    }

    async fn write_history(
        &self,
        existing: &ArticleHistory,
        articles: &[RecordedArticle],
        narratives: &[(usize, Synthesis)],
        today: NaiveDate,
    ) -> bool {
        let entries: Vec<HistoryEntry> = articles
            .iter()
            .map(|article| HistoryEntry {
                url: article.item.url.clone(),
                title: article.item.title.clone(),
                topic: article.topic.clone(),
                date_sent: today,
            })
            .collect();
        let syntheses: Vec<DaySynthesis> = narratives
            .iter()
            .filter(|(_, s)| !s.model.is_fallback())
            .map(|(_, s)| DaySynthesis {
                topic: s.topic.clone(),
                prose: s.prose.clone(),
                date: today,
            })
            .collect();

        self.history.write(&entries, &syntheses, existing).await
    }
}

/// Every item that made it into the digest, tagged with the topic it appeared under.
fn delivered_articles(
    work: &[TopicWork<'_>],
    sections: &[TopicSection],
    narrative_index: Option<usize>,
    classified: &ClassifiedFilings,
) -> Vec<RecordedArticle> {
    let mut seen = HashSet::new();
    let mut articles = Vec::new();
    let mut push = |topic: &str, item: &Item, summary: Option<String>| {
        if seen.insert(item.url.clone()) {
            articles.push(RecordedArticle {
                topic: topic.to_string(),
                item: item.clone(),
                summary,
            });
        }
    };

    for (index, (topic, section)) in work.iter().zip(sections).enumerate() {
        match &section.body {
            SectionBody::Briefs { briefs } => {
                for item in &topic.bundle.items {
                    let summary = briefs.iter().find(|b| b.url == item.url).map(|b| b.summary.clone());
                    push(&topic.spec.name, item, summary);
                }
            }
            SectionBody::Narrative { .. } => {
                for item in &topic.bundle.items {
                    push(&topic.spec.name, item, None);
                }
                if Some(index) == narrative_index {
                    for filing in &classified.notable {
                        push(&topic.spec.name, filing, filing.short_description.clone());
                    }
                }
            }
        }
    }
    for filing in &classified.routine {
        push(ROUTINE_FILINGS_TOPIC, filing, filing.short_description.clone());
    }
    articles
}

/// Assembles a [`DigestPipeline`] from configuration and collaborators.
pub struct PipelineBuilder {
    config: DigestConfig,
    search: Option<Arc<dyn SearchApi>>,
    feeds: Option<Arc<dyn FeedReader>>,
    filing_index: Option<Arc<dyn FilingIndex>>,
    pages: Option<Arc<dyn PageFetcher>>,
    model: Option<Arc<dyn CompletionModel>>,
    delivery: Option<Arc<dyn DeliveryChannel>>,
    recorder: Arc<dyn DigestRecorder>,
    history: Option<Arc<dyn HistoryStore>>,
    today: Option<NaiveDate>,
}

impl PipelineBuilder {
    pub fn new(config: DigestConfig) -> Self {
        Self {
            config,
            search: None,
            feeds: None,
            filing_index: None,
            pages: None,
            model: None,
            delivery: None,
            recorder: Arc::new(NoopRecorder),
            history: None,
            today: None,
        }
    }

    pub fn search(mut self, search: Arc<dyn SearchApi>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn feeds(mut self, feeds: Arc<dyn FeedReader>) -> Self {
        self.feeds = Some(feeds);
        self
    }

    pub fn filing_index(mut self, index: Arc<dyn FilingIndex>) -> Self {
        self.filing_index = Some(index);
        self
    }

    pub fn pages(mut self, pages: Arc<dyn PageFetcher>) -> Self {
        self.pages = Some(pages);
        self
    }

    pub fn model(mut self, model: Arc<dyn CompletionModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn delivery(mut self, delivery: Arc<dyn DeliveryChannel>) -> Self {
        self.delivery = Some(delivery);
        self
    }

    pub fn recorder(mut self, recorder: Arc<dyn DigestRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    /// Pins the calendar date the run treats as today.
    pub fn today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn build(self) -> Result<DigestPipeline> {
        let missing = |name: &str| DigestError::Config(format!("pipeline needs a {}", name));

        let search = self.search.ok_or_else(|| missing("search API"))?;
        let feeds = self.feeds.ok_or_else(|| missing("feed reader"))?;
        let pages = self.pages.ok_or_else(|| missing("page fetcher"))?;
        let delivery = self.delivery.ok_or_else(|| missing("delivery channel"))?;
        let history = self.history.ok_or_else(|| missing("history store"))?;
        let model = match self.model {
            Some(model) => model,
            None => build_model(&self.config.model, &self.config.fetch)?,
        };

        let filings = match (self.config.filings.enabled, self.filing_index) {
            (true, Some(index)) => Some(FilingFetcher::new(index, self.config.filings.clone())),
            (true, None) => return Err(missing("filing index")),
            (false, _) => None,
        };

        Ok(DigestPipeline {
            topics: TopicFetcher::new(search, feeds, self.config.sources.clone()),
            filings,
            enricher: ContentEnricher::new(pages, self.config.enrich.clone()),
            synthesizer: Synthesizer::new(model, self.config.model.clone()),
            delivery,
            recorder: self.recorder,
            history,
            today: self.today,
            config: self.config,
        })
    }
}
