//! Run configuration.
//!
//! A `DigestConfig` is assembled once at process start: defaults, then an
//! optional TOML file, then environment variables for secrets and provider
//! selection. Components receive the pieces they need through their
//! constructors.

use crate::sources::edgar::default_watchlist;
use crate::types::{DigestError, FetchConfig, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    #[default]
    Anthropic,
    OpenAi,
}

impl std::str::FromStr for AiProvider {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            other => Err(DigestError::Config(format!("Unsupported AI provider: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CitationStyle {
    #[default]
    Anchor,
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicMode {
    #[default]
    Synthesis,
    Summaries,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicSpec {
    pub name: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub exclude_keywords: Vec<String>,
    /// Pre-curated feeds. When present they replace keyword filtering for their own entries.
    #[serde(default)]
    pub curated_feeds: Vec<String>,
    #[serde(default)]
    pub mode: TopicMode,
}

impl TopicSpec {
    pub fn new(name: &str, keywords: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            exclude_keywords: Vec::new(),
            curated_feeds: Vec::new(),
            mode: TopicMode::Synthesis,
        }
    }

    pub fn with_curated_feeds(mut self, feeds: &[&str]) -> Self {
        self.curated_feeds = feeds.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_exclusions(mut self, exclusions: &[&str]) -> Self {
        self.exclude_keywords = exclusions.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_mode(mut self, mode: TopicMode) -> Self {
        self.mode = mode;
        self
    }

    /// Keywords with blanks removed. An empty result makes the topic unfetchable.
    pub fn validated_keywords(&self) -> Result<Vec<String>> {
        let keywords: Vec<String> = self
            .keywords
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if keywords.is_empty() {
            return Err(DigestError::Config(format!("Topic '{}' has no keywords", self.name)));
        }
        Ok(keywords)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub search_base_url: String,
    pub search_api_key: Option<String>,
    pub generic_feeds: Vec<String>,
    pub generic_feed_count: usize,
    pub entries_per_feed: usize,
    pub max_items_per_topic: usize,
    pub days_back: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            search_base_url: "https://newsapi.org/v2".to_string(),
            search_api_key: None,
            generic_feeds: GENERIC_FEEDS.iter().map(|f| f.to_string()).collect(),
            generic_feed_count: 5,
            entries_per_feed: 10,
            max_items_per_topic: 10,
            days_back: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedCompany {
    pub ticker: String,
    pub cik: u64,
    pub company: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilingConfig {
    pub enabled: bool,
    pub user_agent: String,
    pub days_back: u32,
    pub max_filings: usize,
    pub watchlist: Vec<WatchedCompany>,
    /// Topic whose synthesis receives the notable filings as extra sources.
    pub narrative_topic: String,
}

impl Default for FilingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            user_agent: "DigestPipeline/1.0 (digest@example.com)".to_string(),
            days_back: 7,
            max_filings: 10,
            watchlist: default_watchlist(),
            narrative_topic: "Biotech & Pharma".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    pub concurrency: usize,
    pub timeout_seconds: u64,
    pub max_body_chars: usize,
    pub skip_domains: Vec<String>,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            timeout_seconds: 15,
            max_body_chars: 2000,
            skip_domains: vec!["sec.gov".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: AiProvider,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub synthesis_max_tokens: u32,
    pub overview_max_tokens: u32,
    pub summary_max_length: u32,
    pub synthesis_concurrency: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: AiProvider::Anthropic,
            anthropic_api_key: None,
            anthropic_model: "claude-sonnet-4-20250514".to_string(),
            openai_api_key: None,
            openai_model: "gpt-4o".to_string(),
            synthesis_max_tokens: 2000,
            overview_max_tokens: 500,
            summary_max_length: 500,
            synthesis_concurrency: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub gist_id: Option<String>,
    pub github_token: Option<String>,
    pub file_name: String,
    pub api_base_url: String,
    pub retention_days: u64,
    pub dedup_days: u64,
    pub context_days: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            gist_id: None,
            github_token: None,
            file_name: "sent_articles.json".to_string(),
            api_base_url: "https://api.github.com/gists".to_string(),
            retention_days: 7,
            dedup_days: 3,
            context_days: 7,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    pub fetch: FetchConfig,
    pub sources: SourceConfig,
    pub filings: FilingConfig,
    pub enrich: EnrichConfig,
    pub model: ModelConfig,
    pub history: HistoryConfig,
    pub topics: Vec<TopicSpec>,
    pub citation_style: CitationStyle,
    pub database_url: Option<String>,
}

impl DigestConfig {
    /// Defaults, then the TOML file if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                let content = std::fs::read_to_string(path)?;
                Self::from_toml_str(&content)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        if config.topics.is_empty() {
            debug!("No topics configured, using seed topics");
            config.topics = seed_topics();
        }
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Environment variables win over file values. Blank values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(provider) = get("AI_PROVIDER").and_then(|p| p.parse().ok()) {
            self.model.provider = provider;
        }
        if let Some(key) = get("ANTHROPIC_API_KEY") {
            self.model.anthropic_api_key = Some(key);
        }
        if let Some(model) = get("ANTHROPIC_MODEL") {
            self.model.anthropic_model = model;
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.model.openai_api_key = Some(key);
        }
        if let Some(model) = get("OPENAI_MODEL") {
            self.model.openai_model = model;
        }
        if let Some(key) = get("NEWSAPI_KEY") {
            self.sources.search_api_key = Some(key);
        }
        if let Some(token) = get("GITHUB_TOKEN") {
            self.history.github_token = Some(token);
        }
        if let Some(id) = get("GIST_ID") {
            self.history.gist_id = Some(id);
        }
        if let Some(url) = get("DATABASE_URL") {
            self.database_url = Some(url);
        }
    }
}

const GENERIC_FEEDS: &[&str] = &[
    "https://feeds.arstechnica.com/arstechnica/technology-lab",
    "https://www.wired.com/feed/rss",
    "https://rss.nytimes.com/services/xml/rss/nyt/Technology.xml",
    "https://www.sciencedaily.com/rss/all.xml",
    "https://rss.nytimes.com/services/xml/rss/nyt/Science.xml",
    "https://feeds.bloomberg.com/markets/news.rss",
    "https://rss.nytimes.com/services/xml/rss/nyt/Business.xml",
    "https://rss.nytimes.com/services/xml/rss/nyt/Health.xml",
    "https://rss.nytimes.com/services/xml/rss/nyt/HomePage.xml",
    "https://feeds.bbci.co.uk/news/rss.xml",
];

pub fn seed_topics() -> Vec<TopicSpec> {
    vec![
        TopicSpec::new(
            "Biotech & Pharma",
            &[
                "cell therapy",
                "CAR-T",
                "gene therapy",
                "cell therapy manufacturing",
                "CGT manufacturing",
                "autologous manufacturing",
                "allogeneic cell therapy",
                "ADC manufacturing",
                "antibody drug conjugate",
                "CDMO",
                "contract manufacturing",
                "FUJIFILM Diosynth",
                "Boehringer Ingelheim",
                "Samsung Biologics",
                "Recipharm",
            ],
        )
        .with_curated_feeds(&[
            "https://www.fiercebiotech.com/rss/xml",
            "https://www.fiercepharma.com/rss/xml",
            "https://www.statnews.com/feed/",
            "https://www.genengnews.com/feed/",
        ]),
        TopicSpec::new(
            "AI News",
            &["artificial intelligence", "machine learning", "LLM", "OpenAI", "Anthropic"],
        ),
        TopicSpec::new("NBA", &["NBA", "basketball", "NBA playoffs", "NBA trade"]),
        TopicSpec::new("Formula 1", &["Formula 1", "F1", "Grand Prix", "FIA"]),
        TopicSpec::new(
            "San Diego Local",
            &[
                "San Diego",
                "North County San Diego",
                "Encinitas",
                "Carlsbad",
                "Oceanside",
                "Escondido",
                "San Diego news",
                "San Diego county",
            ],
        ),
        TopicSpec::new(
            "Asia & SE Asia",
            &[
                "Southeast Asia biotech",
                "Asia biotech industry",
                "Singapore biotech",
                "expat Asia",
                "expat Southeast Asia",
                "Asia pharma manufacturing",
                "Thailand expat",
                "Vietnam biotech",
            ],
        ),
    ]
}
