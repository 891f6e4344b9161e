use serde::{Deserialize, Serialize};

pub use interfaces::defs::{
    ArticleHistory, ClassifiedFilings, DaySynthesis, DigestEnvelope, DigestOutput, DigestRecord,
    FilingMeta, HistoryEntry, Item, ItemBrief, ModelIdentity, OriginKind, PartialFailure,
    PipelineStage, Recipient, RecordedArticle, RoutineFilingRow, SectionBody, SourceReference,
    Synthesis, TopicBundle, TopicSection,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    /// Minimum gap between two requests to the same host.
    pub politeness_millis: u64,
    pub max_redirects: usize,
    pub max_body_size_mb: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Digest-Pipeline/1.0".to_string(),
            timeout_seconds: 30,
            max_retries: 2,
            retry_delay_seconds: 1,
            politeness_millis: 250,
            max_redirects: 5,
            max_body_size_mb: 10,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{provider} model error: {message}")]
    Model { provider: String, message: String },

    #[error("No content produced for {recipient}")]
    NoContent { recipient: String },

    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("General error: {0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, DigestError>;
