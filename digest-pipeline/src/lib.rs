pub mod types;
pub mod config;
pub mod utils;
pub mod fetcher;
pub mod parser;
pub mod traits;
pub mod sources;
pub mod enricher;
pub mod classifier;
pub mod llm_adapter;
pub mod digest;
pub mod citations;
pub mod history;
pub mod recorder;
pub mod delivery;
pub mod pipeline;

pub use types::*;
pub use config::DigestConfig;
pub use fetcher::HttpFetcher;
pub use parser::FeedParser;
pub use enricher::ContentEnricher;
pub use digest::Synthesizer;
pub use history::GistHistoryStore;
pub use recorder::PgDigestRecorder;
pub use delivery::JsonFileDelivery;
pub use pipeline::{DigestPipeline, PipelineBuilder, RunReport};
