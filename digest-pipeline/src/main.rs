use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use digest_pipeline::sources::{EdgarClient, NewsApiClient, RssFeedReader};
use digest_pipeline::{
    DigestConfig, DigestPipeline, FetchConfig, GistHistoryStore, HttpFetcher, JsonFileDelivery, PgDigestRecorder,
    Recipient,
};
use interfaces::defs::DigestRecorder;
use interfaces::noop::NoopRecorder;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "digest-pipeline")]
#[command(about = "Builds and delivers a cited news digest")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline once for one recipient
    Run {
        #[arg(long)]
        recipient: String,

        #[arg(long)]
        name: Option<String>,

        /// TOML configuration file
        #[arg(short, long, env = "DIGEST_CONFIG")]
        config: Option<PathBuf>,

        /// Where the dry-run delivery channel writes digests
        #[arg(long, default_value = "digests")]
        out_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            recipient,
            name,
            config,
            out_dir,
        } => run(Recipient { email: recipient, name }, config, out_dir).await,
    }
}

async fn run(recipient: Recipient, config_path: Option<PathBuf>, out_dir: PathBuf) -> Result<()> {
    let config = DigestConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    info!("Loaded configuration with {} topics", config.topics.len());

    let http = Arc::new(HttpFetcher::new(config.fetch.clone())?);
    let edgar_http = Arc::new(HttpFetcher::new(FetchConfig {
        user_agent: config.filings.user_agent.clone(),
        ..config.fetch.clone()
    })?);
    let enrich_http = Arc::new(HttpFetcher::with_timeout(
        FetchConfig {
            max_retries: 0,
            ..config.fetch.clone()
        },
        config.enrich.timeout_seconds,
    )?);

    let recorder: Arc<dyn DigestRecorder> = match &config.database_url {
        Some(url) => match connect_recorder(url).await {
            Ok(recorder) => Arc::new(recorder),
            Err(e) => {
                warn!("Database unavailable, digests will not be recorded: {}", e);
                Arc::new(NoopRecorder)
            }
        },
        None => Arc::new(NoopRecorder),
    };

    let pipeline = DigestPipeline::builder(config.clone())
        .search(Arc::new(NewsApiClient::new(
            http.clone(),
            config.sources.search_base_url.clone(),
            config.sources.search_api_key.clone(),
        )))
        .feeds(Arc::new(RssFeedReader::new(http.clone())))
        .filing_index(Arc::new(EdgarClient::new(edgar_http)))
        .pages(enrich_http)
        .delivery(Arc::new(JsonFileDelivery::new(out_dir)))
        .recorder(recorder)
        .history(Arc::new(GistHistoryStore::new(http, config.history.clone())))
        .build()?;

    match pipeline.run(&recipient).await {
        Ok(report) => {
            info!(
                "Digest {} delivered as {}: {} topics, {} references, {} partial failures",
                report.digest_id,
                report.delivery_id,
                report.topics_with_content,
                report.references,
                report.partial_failures.len()
            );
            Ok(())
        }
        Err(e) => {
            error!("No digest sent to {}: {}", recipient.email, e);
            Err(e.into())
        }
    }
}

async fn connect_recorder(database_url: &str) -> digest_pipeline::Result<PgDigestRecorder> {
    let recorder = PgDigestRecorder::connect(database_url).await?;
    recorder.setup_schema().await?;
    info!("Recording digests to PostgreSQL");
    Ok(recorder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_subcommand_parses_flags() {
        let cli = Cli::try_parse_from([
            "digest-pipeline",
            "run",
            "--recipient",
            "reader@example.com",
            "--config",
            "digest.toml",
        ])
        .unwrap();

        let Command::Run {
            recipient,
            name,
            config,
            out_dir,
        } = cli.command;
        assert_eq!(recipient, "reader@example.com");
        assert!(name.is_none());
        assert_eq!(config, Some(PathBuf::from("digest.toml")));
        assert_eq!(out_dir, PathBuf::from("digests"));
    }
}
