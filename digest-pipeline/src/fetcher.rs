use crate::traits::PageFetcher;
use crate::types::{DigestError, FetchConfig, Result};
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, warn};
use url::Url;

/// Shared HTTP plumbing for every outbound source: one client, bounded
/// retries with exponential backoff, and a per-host politeness gap.
pub struct HttpFetcher {
    client: Client,
    config: FetchConfig,
    rate_limiter: Arc<RwLock<HashMap<String, Instant>>>,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self {
            client,
            config,
            rate_limiter: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Same retry policy, different per-request timeout (enrichment uses a shorter one).
    pub fn with_timeout(config: FetchConfig, timeout_seconds: u64) -> Result<Self> {
        Self::new(FetchConfig {
            timeout_seconds,
            ..config
        })
    }

    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.send_with_retry(url, |client| client.get(url)).await?;
        self.check_size(url, &response)?;
        Ok(response.text().await?)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        let response = self
            .send_with_retry(url, |client| client.get(url).query(query))
            .await?;
        self.check_size(url, &response)?;
        Ok(response.json::<T>().await?)
    }

    /// Sends the request built by `build`, retrying transport errors and
    /// non-success statuses until `max_retries` is exhausted.
    pub async fn send_with_retry<F>(&self, url: &str, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        self.apply_rate_limit(url).await?;

        let delay = self.config.retry_delay_seconds.max(1);
        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(delay),
            initial_interval: Duration::from_secs(delay),
            max_interval: Duration::from_secs(delay * 32),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(delay * 60)),
            ..Default::default()
        };

        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match build(&self.client).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    last_error = Some(DigestError::General(format!(
                        "HTTP {}: {}",
                        status.as_u16(),
                        status.canonical_reason().unwrap_or("Unknown")
                    )));
                    // Client errors other than throttling will not improve on retry.
                    if status.is_client_error() && status != reqwest::StatusCode::TOO_MANY_REQUESTS {
                        break;
                    }
                }
                Err(e) => last_error = Some(DigestError::Http(e)),
            }

            if attempt < self.config.max_retries {
                if let Some(wait) = backoff.next_backoff() {
                    warn!("Attempt {} failed for {}, retrying in {:?}", attempt + 1, url, wait);
                    tokio::time::sleep(wait).await;
                    continue;
                }
            }
            break;
        }

        let err = last_error.unwrap_or_else(|| DigestError::General("Unknown error".to_string()));
        error!("Request to {} failed: {}", url, err);
        Err(err)
    }

    fn check_size(&self, url: &str, response: &Response) -> Result<()> {
        if let Some(content_length) = response.content_length() {
            let size_mb = content_length as usize / (1024 * 1024);
            if size_mb > self.config.max_body_size_mb {
                return Err(DigestError::General(format!("Response from {} too large: {}MB", url, size_mb)));
            }
        }
        Ok(())
    }

    async fn apply_rate_limit(&self, url: &str) -> Result<()> {
        let parsed_url = Url::parse(url)?;
        let host = parsed_url.host_str().unwrap_or("").to_string();
        let min_interval = Duration::from_millis(self.config.politeness_millis);

        // Reserve the next slot for this host, then sleep outside the lock.
        let wait = {
            let mut rate_limiter = self.rate_limiter.write().await;
            let now = Instant::now();
            let slot = match rate_limiter.get(&host) {
                Some(last) if now.duration_since(*last) < min_interval => *last + min_interval,
                _ => now,
            };
            rate_limiter.insert(host.clone(), slot);
            slot.saturating_duration_since(now)
        };

        if !wait.is_zero() {
            debug!("Rate limiting {}: waiting {:?}", host, wait);
            tokio::time::sleep(wait).await;
        }
        Ok(())
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String> {
        debug!("Fetching page: {}", url);
        self.get_text(url).await
    }
}
