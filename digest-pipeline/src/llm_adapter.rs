use crate::config::{AiProvider, ModelConfig};
use crate::fetcher::HttpFetcher;
use crate::types::{DigestError, FetchConfig, ModelIdentity, Result};
use async_trait::async_trait;
use interfaces::defs::CompletionModel;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// Anthropic Messages API client.
pub struct AnthropicClient {
    http: Arc<HttpFetcher>,
    api_key: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(http: Arc<HttpFetcher>, api_key: String, model: String) -> Self {
        Self { http, api_key, model }
    }
}

#[async_trait]
impl CompletionModel for AnthropicClient {
    fn identify(&self) -> ModelIdentity {
        ModelIdentity::new("Anthropic", &self.model)
    }

    async fn complete_text(&self, system: &str, prompt: &str, max_tokens: u32) -> anyhow::Result<String> {
        let body = AnthropicRequest {
            model: &self.model,
            max_tokens,
            system,
            messages: vec![ChatMessage { role: "user", content: prompt }],
        };

        let response = self
            .http
            .send_with_retry(ANTHROPIC_URL, |client| {
                client
                    .post(ANTHROPIC_URL)
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json(&body)
            })
            .await?;
        let parsed: AnthropicResponse = response.json().await.map_err(DigestError::from)?;

        let text: String = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");
        debug!("Anthropic returned {} chars", text.len());
        non_empty("Anthropic", text)
    }
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

/// OpenAI Chat Completions client.
pub struct OpenAiClient {
    http: Arc<HttpFetcher>,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(http: Arc<HttpFetcher>, api_key: String, model: String) -> Self {
        Self { http, api_key, model }
    }
}

#[async_trait]
impl CompletionModel for OpenAiClient {
    fn identify(&self) -> ModelIdentity {
        ModelIdentity::new("OpenAI", &self.model)
    }

    async fn complete_text(&self, system: &str, prompt: &str, max_tokens: u32) -> anyhow::Result<String> {
        let body = OpenAiRequest {
            model: &self.model,
            max_tokens,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: prompt },
            ],
        };

        let response = self
            .http
            .send_with_retry(OPENAI_URL, |client| client.post(OPENAI_URL).bearer_auth(&self.api_key).json(&body))
            .await?;
        let parsed: OpenAiResponse = response.json().await.map_err(DigestError::from)?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        debug!("OpenAI returned {} chars", text.len());
        non_empty("OpenAI", text)
    }
}

fn non_empty(provider: &str, text: String) -> anyhow::Result<String> {
    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(DigestError::Model {
            provider: provider.to_string(),
            message: "empty completion".to_string(),
        }
        .into());
    }
    Ok(text)
}

/// Picks the completion client named by the configuration.
/// A provider without an API key is a configuration error.
pub fn build_model(config: &ModelConfig, fetch: &FetchConfig) -> Result<Arc<dyn CompletionModel>> {
    // Completions are slow; give them more headroom than page fetches.
    let http = Arc::new(HttpFetcher::with_timeout(fetch.clone(), fetch.timeout_seconds.max(120))?);

    let model: Arc<dyn CompletionModel> = match config.provider {
        AiProvider::Anthropic => {
            let key = config
                .anthropic_api_key
                .clone()
                .ok_or_else(|| DigestError::Config("ANTHROPIC_API_KEY is required for the Anthropic provider".to_string()))?;
            Arc::new(AnthropicClient::new(http, key, config.anthropic_model.clone()))
        }
        AiProvider::OpenAi => {
            let key = config
                .openai_api_key
                .clone()
                .ok_or_else(|| DigestError::Config("OPENAI_API_KEY is required for the OpenAI provider".to_string()))?;
            Arc::new(OpenAiClient::new(http, key, config.openai_model.clone()))
        }
    };

    let identity = model.identify();
    info!("Using completion model {} / {}", identity.provider, identity.model);
    Ok(model)
}
