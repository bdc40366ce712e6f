//! OpenAI-compatible chat completion backend
//!
//! Talks to any endpoint speaking the `/chat/completions` protocol
//! (OpenAI, Groq, OpenRouter, local gateways).

use crate::completion::{
    CompletionContent, CompletionRequest, CompletionResponse, ResponseFormat, TokenUsage,
};
use crate::error::{Error, Result};
use crate::provider::{ModelProvider, ModelTier};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, instrument};

/// OpenAI API base URL
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Default model
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Configuration for an OpenAI-compatible backend
#[derive(Clone)]
pub struct OpenAiConfig {
    /// Provider name used in logs and errors
    pub name: String,
    /// API key
    pub api_key: String,
    /// Base URL
    pub base_url: String,
    /// Default model
    pub default_model: String,
    /// Tier of the default model
    pub tier: ModelTier,
}

// SECURITY: Custom Debug implementation to mask API key
impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("name", &self.name)
            .field("api_key", &mask_api_key(&self.api_key))
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("tier", &self.tier)
            .finish()
    }
}

/// Mask API key for safe display
fn mask_api_key(key: &str) -> String {
    if key.len() <= 8 {
        return "****".to_string();
    }
    format!("{}...{}", &key[..4], &key[key.len() - 4..])
}

impl OpenAiConfig {
    /// Create a configuration with an API key
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            name: "openai".to_string(),
            api_key: api_key.into(),
            base_url: OPENAI_API_BASE.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            tier: ModelTier::Standard,
        }
    }

    /// Read the API key from the named environment variable
    pub fn from_env(var: &str) -> Result<Self> {
        let api_key = std::env::var(var)
            .map_err(|_| Error::NotConfigured(format!("{var} not set")))?;
        Ok(Self::new(api_key))
    }

    /// Set the provider name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the default model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Set the tier
    #[must_use]
    pub fn with_tier(mut self, tier: ModelTier) -> Self {
        self.tier = tier;
        self
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
    model: String,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// OpenAI-compatible provider
pub struct OpenAiProvider {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    /// Create a new provider
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| Error::NotConfigured(format!("HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn build_body<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequest<'a> {
        let model = request
            .constraints
            .model
            .as_deref()
            .unwrap_or(&self.config.default_model);

        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.extend(request.messages.iter().map(|m| ChatMessage {
            role: m.role.as_str(),
            content: &m.content,
        }));

        let response_format = match request.constraints.response_format {
            ResponseFormat::Text => None,
            ResponseFormat::Json => Some(serde_json::json!({"type": "json_object"})),
        };

        ChatRequest {
            model,
            messages,
            max_tokens: request.constraints.max_tokens,
            temperature: request.constraints.temperature,
            response_format,
        }
    }
}

/// Map a non-success HTTP status to the provider error taxonomy
fn classify_status(provider: &str, status: u16, body: &str, retry_after: Option<u64>) -> Error {
    match status {
        429 => Error::RateLimited {
            provider: provider.to_string(),
            retry_after,
        },
        500..=599 => Error::ProviderUnavailable {
            provider: provider.to_string(),
            message: format!("HTTP {status}"),
        },
        _ => Error::Rejected {
            provider: provider.to_string(),
            message: format!("HTTP {status}: {}", truncate(body, 200)),
        },
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Turn the raw message text into content of the requested shape
fn parse_content(format: ResponseFormat, raw: String) -> Result<CompletionContent> {
    match format {
        ResponseFormat::Text => Ok(CompletionContent::Text(raw)),
        ResponseFormat::Json => serde_json::from_str(&raw)
            .map(CompletionContent::Structured)
            .map_err(|e| Error::InvalidResponse(format!("expected JSON content: {e}"))),
    }
}

#[async_trait::async_trait]
impl ModelProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    fn tier(&self) -> ModelTier {
        self.config.tier
    }

    #[instrument(skip(self, request), fields(provider = %self.config.name))]
    async fn invoke(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = self.build_body(&request);
        debug!(model = %body.model, messages = body.messages.len(), "Sending chat request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::ProviderUnavailable {
                provider: self.config.name.clone(),
                message: if e.is_timeout() {
                    "request timed out".to_string()
                } else {
                    "connection failed".to_string()
                },
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(
                &self.config.name,
                status.as_u16(),
                &text,
                retry_after,
            ));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;

        let choice = chat
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidResponse("No choices in response".to_string()))?;

        let content = parse_content(
            request.constraints.response_format,
            choice.message.content.unwrap_or_default(),
        )?;

        Ok(CompletionResponse {
            content,
            usage: chat.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            finish_reason: choice.finish_reason,
            model: chat.model,
        })
    }
}
