//! Scripted in-process provider
//!
//! Answers from a queue of prepared results and falls back to echoing the
//! last user message. Used for offline runs and tests.

use crate::completion::{CompletionRequest, CompletionResponse, ResponseFormat};
use crate::error::Result;
use crate::provider::{ModelProvider, ModelTier};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Default model name reported by the mock provider
pub const DEFAULT_MODEL: &str = "mock-1";

/// Provider answering from a scripted queue
pub struct MockProvider {
    name: String,
    model: String,
    tier: ModelTier,
    delay: Option<Duration>,
    script: Mutex<VecDeque<Result<CompletionResponse>>>,
    last_request: Mutex<Option<CompletionRequest>>,
    invocations: AtomicU32,
}

impl MockProvider {
    /// Create an empty mock provider
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: DEFAULT_MODEL.to_string(),
            tier: ModelTier::default(),
            delay: None,
            script: Mutex::new(VecDeque::new()),
            last_request: Mutex::new(None),
            invocations: AtomicU32::new(0),
        }
    }

    /// Set the reported model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the tier
    #[must_use]
    pub fn with_tier(mut self, tier: ModelTier) -> Self {
        self.tier = tier;
        self
    }

    /// Sleep before answering each call
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a prepared result
    pub fn push(&self, result: Result<CompletionResponse>) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(result);
    }

    /// Queue a text answer
    pub fn push_text(&self, text: impl Into<String>) {
        let response = CompletionResponse::text(self.model.clone(), text);
        self.push(Ok(response));
    }

    /// Queue a structured answer
    pub fn push_json(&self, value: serde_json::Value) {
        let response = CompletionResponse::structured(self.model.clone(), value);
        self.push(Ok(response));
    }

    /// Number of calls received so far
    #[must_use]
    pub fn invocations(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }

    /// The most recent request received
    #[must_use]
    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.last_request
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn echo(&self, request: &CompletionRequest) -> CompletionResponse {
        let text = request.last_user_message().unwrap_or_default().to_string();
        match request.constraints.response_format {
            ResponseFormat::Text => CompletionResponse::text(self.model.clone(), text),
            ResponseFormat::Json => CompletionResponse::structured(
                self.model.clone(),
                serde_json::json!({ "response": text }),
            ),
        }
    }
}

#[async_trait::async_trait]
impl ModelProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn tier(&self) -> ModelTier {
        self.tier
    }

    async fn invoke(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let call = self.invocations.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(provider = %self.name, call = call, "Mock provider invoked");

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        *self.last_request.lock().unwrap_or_else(|e| e.into_inner()) = Some(request.clone());

        let scripted = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match scripted {
            Some(result) => result,
            None => Ok(self.echo(&request)),
        }
    }
}
