//! Completion request and response types
//!
//! A request is a prompt/context (system instructions plus conversation
//! messages) together with call constraints. A response is either free text
//! or a structured JSON document.

use serde::{Deserialize, Serialize};

/// Role in a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message (instructions)
    System,
    /// User message
    User,
    /// Assistant message
    Assistant,
}

impl MessageRole {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: MessageRole,
    /// Message content
    pub content: String,
}

impl Message {
    /// Create a system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Expected shape of the response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Free text
    #[default]
    Text,
    /// A JSON object
    Json,
}

/// Constraints applied to a single call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Constraints {
    /// Model override (provider default when absent)
    #[serde(default)]
    pub model: Option<String>,
    /// Maximum tokens to generate
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Temperature (0.0 - 2.0)
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Expected response shape
    #[serde(default)]
    pub response_format: ResponseFormat,
}

/// Completion request
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// System instructions
    pub system: Option<String>,
    /// Messages in the conversation
    pub messages: Vec<Message>,
    /// Call constraints
    pub constraints: Constraints,
}

impl CompletionRequest {
    /// Create an empty request
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set system instructions
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Add a message
    #[must_use]
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Add messages
    #[must_use]
    pub fn with_messages(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.messages.extend(messages);
        self
    }

    /// Set constraints
    #[must_use]
    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Ask for a JSON object response
    #[must_use]
    pub fn expect_json(mut self) -> Self {
        self.constraints.response_format = ResponseFormat::Json;
        self
    }

    /// Content of the last user message, if any
    #[must_use]
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
    }
}

/// Token usage information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens
    pub prompt_tokens: u32,
    /// Completion tokens
    pub completion_tokens: u32,
    /// Total tokens
    pub total_tokens: u32,
}

/// Body of a completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CompletionContent {
    /// Free text answer
    Text(String),
    /// Structured answer
    Structured(serde_json::Value),
}

impl CompletionContent {
    /// Convert into a JSON value (text becomes a JSON string)
    #[must_use]
    pub fn into_value(self) -> serde_json::Value {
        match self {
            Self::Text(text) => serde_json::Value::String(text),
            Self::Structured(value) => value,
        }
    }

    /// Text view of the content
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Structured(value) => value.to_string(),
        }
    }
}

/// Completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated content
    pub content: CompletionContent,
    /// Token usage
    pub usage: Option<TokenUsage>,
    /// Finish reason
    pub finish_reason: Option<String>,
    /// Model used
    pub model: String,
}

impl CompletionResponse {
    /// Text response with no usage information
    #[must_use]
    pub fn text(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: CompletionContent::Text(content.into()),
            usage: None,
            finish_reason: Some("stop".to_string()),
            model: model.into(),
        }
    }

    /// Structured response with no usage information
    #[must_use]
    pub fn structured(model: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            content: CompletionContent::Structured(value),
            usage: None,
            finish_reason: Some("stop".to_string()),
            model: model.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_builder() {
        let request = CompletionRequest::new()
            .with_system("You are a coach")
            .with_message(Message::user("hello"))
            .with_message(Message::assistant("hi"))
            .with_message(Message::user("plan my week"))
            .expect_json();

        assert_eq!(request.system.as_deref(), Some("You are a coach"));
        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.last_user_message(), Some("plan my week"));
        assert_eq!(request.constraints.response_format, ResponseFormat::Json);
    }

    #[test]
    fn test_content_into_value() {
        let text = CompletionContent::Text("rest today".to_string());
        assert_eq!(text.into_value(), json!("rest today"));

        let structured = CompletionContent::Structured(json!({"plan_id": "p-1"}));
        assert_eq!(structured.as_text(), r#"{"plan_id":"p-1"}"#);
    }
}
