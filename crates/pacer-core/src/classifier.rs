//! Intent classification
//!
//! Maps a request to the capabilities it needs. The coordinator only calls
//! the classifier when the request carries no explicit hint.

use crate::error::{Error, Result};
use crate::types::{Capability, Request};
use pacer_llm::{CompletionRequest, GuardedProvider, Message};
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Swappable intent classifier
#[async_trait::async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Capabilities the request needs, most relevant first
    ///
    /// Only capabilities in `known` are returned. An empty result means the
    /// request could not be classified.
    async fn classify(
        &self,
        request: &Request,
        known: &[Capability],
        cancel: &CancellationToken,
    ) -> Vec<Capability>;
}

struct KeywordRule {
    capability: Capability,
    pattern: Regex,
}

/// Classifier matching whole-word keywords, case-insensitively
#[derive(Default)]
pub struct KeywordClassifier {
    rules: Vec<KeywordRule>,
}

impl KeywordClassifier {
    /// Create an empty classifier
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from (capability, keywords) pairs; earlier pairs rank first
    pub fn from_rules<I, K>(rules: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Capability, K)>,
        K: IntoIterator,
        K::Item: AsRef<str>,
    {
        let mut classifier = Self::new();
        for (capability, keywords) in rules {
            classifier.add_rule(capability, keywords)?;
        }
        Ok(classifier)
    }

    /// Route requests mentioning any of `keywords` to `capability`
    pub fn add_rule<K>(&mut self, capability: Capability, keywords: K) -> Result<()>
    where
        K: IntoIterator,
        K::Item: AsRef<str>,
    {
        let alternatives: Vec<String> = keywords
            .into_iter()
            .map(|k| regex::escape(k.as_ref().trim()))
            .filter(|k| !k.is_empty())
            .collect();
        if alternatives.is_empty() {
            return Ok(());
        }

        let pattern = Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|"))).map_err(|e| {
            Error::invalid_config(format!("keywords.{capability}"), e.to_string())
        })?;
        self.rules.push(KeywordRule {
            capability,
            pattern,
        });
        Ok(())
    }

    /// Synchronous classification
    #[must_use]
    pub fn matches(&self, text: &str, known: &[Capability]) -> Vec<Capability> {
        let mut found: Vec<Capability> = Vec::new();
        for rule in &self.rules {
            if rule.pattern.is_match(text)
                && known.contains(&rule.capability)
                && !found.contains(&rule.capability)
            {
                found.push(rule.capability.clone());
            }
        }
        found
    }
}

#[async_trait::async_trait]
impl IntentClassifier for KeywordClassifier {
    async fn classify(
        &self,
        request: &Request,
        known: &[Capability],
        _cancel: &CancellationToken,
    ) -> Vec<Capability> {
        let found = self.matches(&request.input.as_text(), known);
        debug!(session_id = %request.session_id, capabilities = ?found, "Keyword classification");
        found
    }
}

const CLASSIFIER_PROMPT: &str = "You route requests for a running coach. \
Pick the capabilities needed to answer the user's message from the list below. \
Answer with a JSON object {\"capabilities\": [...]} ordered by relevance, \
or an empty list if none apply.";

/// Classifier asking a model provider, with keyword fallback
pub struct LlmClassifier {
    provider: Arc<GuardedProvider>,
    fallback: KeywordClassifier,
}

impl LlmClassifier {
    /// Create a classifier using `provider`
    #[must_use]
    pub fn new(provider: Arc<GuardedProvider>, fallback: KeywordClassifier) -> Self {
        Self { provider, fallback }
    }

    async fn ask(
        &self,
        request: &Request,
        known: &[Capability],
        cancel: &CancellationToken,
    ) -> Result<Vec<Capability>> {
        let listing: Vec<&str> = known.iter().map(Capability::as_str).collect();
        let completion = CompletionRequest::new()
            .with_system(format!("{CLASSIFIER_PROMPT}\n\nCapabilities: {}", listing.join(", ")))
            .with_message(Message::user(request.input.as_text()))
            .expect_json();

        let response = self.provider.invoke_cancellable(completion, cancel).await?;
        Ok(parse_capabilities(&response.content.into_value(), known))
    }
}

/// Read a capability list from `{"capabilities": [...]}` or a bare array
fn parse_capabilities(value: &Value, known: &[Capability]) -> Vec<Capability> {
    let list = match value {
        Value::Array(items) => Some(items),
        Value::Object(fields) => fields.get("capabilities").and_then(Value::as_array),
        _ => None,
    };

    let mut found: Vec<Capability> = Vec::new();
    for tag in list.into_iter().flatten().filter_map(Value::as_str) {
        let capability = Capability::from(tag.trim());
        if known.contains(&capability) && !found.contains(&capability) {
            found.push(capability);
        }
    }
    found
}

#[async_trait::async_trait]
impl IntentClassifier for LlmClassifier {
    async fn classify(
        &self,
        request: &Request,
        known: &[Capability],
        cancel: &CancellationToken,
    ) -> Vec<Capability> {
        match self.ask(request, known, cancel).await {
            Ok(found) if !found.is_empty() => {
                debug!(session_id = %request.session_id, capabilities = ?found, "Model classification");
                found
            }
            Ok(_) => self.fallback.classify(request, known, cancel).await,
            Err(e) => {
                warn!(error = %e, "Model classification failed, using keywords");
                self.fallback.classify(request, known, cancel).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacer_llm::{MockProvider, ProviderPolicy, RetryConfig};
    use serde_json::json;

    fn known() -> Vec<Capability> {
        ["nutrition-guidance", "recovery", "training-planning"]
            .into_iter()
            .map(Capability::from)
            .collect()
    }

    fn keywords() -> KeywordClassifier {
        KeywordClassifier::from_rules([
            (Capability::from("training-planning"), vec!["plan", "workout", "interval"]),
            (Capability::from("nutrition-guidance"), vec!["eat", "meal", "carb"]),
            (Capability::from("recovery"), vec!["sore", "sleep", "rest day"]),
            (Capability::from("astrology"), vec!["stars"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_keyword_matching() {
        let classifier = keywords();
        assert_eq!(
            classifier.matches("What should I EAT before my workout?", &known()),
            vec![Capability::from("training-planning"), Capability::from("nutrition-guidance")]
        );
        // whole words only
        assert!(classifier.matches("planet earth", &known()).is_empty());
        assert_eq!(
            classifier.matches("Is today a rest day?", &known()),
            vec![Capability::from("recovery")]
        );
    }

    #[test]
    fn test_unknown_capabilities_filtered() {
        assert!(keywords().matches("what do the stars say", &known()).is_empty());
    }

    #[test]
    fn test_parse_capabilities() {
        let known = known();
        assert_eq!(
            parse_capabilities(&json!({"capabilities": ["recovery", "bogus", "recovery"]}), &known),
            vec![Capability::from("recovery")]
        );
        assert_eq!(
            parse_capabilities(&json!(["nutrition-guidance"]), &known),
            vec![Capability::from("nutrition-guidance")]
        );
        assert!(parse_capabilities(&json!("recovery"), &known).is_empty());
    }

    #[tokio::test]
    async fn test_llm_classifier_uses_model_answer() {
        let mock = Arc::new(MockProvider::new("router"));
        mock.push_json(json!({"capabilities": ["recovery"]}));
        let classifier = LlmClassifier::new(
            Arc::new(GuardedProvider::new(mock, ProviderPolicy::default())),
            keywords(),
        );

        let found = classifier
            .classify(&Request::text("s", "I feel wrecked"), &known(), &CancellationToken::new())
            .await;
        assert_eq!(found, vec![Capability::from("recovery")]);
    }

    #[tokio::test]
    async fn test_llm_classifier_falls_back_on_error() {
        let mock = Arc::new(MockProvider::new("router"));
        mock.push(Err(pacer_llm::Error::Rejected {
            provider: "router".to_string(),
            message: "quota".to_string(),
        }));
        let policy = ProviderPolicy::new().with_retry(RetryConfig::none());
        let classifier = LlmClassifier::new(Arc::new(GuardedProvider::new(mock, policy)), keywords());

        let found = classifier
            .classify(&Request::text("s", "best meal after a long run"), &known(), &CancellationToken::new())
            .await;
        assert_eq!(found, vec![Capability::from("nutrition-guidance")]);
    }
}
