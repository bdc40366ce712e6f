//! Persona agent backed by a model provider
//!
//! The agent prompts its provider with its persona instructions, the
//! user's profile facts, prior turns, results of agents that already ran,
//! and the request input. JSON answers may carry `confidence` and
//! `terminal` fields, which are lifted into the [`AgentResult`].
//!
//! When invoked as a team lead with delegation rights, a JSON answer of
//! the form `{"delegate": [{"agent": "...", "input": "..."}]}` triggers the
//! delegated calls, after which the lead is prompted again with their
//! results to produce the final answer.

use super::{Agent, InvocationContext};
use crate::error::{Error, Result};
use crate::types::{AgentResult, Request, RequestInput};
use pacer_llm::{CompletionRequest, Constraints, GuardedProvider, Message};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Shape of the agent's answer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Free text
    #[default]
    Text,
    /// JSON object
    Json,
}

/// Upper bound on delegations a lead may request in one answer
const MAX_DELEGATIONS_PER_ANSWER: usize = 8;

/// Persona agent
pub struct LlmAgent {
    id: String,
    prompt: String,
    provider: Arc<GuardedProvider>,
    output: OutputFormat,
    constraints: Constraints,
}

impl LlmAgent {
    /// Create a persona agent
    #[must_use]
    pub fn new(id: impl Into<String>, prompt: impl Into<String>, provider: Arc<GuardedProvider>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            provider,
            output: OutputFormat::default(),
            constraints: Constraints::default(),
        }
    }

    /// Set the output format
    #[must_use]
    pub fn with_output(mut self, output: OutputFormat) -> Self {
        self.output = output;
        self
    }

    /// Set call constraints (model override, token limit, temperature)
    #[must_use]
    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }

    fn system_prompt(&self, request: &Request, cx: &InvocationContext, json: bool) -> String {
        let mut system = self.prompt.clone();

        if !request.context.profile.is_empty() {
            system.push_str("\n\nKnown facts about the user:\n");
            system.push_str(&Value::Object(request.context.profile.clone()).to_string());
        }

        let delegates = cx.delegates();
        if !delegates.is_empty() {
            system.push_str("\n\nYou lead a team. You may hand parts of the request to:\n");
            for d in delegates {
                let capabilities: Vec<_> = d.capabilities.iter().map(|c| c.as_str()).collect();
                system.push_str(&format!("- {} ({}): {}\n", d.id, d.name, capabilities.join(", ")));
            }
            system.push_str(
                "To delegate, answer only with {\"delegate\": [{\"agent\": \"<id>\", \"input\": \"<sub-request>\"}]}.",
            );
        }

        if json {
            system.push_str("\n\nRespond with a single JSON object. Include a \"confidence\" field between 0 and 1.");
        }
        system
    }

    fn build(&self, request: &Request, cx: &InvocationContext, extra: Vec<Message>) -> CompletionRequest {
        let json = self.output == OutputFormat::Json || !cx.delegates().is_empty();

        let prior = request.context.prior_results.iter().filter(|r| r.contributes()).map(|r| {
            Message::assistant(format!("[{}] {}", r.agent_id, render(&r.payload)))
        });

        let completion = CompletionRequest::new()
            .with_system(self.system_prompt(request, cx, json))
            .with_messages(request.context.turns.iter().cloned())
            .with_messages(prior)
            .with_message(Message::user(request.input.as_text()))
            .with_messages(extra)
            .with_constraints(self.constraints.clone());

        if json {
            completion.expect_json()
        } else {
            completion
        }
    }

    async fn ask(&self, request: &Request, cx: &InvocationContext, extra: Vec<Message>) -> Result<Value> {
        let completion = self.build(request, cx, extra);
        let response = self
            .provider
            .invoke_cancellable(completion, cx.cancel_token())
            .await?;
        Ok(response.content.into_value())
    }

    async fn run_delegations(
        &self,
        request: &Request,
        cx: &InvocationContext,
        plan: &[Value],
    ) -> Result<Vec<Message>> {
        let mut notes = Vec::with_capacity(plan.len());
        for entry in plan.iter().take(MAX_DELEGATIONS_PER_ANSWER) {
            let agent_id = entry
                .get("agent")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::AgentInvocationFailure {
                    agent_id: self.id.clone(),
                    message: "delegation entry without an agent id".to_string(),
                })?;

            let mut sub_request = request.clone();
            sub_request.agent_hint = Some(agent_id.to_string());
            if let Some(input) = entry.get("input").and_then(Value::as_str) {
                sub_request.input = RequestInput::Text(input.to_string());
            }

            let result = cx.delegate(agent_id, &sub_request).await?;
            notes.push(Message::user(format!(
                "Result from {} ({:?}): {}",
                agent_id,
                result.status,
                render(&result.payload)
            )));
        }
        notes.push(Message::user(
            "Combine these results into your final answer. Do not delegate again.",
        ));
        Ok(notes)
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Lift `confidence` and `terminal` out of a JSON answer
fn into_result(agent_id: &str, payload: Value) -> AgentResult {
    let mut fields = match payload {
        Value::Object(fields) => fields,
        other => return AgentResult::success(agent_id, other),
    };

    let confidence = fields.remove("confidence").and_then(|v| v.as_f64());
    let terminal = fields
        .remove("terminal")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let mut result = AgentResult::success(agent_id, Value::Object(fields));
    if let Some(confidence) = confidence {
        result = result.with_confidence(confidence);
    }
    if terminal {
        result = result.terminal();
    }
    result
}

fn delegation_plan(payload: &Value) -> Option<&Vec<Value>> {
    payload
        .as_object()
        .and_then(|fields: &Map<String, Value>| fields.get("delegate"))
        .and_then(Value::as_array)
}

#[async_trait::async_trait]
impl Agent for LlmAgent {
    #[instrument(skip(self, request, cx), fields(agent_id = %self.id, depth = cx.depth()))]
    async fn handle(&self, request: &Request, cx: &InvocationContext) -> Result<AgentResult> {
        let mut payload = self.ask(request, cx, Vec::new()).await?;

        if !cx.delegates().is_empty() {
            if let Some(plan) = delegation_plan(&payload).cloned() {
                debug!(agent_id = %self.id, delegations = plan.len(), "Lead requested delegation");
                let notes = self.run_delegations(request, cx, &plan).await?;
                payload = self.ask(request, cx, notes).await?;
            }
        }

        Ok(into_result(&self.id, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::Delegation;
    use crate::registry::AgentRegistry;
    use crate::types::{AgentDescriptor, AgentStatus};
    use pacer_llm::{MockProvider, ProviderPolicy, ResponseFormat};
    use serde_json::json;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn guarded(mock: Arc<MockProvider>) -> Arc<GuardedProvider> {
        Arc::new(GuardedProvider::new(mock, ProviderPolicy::default()))
    }

    fn cx() -> InvocationContext {
        InvocationContext::new(CancellationToken::new())
    }

    #[tokio::test]
    async fn test_text_answer() {
        let mock = Arc::new(MockProvider::new("mock"));
        mock.push_text("Take an easy 30 minute jog.");
        let agent = LlmAgent::new("training-planner", "You plan training.", guarded(mock.clone()));

        let request = Request::text("s", "what should I run today?")
            .with_profile_fact("goal", json!("5k"))
            .with_prior_result(AgentResult::success("recovery", json!("well rested")));

        let result = agent.handle(&request, &cx()).await.unwrap();
        assert_eq!(result.payload, json!("Take an easy 30 minute jog."));

        let sent = mock.last_request().unwrap();
        let system = sent.system.clone().unwrap();
        assert!(system.contains("You plan training."));
        assert!(system.contains("\"goal\":\"5k\""));
        assert_eq!(sent.messages[0].content, "[recovery] well rested");
        assert_eq!(sent.last_user_message(), Some("what should I run today?"));
        assert_eq!(sent.constraints.response_format, ResponseFormat::Text);
    }

    #[tokio::test]
    async fn test_json_answer_lifts_metadata() {
        let mock = Arc::new(MockProvider::new("mock"));
        mock.push_json(json!({"age": 34, "goal": "5k", "confidence": 0.7, "terminal": true}));
        let agent = LlmAgent::new("onboarding", "Collect the profile.", guarded(mock.clone()))
            .with_output(OutputFormat::Json);

        let result = agent.handle(&Request::text("s", "I'm 34"), &cx()).await.unwrap();
        assert_eq!(result.payload, json!({"age": 34, "goal": "5k"}));
        assert_eq!(result.confidence, 0.7);
        assert!(result.terminal);
        assert_eq!(
            mock.last_request().unwrap().constraints.response_format,
            ResponseFormat::Json
        );
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let mock = Arc::new(MockProvider::new("mock"));
        mock.push(Err(pacer_llm::Error::Rejected {
            provider: "mock".to_string(),
            message: "nope".to_string(),
        }));
        let agent = LlmAgent::new("coach", "Coach.", guarded(mock));

        let err = agent.handle(&Request::text("s", "hi"), &cx()).await.unwrap_err();
        assert!(matches!(err, Error::Provider(pacer_llm::Error::Rejected { .. })));
    }

    #[tokio::test]
    async fn test_lead_delegates_then_synthesizes() {
        let nutrition_mock = Arc::new(MockProvider::new("nutrition"));
        nutrition_mock.push_text("Eat oats before long runs.");

        let mut registry = AgentRegistry::new();
        registry
            .register(
                AgentDescriptor::new("nutrition", "Nutrition").with_capability("nutrition-guidance"),
                Arc::new(LlmAgent::new("nutrition", "Nutrition.", guarded(nutrition_mock.clone()))),
            )
            .unwrap();
        let registry = Arc::new(registry);

        let lead_mock = Arc::new(MockProvider::new("lead"));
        lead_mock.push_json(json!({"delegate": [{"agent": "nutrition", "input": "breakfast?"}]}));
        lead_mock.push_json(json!({"answer": "Oats, then run.", "confidence": 0.9}));
        let lead = LlmAgent::new("coach", "Head coach.", guarded(lead_mock.clone()));

        let delegation = Arc::new(Delegation::new(
            registry.clone(),
            registry.descriptors().into_iter().cloned().collect(),
            2,
            Duration::from_secs(5),
        ));
        let cx = InvocationContext::with_delegation(CancellationToken::new(), delegation.clone());

        let result = lead.handle(&Request::text("s", "plan my morning"), &cx).await.unwrap();
        assert_eq!(result.payload, json!({"answer": "Oats, then run."}));
        assert_eq!(result.status, AgentStatus::Success);
        assert_eq!(lead_mock.invocations(), 2);
        assert_eq!(nutrition_mock.invocations(), 1);
        assert_eq!(
            nutrition_mock.last_request().unwrap().last_user_message(),
            Some("breakfast?")
        );

        let recorded = delegation.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].agent_id, "nutrition");
    }
}
