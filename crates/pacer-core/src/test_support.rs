//! Scripted agents for unit tests

use crate::agents::{Agent, InvocationContext};
use crate::error::{Error, Result};
use crate::registry::AgentRegistry;
use crate::types::{AgentDescriptor, AgentResult, Request};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Agent answering with a fixed payload after an optional delay
pub(crate) struct ScriptedAgent {
    payload: Value,
    confidence: f64,
    terminal: bool,
    delay: Duration,
    fail: bool,
    calls: Arc<AtomicUsize>,
    seen: Mutex<Vec<Request>>,
}

impl ScriptedAgent {
    pub(crate) fn new(payload: Value) -> Self {
        Self {
            payload,
            confidence: 1.0,
            terminal: false,
            delay: Duration::ZERO,
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing() -> Self {
        let mut agent = Self::new(Value::Null);
        agent.fail = true;
        agent
    }

    pub(crate) fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub(crate) fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Count invocations in an existing counter
    pub(crate) fn sharing_calls(mut self, calls: Arc<AtomicUsize>) -> Self {
        self.calls = calls;
        self
    }

    pub(crate) fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    pub(crate) fn seen(&self) -> Vec<Request> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Agent for ScriptedAgent {
    async fn handle(&self, request: &Request, _cx: &InvocationContext) -> Result<AgentResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(Error::Internal("scripted failure".to_string()));
        }
        let mut result = AgentResult::success("scripted", self.payload.clone())
            .with_confidence(self.confidence);
        if self.terminal {
            result = result.terminal();
        }
        Ok(result)
    }
}

pub(crate) fn descriptor(id: &str, priority: u32, capabilities: &[&str]) -> AgentDescriptor {
    capabilities.iter().fold(
        AgentDescriptor::new(id, id).with_priority(priority),
        |d, c| d.with_capability(*c),
    )
}

/// Register `agent` and hand back its invocation counter
pub(crate) fn register(
    registry: &mut AgentRegistry,
    descriptor: AgentDescriptor,
    agent: ScriptedAgent,
) -> Arc<AtomicUsize> {
    let calls = agent.calls();
    registry.register(descriptor, Arc::new(agent)).unwrap();
    calls
}
