//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use pacer_core::{
    Agent, AgentDescriptor, AgentRegistry, AgentResult, Error, InvocationContext, Request, Result,
};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Agent answering with a fixed payload, optionally slow or flaky
pub struct ScriptedAgent {
    id: String,
    payload: Value,
    confidence: f64,
    terminal: bool,
    delay: Duration,
    failures_left: AtomicUsize,
    calls: AtomicUsize,
    seen: Mutex<Vec<Request>>,
}

impl ScriptedAgent {
    pub fn new(id: &str, payload: Value) -> Self {
        Self {
            id: id.to_string(),
            payload,
            confidence: 1.0,
            terminal: false,
            delay: Duration::ZERO,
            failures_left: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the first `n` calls with a transient error
    pub fn failing_first(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<Request> {
        self.seen.lock().unwrap().clone()
    }

    pub fn descriptor(&self, capability: &str, priority: u32) -> AgentDescriptor {
        AgentDescriptor::new(&self.id, &self.id)
            .with_capability(capability)
            .with_priority(priority)
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn handle(&self, request: &Request, _cx: &InvocationContext) -> Result<AgentResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let flaky = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if flaky {
            return Err(Error::Internal(format!("{} is temporarily unavailable", self.id)));
        }
        let mut result =
            AgentResult::success(&self.id, self.payload.clone()).with_confidence(self.confidence);
        if self.terminal {
            result = result.terminal();
        }
        Ok(result)
    }
}

/// Register `agent` under one capability and hand it back for inspection
pub fn register(
    registry: &mut AgentRegistry,
    agent: ScriptedAgent,
    capability: &str,
    priority: u32,
) -> Arc<ScriptedAgent> {
    let agent = Arc::new(agent);
    registry
        .register(agent.descriptor(capability, priority), agent.clone())
        .unwrap();
    agent
}

/// Poll until `check` holds or two seconds pass
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
