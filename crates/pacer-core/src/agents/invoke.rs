//! Timed, cancellable agent invocation

use super::{Agent, InvocationContext};
use crate::error::{Error, Result};
use crate::types::{AgentResult, DiagnosticKind, Request};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Invoke an agent under a timeout
///
/// Running out of time is not an error: it yields an empty partial result
/// with a timeout diagnostic. The returned result is stamped with
/// `agent_id` and the measured duration.
pub async fn invoke(
    agent: &dyn Agent,
    agent_id: &str,
    request: &Request,
    cx: &InvocationContext,
    timeout: Duration,
) -> Result<AgentResult> {
    let started = Instant::now();

    let outcome = tokio::select! {
        biased;
        _ = cx.cancel_token().cancelled() => return Err(Error::Cancelled),
        outcome = tokio::time::timeout(timeout, agent.handle(request, cx)) => outcome,
    };

    match outcome {
        Ok(Ok(mut result)) => {
            result.agent_id = agent_id.to_string();
            result.duration_ms = started.elapsed().as_millis() as u64;
            debug!(
                agent_id = %agent_id,
                status = ?result.status,
                duration_ms = result.duration_ms,
                "Agent finished"
            );
            Ok(result)
        }
        Ok(Err(e)) => {
            warn!(agent_id = %agent_id, error = %e, "Agent failed");
            Err(e)
        }
        Err(_) => {
            warn!(agent_id = %agent_id, timeout_ms = timeout.as_millis() as u64, "Agent timed out");
            Ok(AgentResult::timed_out(agent_id, timeout))
        }
    }
}

/// Like [`invoke`], folding errors into a failure result
pub async fn invoke_or_failure(
    agent: &dyn Agent,
    agent_id: &str,
    request: &Request,
    cx: &InvocationContext,
    timeout: Duration,
) -> AgentResult {
    match invoke(agent, agent_id, request, cx, timeout).await {
        Ok(result) => result,
        Err(Error::Cancelled) => {
            let mut result = AgentResult::failure(agent_id, "cancelled");
            result.diagnostics[0].kind = DiagnosticKind::Cancelled;
            result
        }
        Err(e) => AgentResult::failure(agent_id, e.to_string()),
    }
}
