//! Sequential hand-off

use super::TeamConfig;
use crate::agents::{invoke_or_failure, InvocationContext};
use crate::error::{Error, Result};
use crate::registry::AgentRegistry;
use crate::types::{AgentResult, Diagnostic, DiagnosticKind, Request, TeamResponse};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Run members in declared order, each seeing the results before it
///
/// Stops early after a terminal result. Failed members are recorded and
/// skipped. The final payload is the last successful one.
pub(super) async fn run(
    registry: &AgentRegistry,
    team: &TeamConfig,
    request: &Request,
    cancel: &CancellationToken,
) -> Result<TeamResponse> {
    let deadline = Instant::now() + team.team_timeout;
    let mut current = request.clone();
    let mut results: Vec<AgentResult> = Vec::with_capacity(team.members.len());
    let mut diagnostics: Vec<Diagnostic> = Vec::new();
    let mut deadline_hit = false;

    for agent_id in &team.members {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            deadline_hit = true;
            diagnostics.push(Diagnostic::new(
                agent_id.clone(),
                DiagnosticKind::Timeout,
                "skipped: team deadline reached",
            ));
            break;
        }

        let agent = registry
            .agent(agent_id)
            .ok_or_else(|| Error::UnknownAgent(agent_id.clone()))?;
        let cx = InvocationContext::new(cancel.child_token());
        let timeout = team.per_agent_timeout.min(remaining);

        let result = invoke_or_failure(agent.as_ref(), agent_id, &current, &cx, timeout).await;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        diagnostics.extend(result.diagnostics.iter().cloned());

        let terminal = result.terminal && result.contributes();
        if result.contributes() {
            current = current.with_prior_result(result.clone());
        }
        results.push(result);

        if terminal {
            debug!(team = %team.name, agent_id = %agent_id, "Terminal result, stopping hand-off");
            break;
        }
    }

    let Some(last) = results.iter().rev().find(|r| r.contributes()) else {
        if deadline_hit {
            return Err(Error::TeamAggregationTimeout {
                team: team.name.clone(),
                timeout_ms: team.team_timeout.as_millis() as u64,
            });
        }
        return Err(Error::AggregateFailure {
            diagnostics: diagnostics.iter().map(ToString::to_string).collect(),
        });
    };

    let payload = last.payload.clone();
    let contributors = results
        .iter()
        .filter(|r| r.contributes())
        .map(|r| r.agent_id.clone())
        .collect();

    Ok(TeamResponse {
        results,
        payload,
        contributors,
        diagnostics,
        team: Some(team.name.clone()),
    })
}
