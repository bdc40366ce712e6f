//! Hierarchical delegation through a lead agent

use super::TeamConfig;
use crate::agents::{invoke, Delegation, InvocationContext};
use crate::error::{Error, Result};
use crate::registry::AgentRegistry;
use crate::types::{AgentResult, Diagnostic, DiagnosticKind, Request, TeamResponse};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Hand the request to the lead, which may delegate to the other members
pub(super) async fn run(
    registry: &Arc<AgentRegistry>,
    team: &TeamConfig,
    lead: &str,
    request: &Request,
    cancel: &CancellationToken,
) -> Result<TeamResponse> {
    let agent = registry
        .agent(lead)
        .ok_or_else(|| Error::UnknownAgent(lead.to_string()))?;

    let candidates = registry
        .order_by_priority(&team.members)
        .into_iter()
        .filter(|d| d.id != lead)
        .cloned()
        .collect();
    let delegation = Arc::new(Delegation::new(
        registry.clone(),
        candidates,
        team.max_delegation_depth,
        team.per_agent_timeout,
    ));
    let cx = InvocationContext::with_delegation(cancel.child_token(), delegation.clone());

    let lead_result = match invoke(agent.as_ref(), lead, request, &cx, team.team_timeout).await {
        Ok(result) => result,
        Err(Error::Cancelled) => return Err(Error::Cancelled),
        Err(e) => AgentResult::failure(lead, e.to_string()),
    };

    let delegated = delegation.recorded();
    debug!(
        team = %team.name,
        lead = %lead,
        delegated = delegated.len(),
        "Lead finished"
    );

    let diagnostics: Vec<Diagnostic> = std::iter::once(&lead_result)
        .chain(delegated.iter())
        .flat_map(|r| r.diagnostics.iter().cloned())
        .collect();

    if !lead_result.contributes() {
        let timed_out = lead_result
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::Timeout);
        if timed_out {
            return Err(Error::TeamAggregationTimeout {
                team: team.name.clone(),
                timeout_ms: team.team_timeout.as_millis() as u64,
            });
        }
        return Err(Error::AggregateFailure {
            diagnostics: diagnostics.iter().map(ToString::to_string).collect(),
        });
    }

    let mut contributors = vec![lead.to_string()];
    for result in delegated.iter().filter(|r| r.contributes()) {
        if !contributors.contains(&result.agent_id) {
            contributors.push(result.agent_id.clone());
        }
    }

    let payload = lead_result.payload.clone();
    let mut results = vec![lead_result];
    results.extend(delegated);

    Ok(TeamResponse {
        results,
        payload,
        contributors,
        diagnostics,
        team: Some(team.name.clone()),
    })
}
