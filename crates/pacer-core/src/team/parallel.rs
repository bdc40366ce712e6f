//! Parallel fan-out with merge

use super::merge::merge;
use super::TeamConfig;
use crate::agents::{invoke_or_failure, InvocationContext};
use crate::error::{Error, Result};
use crate::registry::AgentRegistry;
use crate::types::{AgentResult, Diagnostic, DiagnosticKind, Request, TeamResponse};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Run every member concurrently until all finish or the team deadline passes
pub(super) async fn run(
    registry: &AgentRegistry,
    team: &TeamConfig,
    request: &Request,
    cancel: &CancellationToken,
) -> Result<TeamResponse> {
    let members = registry.order_by_priority(&team.members);
    let deadline = Instant::now() + team.team_timeout;
    let team_cancel = cancel.child_token();

    let mut pending = FuturesUnordered::new();
    for (slot, descriptor) in members.iter().enumerate() {
        let agent = registry
            .agent(&descriptor.id)
            .ok_or_else(|| Error::UnknownAgent(descriptor.id.clone()))?;
        let cx = InvocationContext::new(team_cancel.child_token());
        let agent_id = descriptor.id.as_str();
        pending.push(async move {
            let result =
                invoke_or_failure(agent.as_ref(), agent_id, request, &cx, team.per_agent_timeout)
                    .await;
            (slot, result)
        });
    }

    let mut slots: Vec<Option<AgentResult>> = vec![None; members.len()];
    let mut deadline_hit = false;
    let sleep = tokio::time::sleep_until(deadline);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                team_cancel.cancel();
                return Err(Error::Cancelled);
            }
            _ = &mut sleep => {
                deadline_hit = true;
                break;
            }
            next = pending.next() => match next {
                Some((slot, result)) => slots[slot] = Some(result),
                None => break,
            },
        }
    }
    drop(pending);
    team_cancel.cancel();

    let results: Vec<AgentResult> = slots
        .into_iter()
        .zip(&members)
        .map(|(slot, descriptor)| {
            slot.unwrap_or_else(|| {
                warn!(team = %team.name, agent_id = %descriptor.id, "No answer before team deadline");
                AgentResult::timed_out(descriptor.id.clone(), team.team_timeout)
            })
        })
        .collect();

    let contributing: Vec<&AgentResult> = results.iter().filter(|r| r.contributes()).collect();
    if contributing.is_empty() {
        let all_timed_out = results.iter().all(|r| {
            r.diagnostics
                .iter()
                .any(|d| d.kind == DiagnosticKind::Timeout)
        });
        if deadline_hit || all_timed_out {
            return Err(Error::TeamAggregationTimeout {
                team: team.name.clone(),
                timeout_ms: team.team_timeout.as_millis() as u64,
            });
        }
        return Err(Error::AggregateFailure {
            diagnostics: results
                .iter()
                .flat_map(|r| r.diagnostics.iter().map(ToString::to_string))
                .collect(),
        });
    }

    let payload = merge(&contributing);
    let contributors: Vec<String> = contributing.iter().map(|r| r.agent_id.clone()).collect();
    let diagnostics: Vec<Diagnostic> = results
        .iter()
        .flat_map(|r| r.diagnostics.iter().cloned())
        .collect();

    debug!(team = %team.name, contributors = ?contributors, "Parallel team merged");

    Ok(TeamResponse {
        results,
        payload,
        contributors,
        diagnostics,
        team: Some(team.name.clone()),
    })
}
