//! Teams
//!
//! A team is a named set of agents plus an aggregation policy:
//! - Sequential: hand-off in declared order, stopping on a terminal result
//! - Parallel: concurrent fan-out, outputs merged (see [`merge`])
//! - Hierarchical: a lead agent answers and may delegate to the members
//!
//! Every policy is bounded by the team timeout.

mod config;
mod hierarchical;
pub mod merge;
mod parallel;
mod sequential;


pub use config::{TeamConfig, TeamDefaults, TeamPolicy};

use crate::error::{Error, Result};
use crate::registry::AgentRegistry;
use crate::types::{Request, TeamResponse};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Name given to ad hoc parallel teams
pub const AD_HOC_TEAM: &str = "ad-hoc";

/// Runs static and ad hoc teams against the registry
pub struct TeamRunner {
    registry: Arc<AgentRegistry>,
    teams: BTreeMap<String, TeamConfig>,
    defaults: TeamDefaults,
    aggregations: AtomicU64,
}

impl TeamRunner {
    /// Create a runner, validating every team against the registry
    pub fn new(
        registry: Arc<AgentRegistry>,
        teams: Vec<TeamConfig>,
        defaults: TeamDefaults,
    ) -> Result<Self> {
        let mut by_name = BTreeMap::new();
        for team in teams {
            validate(&registry, &team)?;
            if by_name.contains_key(&team.name) {
                return Err(Error::invalid_config(
                    format!("teams.{}", team.name),
                    "duplicate team name",
                ));
            }
            by_name.insert(team.name.clone(), team);
        }

        Ok(Self {
            registry,
            teams: by_name,
            defaults,
            aggregations: AtomicU64::new(0),
        })
    }

    /// Static team by name
    #[must_use]
    pub fn team(&self, name: &str) -> Option<&TeamConfig> {
        self.teams.get(name)
    }

    /// All static teams, ordered by name
    pub fn teams(&self) -> impl Iterator<Item = &TeamConfig> {
        self.teams.values()
    }

    /// Static team whose participants are exactly `agent_ids`
    #[must_use]
    pub fn match_static(&self, agent_ids: &[String]) -> Option<&TeamConfig> {
        let wanted: BTreeSet<&str> = agent_ids.iter().map(String::as_str).collect();
        self.teams.values().find(|team| {
            let participants = team.participants();
            let have: BTreeSet<&str> = participants.iter().map(String::as_str).collect();
            have == wanted
        })
    }

    /// Parallel team over `agent_ids` using the default timeouts
    #[must_use]
    pub fn ad_hoc(&self, agent_ids: Vec<String>) -> TeamConfig {
        TeamConfig::new(AD_HOC_TEAM, agent_ids, TeamPolicy::Parallel).with_defaults(&self.defaults)
    }

    /// Run a static team by name
    pub async fn run(
        &self,
        name: &str,
        request: &Request,
        cancel: &CancellationToken,
    ) -> Result<TeamResponse> {
        let team = self
            .teams
            .get(name)
            .ok_or_else(|| Error::UnknownTeam(name.to_string()))?;
        self.aggregate(team, request, cancel).await
    }

    /// Run `team` under its aggregation policy
    #[instrument(skip(self, team, request, cancel), fields(team = %team.name, policy = %team.policy))]
    pub async fn aggregate(
        &self,
        team: &TeamConfig,
        request: &Request,
        cancel: &CancellationToken,
    ) -> Result<TeamResponse> {
        self.aggregations.fetch_add(1, Ordering::Relaxed);
        info!(
            session_id = %request.session_id,
            members = team.members.len(),
            "Aggregating team"
        );

        match &team.policy {
            TeamPolicy::Sequential => sequential::run(&self.registry, team, request, cancel).await,
            TeamPolicy::Parallel => parallel::run(&self.registry, team, request, cancel).await,
            TeamPolicy::Hierarchical { lead } => {
                hierarchical::run(&self.registry, team, lead, request, cancel).await
            }
        }
    }

    /// Number of team aggregations performed
    #[must_use]
    pub fn aggregation_count(&self) -> u64 {
        self.aggregations.load(Ordering::Relaxed)
    }
}

fn validate(registry: &AgentRegistry, team: &TeamConfig) -> Result<()> {
    let field = format!("teams.{}", team.name);
    if team.members.is_empty() {
        return Err(Error::invalid_config(field, "a team needs at least one member"));
    }
    for agent_id in team.participants() {
        if !registry.contains(&agent_id) {
            return Err(Error::invalid_config(
                field,
                format!("unknown agent '{agent_id}'"),
            ));
        }
    }
    if team.team_timeout.is_zero() || team.per_agent_timeout.is_zero() {
        return Err(Error::invalid_config(field, "timeouts must be positive"));
    }
    Ok(())
}
