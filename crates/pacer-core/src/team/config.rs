//! Team configuration

use crate::agents::DEFAULT_MAX_DELEGATION_DEPTH;
use pacer_llm::retry::duration_ms;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a team combines its members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TeamPolicy {
    /// Members run one after another, each seeing prior results
    Sequential,
    /// Members run concurrently and their outputs are merged
    Parallel,
    /// A lead agent answers, delegating to the members as it sees fit
    Hierarchical {
        /// Lead agent id
        lead: String,
    },
}

impl std::fmt::Display for TeamPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Parallel => write!(f, "parallel"),
            Self::Hierarchical { lead } => write!(f, "hierarchical (lead: {lead})"),
        }
    }
}

/// Static team definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamConfig {
    /// Team name
    pub name: String,
    /// Member agent ids (declared order is the sequential order)
    pub members: Vec<String>,
    /// Aggregation policy
    pub policy: TeamPolicy,
    /// Timeout of each member call
    #[serde(default = "default_per_agent_timeout", rename = "per_agent_timeout_ms", with = "duration_ms")]
    pub per_agent_timeout: Duration,
    /// Deadline for the whole team
    #[serde(default = "default_team_timeout", rename = "team_timeout_ms", with = "duration_ms")]
    pub team_timeout: Duration,
    /// Bound on nested delegation (hierarchical teams)
    #[serde(default = "default_max_delegation_depth")]
    pub max_delegation_depth: u32,
}

impl TeamConfig {
    /// Create a team with default timeouts
    #[must_use]
    pub fn new(name: impl Into<String>, members: Vec<String>, policy: TeamPolicy) -> Self {
        Self {
            name: name.into(),
            members,
            policy,
            per_agent_timeout: default_per_agent_timeout(),
            team_timeout: default_team_timeout(),
            max_delegation_depth: default_max_delegation_depth(),
        }
    }

    /// Apply timeouts and delegation depth from defaults
    #[must_use]
    pub fn with_defaults(mut self, defaults: &TeamDefaults) -> Self {
        self.per_agent_timeout = defaults.per_agent_timeout;
        self.team_timeout = defaults.team_timeout;
        self.max_delegation_depth = defaults.max_delegation_depth;
        self
    }

    /// Set per-agent timeout
    #[must_use]
    pub fn with_per_agent_timeout(mut self, timeout: Duration) -> Self {
        self.per_agent_timeout = timeout;
        self
    }

    /// Set team timeout
    #[must_use]
    pub fn with_team_timeout(mut self, timeout: Duration) -> Self {
        self.team_timeout = timeout;
        self
    }

    /// Every agent involved, including a hierarchical lead
    #[must_use]
    pub fn participants(&self) -> Vec<String> {
        let mut all = self.members.clone();
        if let TeamPolicy::Hierarchical { lead } = &self.policy {
            if !all.contains(lead) {
                all.insert(0, lead.clone());
            }
        }
        all
    }
}

/// Timeouts used for ad hoc teams
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamDefaults {
    /// Timeout of each member call
    #[serde(default = "default_per_agent_timeout", rename = "per_agent_timeout_ms", with = "duration_ms")]
    pub per_agent_timeout: Duration,
    /// Deadline for the whole team
    #[serde(default = "default_team_timeout", rename = "team_timeout_ms", with = "duration_ms")]
    pub team_timeout: Duration,
    /// Bound on nested delegation
    #[serde(default = "default_max_delegation_depth")]
    pub max_delegation_depth: u32,
}

impl Default for TeamDefaults {
    fn default() -> Self {
        Self {
            per_agent_timeout: default_per_agent_timeout(),
            team_timeout: default_team_timeout(),
            max_delegation_depth: default_max_delegation_depth(),
        }
    }
}

fn default_per_agent_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_team_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_max_delegation_depth() -> u32 {
    DEFAULT_MAX_DELEGATION_DEPTH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_from_json() {
        let team: TeamConfig = serde_json::from_value(serde_json::json!({
            "name": "coaching",
            "members": ["training-planner", "nutrition"],
            "policy": {"kind": "hierarchical", "lead": "head-coach"},
            "team_timeout_ms": 5000
        }))
        .unwrap();

        assert_eq!(team.team_timeout, Duration::from_secs(5));
        assert_eq!(team.per_agent_timeout, Duration::from_secs(60));
        assert_eq!(team.max_delegation_depth, 2);
        assert_eq!(
            team.participants(),
            vec!["head-coach", "training-planner", "nutrition"]
        );
    }

    #[test]
    fn test_policy_display() {
        assert_eq!(TeamPolicy::Parallel.to_string(), "parallel");
        let lead = TeamPolicy::Hierarchical {
            lead: "head-coach".to_string(),
        };
        assert_eq!(lead.to_string(), "hierarchical (lead: head-coach)");
    }
}
