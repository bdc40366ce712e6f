//! Agent registry
//!
//! Maps capability tags to the agents offering them. Built mutably at
//! startup, then shared behind `Arc` and read without locking.

use crate::agents::Agent;
use crate::error::{Error, Result};
use crate::types::{AgentDescriptor, Capability};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

struct Entry {
    descriptor: AgentDescriptor,
    agent: Arc<dyn Agent>,
}

/// Capability-indexed set of agents
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<String, Entry>,
}

impl AgentRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent under its descriptor
    pub fn register(&mut self, descriptor: AgentDescriptor, agent: Arc<dyn Agent>) -> Result<()> {
        if descriptor.capabilities.is_empty() {
            return Err(Error::invalid_config(
                format!("agents.{}.capabilities", descriptor.id),
                "an agent must declare at least one capability",
            ));
        }
        if self.agents.contains_key(&descriptor.id) {
            return Err(Error::DuplicateAgentId(descriptor.id));
        }

        info!(
            agent_id = %descriptor.id,
            capabilities = ?descriptor.capabilities,
            priority = descriptor.priority,
            "Registered agent"
        );
        self.agents
            .insert(descriptor.id.clone(), Entry { descriptor, agent });
        Ok(())
    }

    /// Remove an agent, returning its descriptor
    pub fn deregister(&mut self, id: &str) -> Option<AgentDescriptor> {
        let removed = self.agents.remove(id).map(|entry| entry.descriptor);
        if removed.is_some() {
            debug!(agent_id = %id, "Deregistered agent");
        }
        removed
    }

    /// Descriptor of an agent
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&AgentDescriptor> {
        self.agents.get(id).map(|entry| &entry.descriptor)
    }

    /// Implementation of an agent
    #[must_use]
    pub fn agent(&self, id: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(id).map(|entry| entry.agent.clone())
    }

    /// Whether an agent id is registered
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.agents.contains_key(id)
    }

    /// Number of registered agents
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// All descriptors, ordered by id
    #[must_use]
    pub fn descriptors(&self) -> Vec<&AgentDescriptor> {
        let mut all: Vec<_> = self.agents.values().map(|e| &e.descriptor).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Every capability offered by at least one agent, sorted
    #[must_use]
    pub fn capabilities(&self) -> Vec<Capability> {
        self.agents
            .values()
            .flat_map(|e| e.descriptor.capabilities.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Agents offering `capability`, by priority descending then id ascending
    #[must_use]
    pub fn resolve(&self, capability: &str) -> Vec<&AgentDescriptor> {
        let mut matches: Vec<_> = self
            .agents
            .values()
            .map(|e| &e.descriptor)
            .filter(|d| d.supports(capability))
            .collect();
        matches.sort_by(priority_order);
        matches
    }

    /// Order known agent ids by priority descending then id ascending
    ///
    /// Unknown ids are dropped.
    #[must_use]
    pub fn order_by_priority(&self, ids: &[String]) -> Vec<&AgentDescriptor> {
        let mut known: Vec<_> = ids.iter().filter_map(|id| self.get(id)).collect();
        known.sort_by(priority_order);
        known.dedup_by(|a, b| a.id == b.id);
        known
    }
}

fn priority_order(a: &&AgentDescriptor, b: &&AgentDescriptor) -> std::cmp::Ordering {
    b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::InvocationContext;
    use crate::types::{AgentResult, Request};
    use serde_json::json;

    struct Silent;

    #[async_trait::async_trait]
    impl Agent for Silent {
        async fn handle(&self, _request: &Request, _cx: &InvocationContext) -> Result<AgentResult> {
            Ok(AgentResult::success("silent", json!(null)))
        }
    }

    fn descriptor(id: &str, priority: u32, capabilities: &[&str]) -> AgentDescriptor {
        capabilities.iter().fold(
            AgentDescriptor::new(id, id).with_priority(priority),
            |d, c| d.with_capability(*c),
        )
    }

    fn registry() -> AgentRegistry {
        let mut registry = AgentRegistry::new();
        registry
            .register(descriptor("zeta", 5, &["training-planning"]), Arc::new(Silent))
            .unwrap();
        registry
            .register(descriptor("alpha", 5, &["training-planning", "recovery"]), Arc::new(Silent))
            .unwrap();
        registry
            .register(descriptor("beta", 9, &["training-planning"]), Arc::new(Silent))
            .unwrap();
        registry
    }

    #[test]
    fn test_resolve_orders_by_priority_then_id() {
        let registry = registry();
        let ids: Vec<_> = registry
            .resolve("training-planning")
            .iter()
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(ids, vec!["beta", "alpha", "zeta"]);

        // deterministic across calls
        let again: Vec<_> = registry
            .resolve("training-planning")
            .iter()
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(ids, again);
    }

    #[test]
    fn test_unknown_capability_is_empty() {
        assert!(registry().resolve("astrology").is_empty());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut registry = registry();
        let err = registry
            .register(descriptor("alpha", 1, &["nutrition-guidance"]), Arc::new(Silent))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateAgentId(id) if id == "alpha"));
    }

    #[test]
    fn test_empty_capabilities_rejected() {
        let mut registry = AgentRegistry::new();
        let err = registry
            .register(AgentDescriptor::new("empty", "Empty"), Arc::new(Silent))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_deregister_and_capabilities() {
        let mut registry = registry();
        assert_eq!(
            registry.capabilities(),
            vec![Capability::from("recovery"), Capability::from("training-planning")]
        );

        assert!(registry.deregister("alpha").is_some());
        assert!(registry.resolve("recovery").is_empty());
        assert!(registry.deregister("alpha").is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_order_by_priority() {
        let registry = registry();
        let ordered: Vec<_> = registry
            .order_by_priority(&["zeta".to_string(), "ghost".to_string(), "beta".to_string()])
            .iter()
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(ordered, vec!["beta", "zeta"]);
    }
}
