//! Static orchestration configuration
//!
//! Everything the orchestrator needs is declared up front: model providers,
//! persona agents, teams, workflows, and classifier keywords. [`PacerConfig::build`]
//! validates the declarations and wires them into a [`Runtime`].

use crate::agents::{Agent, LlmAgent, OutputFormat};
use crate::classifier::{IntentClassifier, KeywordClassifier, LlmClassifier};
use crate::coordinator::{Coordinator, CoordinatorConfig};
use crate::error::{Error, Result};
use crate::registry::AgentRegistry;
use crate::store::{RunStore, RunStoreBackend, StoreConfig};
use crate::team::{TeamConfig, TeamDefaults, TeamRunner};
use crate::types::{AgentDescriptor, Capability};
use crate::workflow::{EngineConfig, WorkflowDefinition, WorkflowEngine};
use pacer_llm::{
    Constraints, GuardedProvider, ModelProvider, ModelTier, ProviderRouter, ProviderSettings,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Persona agent declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Unique agent id
    pub id: String,
    /// Display name (defaults to the id)
    #[serde(default)]
    pub name: Option<String>,
    /// Capability tags, at least one
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Higher priority agents are preferred
    #[serde(default)]
    pub priority: u32,
    /// Provider by name
    #[serde(default)]
    pub provider: Option<String>,
    /// Provider by tier, used when no name is given
    #[serde(default)]
    pub tier: Option<ModelTier>,
    /// Persona instructions
    #[serde(default)]
    pub prompt: String,
    /// Answer shape
    #[serde(default)]
    pub output: OutputFormat,
    /// Model override, token limit, temperature
    #[serde(default)]
    pub constraints: Constraints,
}

impl AgentSettings {
    /// Declaration with one capability and the default provider
    #[must_use]
    pub fn new(id: impl Into<String>, capability: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            capabilities: vec![capability.into()],
            priority: 0,
            provider: None,
            tier: None,
            prompt: String::new(),
            output: OutputFormat::default(),
            constraints: Constraints::default(),
        }
    }
}

/// Intent classification strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierMode {
    /// Keyword rules only
    #[default]
    Keyword,
    /// Ask a model, keyword rules as fallback
    Llm,
}

/// Keywords routed to one capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRuleSettings {
    /// Capability tag
    pub capability: String,
    /// Whole-word keywords
    pub keywords: Vec<String>,
}

/// Classifier settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifierSettings {
    /// Strategy
    #[serde(default)]
    pub mode: ClassifierMode,
    /// Provider for the LLM strategy (default provider when absent)
    #[serde(default)]
    pub provider: Option<String>,
    /// Keyword rules; earlier rules rank first
    #[serde(default)]
    pub keywords: Vec<KeywordRuleSettings>,
}

/// Complete static configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PacerConfig {
    /// Model providers by name
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderSettings>,
    /// Default provider name
    #[serde(default)]
    pub default_provider: Option<String>,
    /// Persona agents
    #[serde(default)]
    pub agents: Vec<AgentSettings>,
    /// Static teams
    #[serde(default)]
    pub teams: Vec<TeamConfig>,
    /// Timeouts for ad hoc teams
    #[serde(default)]
    pub team_defaults: TeamDefaults,
    /// Workflow definitions
    #[serde(default)]
    pub workflows: Vec<WorkflowDefinition>,
    /// Intent classifier
    #[serde(default)]
    pub classifier: ClassifierSettings,
    /// Coordinator settings
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    /// Workflow engine settings
    #[serde(default)]
    pub engine: EngineConfig,
    /// Run store backend
    #[serde(default)]
    pub store: StoreConfig,
}

/// Wired orchestrator
pub struct Runtime {
    /// Configured providers
    pub providers: Arc<ProviderRouter>,
    /// Agent registry
    pub registry: Arc<AgentRegistry>,
    /// Team runner
    pub teams: Arc<TeamRunner>,
    /// Request entry point
    pub coordinator: Arc<Coordinator>,
    /// Workflow engine
    pub engine: Arc<WorkflowEngine>,
}

impl PacerConfig {
    /// Open the configured run store and build the runtime
    pub async fn build(&self, shutdown: CancellationToken) -> Result<Runtime> {
        let store = RunStoreBackend::from_config(&self.store).await?;
        self.build_with_store(Arc::new(store), shutdown)
    }

    /// Build the runtime on top of an existing run store
    pub fn build_with_store(
        &self,
        store: Arc<dyn RunStore>,
        shutdown: CancellationToken,
    ) -> Result<Runtime> {
        self.build_with_agents(Vec::new(), store, shutdown)
    }

    /// Build the runtime with extra agents registered next to the declared ones
    pub fn build_with_agents(
        &self,
        extra: Vec<(AgentDescriptor, Arc<dyn Agent>)>,
        store: Arc<dyn RunStore>,
        shutdown: CancellationToken,
    ) -> Result<Runtime> {
        for (name, settings) in &self.providers {
            if settings.policy.retry.max_attempts == 0 {
                return Err(Error::invalid_config(
                    format!("providers.{name}.policy.retry.max_attempts"),
                    "must be at least 1",
                ));
            }
        }
        let providers = Arc::new(
            ProviderRouter::from_settings(&self.providers, self.default_provider.as_deref())
                .map_err(|e| Error::invalid_config("providers", e.to_string()))?,
        );

        let mut registry = AgentRegistry::new();
        let mut seen = HashSet::new();
        for settings in &self.agents {
            if !seen.insert(settings.id.as_str()) {
                return Err(Error::invalid_config(
                    format!("agents.{}", settings.id),
                    "duplicate agent id",
                ));
            }
            let (descriptor, agent) = build_agent(settings, &providers)?;
            registry.register(descriptor, agent)?;
        }
        for (descriptor, agent) in extra {
            registry.register(descriptor, agent)?;
        }
        let registry = Arc::new(registry);

        let teams = Arc::new(TeamRunner::new(
            registry.clone(),
            self.teams.clone(),
            self.team_defaults.clone(),
        )?);

        let classifier = self.build_classifier(&providers)?;
        let coordinator = Arc::new(
            Coordinator::new(registry.clone(), teams.clone(), classifier)
                .with_config(self.coordinator.clone()),
        );

        let mut engine = WorkflowEngine::new(registry.clone(), teams.clone(), store)
            .with_config(self.engine.clone())
            .with_shutdown(shutdown);
        for definition in &self.workflows {
            engine.register(definition.clone())?;
        }

        info!(
            providers = providers.names().len(),
            agents = registry.len(),
            teams = self.teams.len(),
            workflows = self.workflows.len(),
            "Runtime built"
        );

        Ok(Runtime {
            providers,
            registry,
            teams,
            coordinator,
            engine: Arc::new(engine),
        })
    }

    fn build_classifier(&self, providers: &ProviderRouter) -> Result<Arc<dyn IntentClassifier>> {
        let keywords = KeywordClassifier::from_rules(
            self.classifier
                .keywords
                .iter()
                .map(|rule| (Capability::from(rule.capability.as_str()), &rule.keywords)),
        )?;

        match self.classifier.mode {
            ClassifierMode::Keyword => Ok(Arc::new(keywords)),
            ClassifierMode::Llm => {
                let provider = match &self.classifier.provider {
                    Some(name) => lookup(providers, name, "classifier.provider")?,
                    None => providers
                        .default_provider()
                        .map_err(|e| Error::invalid_config("classifier.provider", e.to_string()))?,
                };
                Ok(Arc::new(LlmClassifier::new(provider, keywords)))
            }
        }
    }
}

fn lookup(providers: &ProviderRouter, name: &str, field: &str) -> Result<Arc<GuardedProvider>> {
    if !providers.contains(name) {
        return Err(Error::invalid_config(field, format!("unknown provider '{name}'")));
    }
    providers
        .get(name)
        .map_err(|e| Error::invalid_config(field, e.to_string()))
}

fn build_agent(
    settings: &AgentSettings,
    providers: &ProviderRouter,
) -> Result<(AgentDescriptor, Arc<dyn Agent>)> {
    let field = format!("agents.{}.provider", settings.id);
    let provider = match (&settings.provider, settings.tier) {
        (Some(name), _) => lookup(providers, name, &field)?,
        (None, Some(tier)) => providers
            .for_tier(tier)
            .map_err(|e| Error::invalid_config(&field, e.to_string()))?,
        (None, None) => providers
            .default_provider()
            .map_err(|e| Error::invalid_config(&field, e.to_string()))?,
    };

    let descriptor = settings.capabilities.iter().fold(
        AgentDescriptor::new(
            &settings.id,
            settings.name.as_deref().unwrap_or(&settings.id),
        )
        .with_priority(settings.priority)
        .with_tier(provider.tier()),
        |descriptor, capability| descriptor.with_capability(capability.as_str()),
    );

    let agent = LlmAgent::new(&settings.id, &settings.prompt, provider)
        .with_output(settings.output)
        .with_constraints(settings.constraints.clone());

    Ok((descriptor, Arc::new(agent)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRunStore;
    use crate::team::TeamPolicy;
    use crate::types::Request;
    use crate::workflow::WorkflowStepSpec;
    use pacer_llm::ProviderKind;

    fn mock(tier: ModelTier) -> ProviderSettings {
        ProviderSettings {
            kind: ProviderKind::Mock,
            tier,
            ..ProviderSettings::default()
        }
    }

    fn base() -> PacerConfig {
        let mut config = PacerConfig::default();
        config.providers.insert("local".to_string(), mock(ModelTier::Fast));
        config.providers.insert("smart".to_string(), mock(ModelTier::Premium));
        config.agents = vec![
            AgentSettings::new("recovery", "recovery-assessment"),
            AgentSettings {
                tier: Some(ModelTier::Premium),
                ..AgentSettings::new("health-analyzer", "health-analysis")
            },
        ];
        config
    }

    fn build(config: &PacerConfig) -> Result<Runtime> {
        config.build_with_store(Arc::new(MemoryRunStore::new()), CancellationToken::new())
    }

    #[test]
    fn test_builds_registry_from_declarations() {
        let runtime = build(&base()).unwrap();
        assert_eq!(runtime.registry.len(), 2);
        assert_eq!(
            runtime.registry.get("health-analyzer").map(|d| d.tier),
            Some(ModelTier::Premium)
        );
        assert_eq!(
            runtime.registry.get("recovery").map(|d| d.tier),
            Some(ModelTier::Fast)
        );
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let mut config = base();
        config.agents[0].provider = Some("gpt-9".to_string());
        match build(&config) {
            Err(Error::InvalidConfig { field, .. }) => assert_eq!(field, "agents.recovery.provider"),
            other => panic!("expected InvalidConfig, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_duplicate_agent_rejected() {
        let mut config = base();
        config
            .agents
            .push(AgentSettings::new("recovery", "recovery-assessment"));
        assert!(matches!(build(&config), Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_empty_capabilities_rejected() {
        let mut config = base();
        config.agents[0].capabilities.clear();
        assert!(matches!(build(&config), Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_unknown_team_member_rejected() {
        let mut config = base();
        config.teams.push(TeamConfig::new(
            "analysis",
            vec!["recovery".to_string(), "nutrition".to_string()],
            TeamPolicy::Parallel,
        ));
        assert!(matches!(build(&config), Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_unknown_step_target_rejected() {
        let mut config = base();
        config.workflows.push(WorkflowDefinition::new(
            "daily-checkin",
            vec![WorkflowStepSpec::agent("sync-data", "data-sync")],
        ));
        assert!(matches!(build(&config), Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_zero_retry_attempts_rejected() {
        let mut config = base();
        config.workflows.push(WorkflowDefinition::new(
            "recovery-check",
            vec![WorkflowStepSpec::agent("assess", "recovery")
                .with_retry(pacer_llm::RetryConfig::new().with_max_attempts(1))],
        ));
        assert!(build(&config).is_ok());

        let mut zero = config.clone();
        zero.workflows[0].steps[0].retry.max_attempts = 0;
        match build(&zero) {
            Err(Error::InvalidConfig { field, .. }) => {
                assert_eq!(field, "workflows.recovery-check.steps.assess.retry.max_attempts")
            }
            other => panic!("expected InvalidConfig, got {:?}", other.err()),
        }

        let mut zero = config;
        if let Some(local) = zero.providers.get_mut("local") {
            local.policy.retry.max_attempts = 0;
        }
        match build(&zero) {
            Err(Error::InvalidConfig { field, .. }) => {
                assert_eq!(field, "providers.local.policy.retry.max_attempts")
            }
            other => panic!("expected InvalidConfig, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_keyword_routing_through_built_coordinator() {
        let mut config = base();
        config.classifier.keywords.push(KeywordRuleSettings {
            capability: "recovery-assessment".to_string(),
            keywords: vec!["sore".to_string(), "tired".to_string()],
        });
        let runtime = build(&config).unwrap();

        let route = runtime
            .coordinator
            .route(&Request::text("s1", "My legs are sore"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(route.agents, vec!["recovery".to_string()]);
    }

    #[test]
    fn test_llm_classifier_needs_known_provider() {
        let mut config = base();
        config.classifier.mode = ClassifierMode::Llm;
        config.classifier.provider = Some("missing".to_string());
        assert!(matches!(build(&config), Err(Error::InvalidConfig { .. })));

        config.classifier.provider = None;
        assert!(build(&config).is_ok());
    }

    #[test]
    fn test_deserialize_from_json() {
        let config: PacerConfig = serde_json::from_value(serde_json::json!({
            "providers": { "local": { "kind": "mock", "tier": "fast" } },
            "agents": [
                { "id": "nutrition", "capabilities": ["nutrition-guidance"], "output": "json" }
            ],
            "workflows": [{
                "name": "fuel",
                "steps": [{ "id": "advise", "target": { "agent": "nutrition" }, "timeout_ms": 500 }]
            }],
            "store": { "backend": "memory" }
        }))
        .unwrap();

        assert_eq!(config.agents[0].output, OutputFormat::Json);
        assert_eq!(config.store.backend, "memory");
        let runtime = build(&config).unwrap();
        let names: Vec<&str> = runtime.engine.workflows().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["fuel"]);
    }
}
