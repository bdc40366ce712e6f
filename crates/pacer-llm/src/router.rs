//! Provider router
//!
//! Holds every configured backend wrapped in its call policy, addressable
//! by name or by tier.

use crate::error::{Error, Result};
use crate::guarded::GuardedProvider;
use crate::mock::MockProvider;
use crate::openai::{OpenAiConfig, OpenAiProvider};
use crate::policy::ProviderPolicy;
use crate::provider::{ModelProvider, ModelTier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Backend implementation of a configured provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI-compatible HTTP endpoint
    #[default]
    Openai,
    /// In-process scripted provider
    Mock,
}

/// Static configuration of one provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Backend implementation
    #[serde(default)]
    pub kind: ProviderKind,
    /// Endpoint base URL (OpenAI default when absent)
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Default model
    #[serde(default)]
    pub model: Option<String>,
    /// Cost/latency tier
    #[serde(default)]
    pub tier: ModelTier,
    /// Timeout, retry and circuit breaker policy
    #[serde(default)]
    pub policy: ProviderPolicy,
}

impl ProviderSettings {
    /// Build the backend described by these settings
    pub fn build(&self, name: &str) -> Result<Arc<dyn ModelProvider>> {
        match self.kind {
            ProviderKind::Mock => {
                let mut provider = MockProvider::new(name).with_tier(self.tier);
                if let Some(model) = &self.model {
                    provider = provider.with_model(model.clone());
                }
                Ok(Arc::new(provider))
            }
            ProviderKind::Openai => {
                let var = self.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY");
                let mut config = OpenAiConfig::from_env(var)?
                    .with_name(name)
                    .with_tier(self.tier);
                if let Some(base_url) = &self.base_url {
                    config = config.with_base_url(base_url.clone());
                }
                if let Some(model) = &self.model {
                    config = config.with_model(model.clone());
                }
                Ok(Arc::new(OpenAiProvider::new(config)?))
            }
        }
    }
}

/// Named set of guarded providers
#[derive(Default)]
pub struct ProviderRouter {
    providers: BTreeMap<String, Arc<GuardedProvider>>,
    default_provider: Option<String>,
}

impl ProviderRouter {
    /// Create an empty router
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a router from static settings
    ///
    /// The default provider is `default` when given, else the first name in order.
    pub fn from_settings(
        settings: &BTreeMap<String, ProviderSettings>,
        default: Option<&str>,
    ) -> Result<Self> {
        let mut router = Self::new();
        for (name, provider_settings) in settings {
            let backend = provider_settings.build(name)?;
            router.register(name.clone(), backend, provider_settings.policy.clone());
        }
        if let Some(name) = default {
            router.set_default(name)?;
        }
        Ok(router)
    }

    /// Add a provider under `name`, wrapped in `policy`
    pub fn register(
        &mut self,
        name: impl Into<String>,
        provider: Arc<dyn ModelProvider>,
        policy: ProviderPolicy,
    ) {
        let name = name.into();
        info!(provider = %name, tier = %provider.tier(), "Registered model provider");
        if self.default_provider.is_none() {
            self.default_provider = Some(name.clone());
        }
        self.providers
            .insert(name, Arc::new(GuardedProvider::new(provider, policy)));
    }

    /// Select the default provider
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.providers.contains_key(name) {
            return Err(Error::NotConfigured(format!("unknown provider '{name}'")));
        }
        self.default_provider = Some(name.to_string());
        Ok(())
    }

    /// Look up a provider by name
    pub fn get(&self, name: &str) -> Result<Arc<GuardedProvider>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotConfigured(format!("unknown provider '{name}'")))
    }

    /// The default provider
    pub fn default_provider(&self) -> Result<Arc<GuardedProvider>> {
        let name = self
            .default_provider
            .as_deref()
            .ok_or_else(|| Error::NotConfigured("no providers configured".to_string()))?;
        self.get(name)
    }

    /// Pick a provider of the requested tier
    ///
    /// Falls back to the cheapest tier above, then the most capable tier below.
    pub fn for_tier(&self, tier: ModelTier) -> Result<Arc<GuardedProvider>> {
        let pick = |pred: &dyn Fn(ModelTier) -> bool, prefer_low: bool| {
            let candidates = self.providers.values().filter(|p| pred(p.tier()));
            if prefer_low {
                candidates.min_by_key(|p| p.tier()).cloned()
            } else {
                candidates.max_by_key(|p| p.tier()).cloned()
            }
        };

        pick(&|t| t == tier, true)
            .or_else(|| pick(&|t| t > tier, true))
            .or_else(|| pick(&|t| t < tier, false))
            .ok_or_else(|| Error::NotConfigured(format!("no provider for tier '{tier}'")))
    }

    /// Names of all providers
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    /// Whether a provider with this name exists
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_settings(tier: ModelTier) -> ProviderSettings {
        ProviderSettings {
            kind: ProviderKind::Mock,
            tier,
            ..ProviderSettings::default()
        }
    }

    #[test]
    fn test_from_settings_and_lookup() {
        let mut settings = BTreeMap::new();
        settings.insert("cheap".to_string(), mock_settings(ModelTier::Fast));
        settings.insert("smart".to_string(), mock_settings(ModelTier::Premium));

        let router = ProviderRouter::from_settings(&settings, Some("smart")).unwrap();
        assert_eq!(router.names(), vec!["cheap", "smart"]);
        assert_eq!(router.default_provider().unwrap().name(), "smart");
        assert!(router.get("missing").is_err());
    }

    #[test]
    fn test_unknown_default_rejected() {
        let mut settings = BTreeMap::new();
        settings.insert("cheap".to_string(), mock_settings(ModelTier::Fast));
        assert!(ProviderRouter::from_settings(&settings, Some("nope")).is_err());
    }

    #[test]
    fn test_for_tier_fallbacks() {
        let mut settings = BTreeMap::new();
        settings.insert("cheap".to_string(), mock_settings(ModelTier::Fast));
        settings.insert("smart".to_string(), mock_settings(ModelTier::Premium));
        let router = ProviderRouter::from_settings(&settings, None).unwrap();

        assert_eq!(router.for_tier(ModelTier::Fast).unwrap().name(), "cheap");
        // no standard provider: cheapest tier above wins
        assert_eq!(router.for_tier(ModelTier::Standard).unwrap().name(), "smart");

        let mut only_fast = BTreeMap::new();
        only_fast.insert("cheap".to_string(), mock_settings(ModelTier::Fast));
        let router = ProviderRouter::from_settings(&only_fast, None).unwrap();
        assert_eq!(router.for_tier(ModelTier::Premium).unwrap().name(), "cheap");
    }

    #[test]
    fn test_empty_router() {
        let router = ProviderRouter::new();
        assert!(router.default_provider().is_err());
        assert!(router.for_tier(ModelTier::Standard).is_err());
    }

    #[test]
    fn test_openai_requires_key() {
        let settings = ProviderSettings {
            kind: ProviderKind::Openai,
            api_key_env: Some("PACER_TEST_KEY_THAT_IS_NOT_SET".to_string()),
            ..ProviderSettings::default()
        };
        assert!(matches!(
            settings.build("openai"),
            Err(Error::NotConfigured(_))
        ));
    }
}
