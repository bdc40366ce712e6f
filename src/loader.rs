//! Configuration loading
//!
//! Sources, lowest priority first: embedded defaults, `config/default`,
//! `config/{PACER_ENV}`, `config/local`, an explicit `--config` file, and
//! `PACER_*` environment variables.

use crate::settings::AppConfig;
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use std::path::Path;

/// Embedded default configuration (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Load configuration from files and environment
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let env = std::env::var("PACER_ENV").unwrap_or_else(|_| "development".to_string());

    let mut builder = Config::builder()
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{env}")).required(false))
        .add_source(File::with_name("config/local").required(false));

    if let Some(path) = explicit {
        builder = builder.add_source(File::from(path).required(true));
    }

    // PACER_STORE__BACKEND=memory maps to store.backend
    let config = builder
        .add_source(
            Environment::with_prefix("PACER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_defaults_deserialize() {
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        let pacer = &config.pacer;
        assert!(pacer.agents.iter().any(|a| a.id == "head-coach"));
        assert!(pacer.teams.iter().any(|t| t.name == "analysis"));
        let workflows: Vec<&str> = pacer.workflows.iter().map(|w| w.name.as_str()).collect();
        assert!(workflows.contains(&"onboarding"));
        assert!(workflows.contains(&"daily-checkin"));
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("override.toml");
        std::fs::write(&path, "[store]\nbackend = \"memory\"\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.pacer.store.backend, "memory");
        assert!(!config.pacer.agents.is_empty());
    }
}
