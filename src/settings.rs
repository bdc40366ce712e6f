//! Application configuration
//!
//! The orchestration declarations are deserialized straight into
//! [`PacerConfig`]; the binary only adds its logging settings.

use pacer_core::PacerConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(flatten)]
    pub pacer: PacerConfig,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Directory for daily rolling log files; stderr only when absent
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_filter() -> String {
    "pacer=info,pacer_core=info,pacer_llm=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            format: LogFormat::default(),
            directory: None,
        }
    }
}
