//! Workflow run persistence
//!
//! Runs are saved with optimistic versioning: `save(run, expected)` only
//! succeeds when the stored version equals `expected` (0 for a new run),
//! and returns the new version. The step outcome log is appended
//! separately and is authoritative when a run is loaded.
//!
//! Backends:
//! - [`SqliteRunStore`]: default, embedded database
//! - [`MemoryRunStore`]: tests and throwaway runs

mod memory;
mod sqlite;

pub use memory::MemoryRunStore;
pub use sqlite::SqliteRunStore;

use crate::error::{Error, Result};
use crate::workflow::{RunSummary, StepOutcome, WorkflowRun};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage of workflow runs
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Load a run with its full outcome log
    async fn load(&self, run_id: &str) -> Result<Option<WorkflowRun>>;

    /// Save a run if the stored version equals `expected_version`
    ///
    /// Returns the new version. Fails with `VersionConflict` otherwise.
    async fn save(&self, run: &WorkflowRun, expected_version: u64) -> Result<u64>;

    /// Append one entry to a run's outcome log
    ///
    /// The entry is written only while the stored run is still at
    /// `expected_version`; otherwise fails with `VersionConflict` and the
    /// log is left untouched.
    async fn append_outcome(
        &self,
        run_id: &str,
        outcome: &StepOutcome,
        expected_version: u64,
    ) -> Result<()>;

    /// All runs, most recently updated first
    async fn list(&self) -> Result<Vec<RunSummary>>;
}

/// Run store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend type: "sqlite" (default) or "memory"
    #[serde(default = "default_backend")]
    pub backend: String,

    /// SQLite database path; relative paths live under `~/.pacer`
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
}

fn default_backend() -> String {
    "sqlite".to_string()
}

fn default_sqlite_path() -> String {
    "runs.db".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            sqlite_path: default_sqlite_path(),
        }
    }
}

impl StoreConfig {
    /// In-memory configuration
    #[must_use]
    pub fn memory() -> Self {
        Self {
            backend: "memory".to_string(),
            ..Self::default()
        }
    }

    /// Resolved SQLite path
    pub fn resolved_sqlite_path(&self) -> Result<PathBuf> {
        let path = PathBuf::from(&self.sqlite_path);
        if path.is_absolute() {
            return Ok(path);
        }
        Ok(data_dir()?.join(path))
    }
}

/// `~/.pacer`
pub fn data_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| Error::Internal("Could not determine home directory".to_string()))?;
    Ok(home.join(".pacer"))
}

/// Run store selected by configuration
pub enum RunStoreBackend {
    /// SQLite storage (default)
    Sqlite(SqliteRunStore),
    /// In-memory storage
    Memory(MemoryRunStore),
}

impl RunStoreBackend {
    /// Open the configured backend
    pub async fn from_config(config: &StoreConfig) -> Result<Self> {
        match config.backend.as_str() {
            "sqlite" => {
                let path = config.resolved_sqlite_path()?;
                Ok(Self::Sqlite(SqliteRunStore::new(&path).await?))
            }
            "memory" => Ok(Self::Memory(MemoryRunStore::new())),
            other => Err(Error::invalid_config(
                "store.backend",
                format!("unknown run store backend '{other}', use 'sqlite' or 'memory'"),
            )),
        }
    }
}

#[async_trait]
impl RunStore for RunStoreBackend {
    async fn load(&self, run_id: &str) -> Result<Option<WorkflowRun>> {
        match self {
            Self::Sqlite(store) => store.load(run_id).await,
            Self::Memory(store) => store.load(run_id).await,
        }
    }

    async fn save(&self, run: &WorkflowRun, expected_version: u64) -> Result<u64> {
        match self {
            Self::Sqlite(store) => store.save(run, expected_version).await,
            Self::Memory(store) => store.save(run, expected_version).await,
        }
    }

    async fn append_outcome(
        &self,
        run_id: &str,
        outcome: &StepOutcome,
        expected_version: u64,
    ) -> Result<()> {
        match self {
            Self::Sqlite(store) => store.append_outcome(run_id, outcome, expected_version).await,
            Self::Memory(store) => store.append_outcome(run_id, outcome, expected_version).await,
        }
    }

    async fn list(&self) -> Result<Vec<RunSummary>> {
        match self {
            Self::Sqlite(store) => store.list().await,
            Self::Memory(store) => store.list().await,
        }
    }
}
