//! SQLite run store
//!
//! Runs are stored as JSON documents next to the columns needed for
//! listing and version checks; outcomes go to their own append-only table.
//! The path comes from [`super::StoreConfig`].

use super::RunStore;
use crate::error::{Error, Result};
use crate::workflow::{RunSummary, StepOutcome, WorkflowRun};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// SQLite-backed run store
pub struct SqliteRunStore {
    pool: SqlitePool,
}

impl SqliteRunStore {
    /// Open (or create) the store at `path`
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Storage(format!("Failed to create database directory: {}", e))
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| Error::Storage(format!("Invalid SQLite path: {}", e)))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| Error::Storage(format!("Failed to connect to SQLite: {}", e)))?;

        let store = Self { pool };
        store.init_schema().await?;

        info!(path = %path.display(), "SQLite run store initialized");
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflow_runs (
                run_id TEXT PRIMARY KEY,
                workflow TEXT NOT NULL,
                status TEXT NOT NULL,
                current_step INTEGER NOT NULL,
                version INTEGER NOT NULL,
                document TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to create workflow_runs table: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS step_outcomes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                step_index INTEGER NOT NULL,
                document TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to create step_outcomes table: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_step_outcomes_run ON step_outcomes(run_id, id)")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to create index: {}", e)))?;

        debug!("SQLite run store schema initialized");
        Ok(())
    }

    async fn stored_version(&self, run_id: &str) -> Result<u64> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT version FROM workflow_runs WHERE run_id = ?")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to read run version: {}", e)))?;
        Ok(row.map_or(0, |(v,)| v as u64))
    }
}

#[async_trait]
impl RunStore for SqliteRunStore {
    async fn load(&self, run_id: &str) -> Result<Option<WorkflowRun>> {
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT document, version FROM workflow_runs WHERE run_id = ?")
                .bind(run_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| Error::Storage(format!("Failed to load run: {}", e)))?;

        let Some((document, version)) = row else {
            return Ok(None);
        };
        let mut run: WorkflowRun = serde_json::from_str(&document)
            .map_err(|e| Error::Storage(format!("Failed to deserialize run: {}", e)))?;
        run.version = version as u64;

        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT document FROM step_outcomes WHERE run_id = ? ORDER BY id")
                .bind(run_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| Error::Storage(format!("Failed to load outcomes: {}", e)))?;
        run.outcomes = rows
            .into_iter()
            .map(|(doc,)| serde_json::from_str(&doc))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Storage(format!("Failed to deserialize outcome: {}", e)))?;

        debug!(run_id = %run_id, version = run.version, outcomes = run.outcomes.len(), "Run loaded from SQLite");
        Ok(Some(run))
    }

    async fn save(&self, run: &WorkflowRun, expected_version: u64) -> Result<u64> {
        let version = expected_version + 1;
        let mut stored = run.clone();
        stored.version = version;
        stored.outcomes.clear();
        let document = serde_json::to_string(&stored)
            .map_err(|e| Error::Storage(format!("Failed to serialize run: {}", e)))?;

        let result = if expected_version == 0 {
            sqlx::query(
                r#"
                INSERT INTO workflow_runs
                    (run_id, workflow, status, current_step, version, document, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(run_id) DO NOTHING
                "#,
            )
            .bind(&run.run_id)
            .bind(&run.workflow)
            .bind(run.status.as_str())
            .bind(run.current_step as i64)
            .bind(version as i64)
            .bind(&document)
            .bind(run.created_at.to_rfc3339())
            .bind(run.updated_at.to_rfc3339())
            .execute(&self.pool)
            .await
        } else {
            sqlx::query(
                r#"
                UPDATE workflow_runs
                SET status = ?, current_step = ?, version = ?, document = ?, updated_at = ?
                WHERE run_id = ? AND version = ?
                "#,
            )
            .bind(run.status.as_str())
            .bind(run.current_step as i64)
            .bind(version as i64)
            .bind(&document)
            .bind(run.updated_at.to_rfc3339())
            .bind(&run.run_id)
            .bind(expected_version as i64)
            .execute(&self.pool)
            .await
        }
        .map_err(|e| Error::Storage(format!("Failed to save run: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(Error::VersionConflict {
                run_id: run.run_id.clone(),
                expected: expected_version,
                actual: self.stored_version(&run.run_id).await?,
            });
        }

        debug!(run_id = %run.run_id, version = version, status = %run.status, "Run saved to SQLite");
        Ok(version)
    }

    async fn append_outcome(
        &self,
        run_id: &str,
        outcome: &StepOutcome,
        expected_version: u64,
    ) -> Result<()> {
        let document = serde_json::to_string(outcome)
            .map_err(|e| Error::Storage(format!("Failed to serialize outcome: {}", e)))?;

        // Insert only while the run still carries the caller's version
        let result = sqlx::query(
            r#"
            INSERT INTO step_outcomes (run_id, step_index, document, recorded_at)
            SELECT ?, ?, ?, ?
            WHERE EXISTS (SELECT 1 FROM workflow_runs WHERE run_id = ? AND version = ?)
            "#,
        )
        .bind(run_id)
        .bind(outcome.step_index as i64)
        .bind(&document)
        .bind(Utc::now().to_rfc3339())
        .bind(run_id)
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to append outcome: {}", e)))?;

        if result.rows_affected() == 0 {
            let actual = self.stored_version(run_id).await?;
            if actual == 0 {
                return Err(Error::UnknownRun(run_id.to_string()));
            }
            return Err(Error::VersionConflict {
                run_id: run_id.to_string(),
                expected: expected_version,
                actual,
            });
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<RunSummary>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT document FROM workflow_runs ORDER BY updated_at DESC, run_id")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| Error::Storage(format!("Failed to list runs: {}", e)))?;

        rows.into_iter()
            .map(|(doc,)| {
                serde_json::from_str::<WorkflowRun>(&doc)
                    .map(|run| run.summary())
                    .map_err(|e| Error::Storage(format!("Failed to deserialize run: {}", e)))
            })
            .collect()
    }
}
