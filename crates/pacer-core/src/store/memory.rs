//! In-memory run store

use super::RunStore;
use crate::error::{Error, Result};
use crate::workflow::{RunSummary, StepOutcome, WorkflowRun};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Run store kept in process memory; lost on restart
#[derive(Default)]
pub struct MemoryRunStore {
    runs: RwLock<HashMap<String, WorkflowRun>>,
    outcomes: RwLock<HashMap<String, Vec<StepOutcome>>>,
}

impl MemoryRunStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn load(&self, run_id: &str) -> Result<Option<WorkflowRun>> {
        let runs = self.runs.read().await;
        let Some(run) = runs.get(run_id) else {
            return Ok(None);
        };
        let mut run = run.clone();
        run.outcomes = self
            .outcomes
            .read()
            .await
            .get(run_id)
            .cloned()
            .unwrap_or_default();
        Ok(Some(run))
    }

    async fn save(&self, run: &WorkflowRun, expected_version: u64) -> Result<u64> {
        let mut runs = self.runs.write().await;
        let actual = runs.get(&run.run_id).map_or(0, |r| r.version);
        if actual != expected_version {
            return Err(Error::VersionConflict {
                run_id: run.run_id.clone(),
                expected: expected_version,
                actual,
            });
        }

        let version = expected_version + 1;
        let mut stored = run.clone();
        stored.version = version;
        stored.outcomes.clear();
        runs.insert(run.run_id.clone(), stored);

        debug!(run_id = %run.run_id, version = version, status = %run.status, "Run saved to memory");
        Ok(version)
    }

    async fn append_outcome(
        &self,
        run_id: &str,
        outcome: &StepOutcome,
        expected_version: u64,
    ) -> Result<()> {
        // Hold the runs lock so no save can slip between check and append
        let runs = self.runs.read().await;
        let Some(run) = runs.get(run_id) else {
            return Err(Error::UnknownRun(run_id.to_string()));
        };
        if run.version != expected_version {
            return Err(Error::VersionConflict {
                run_id: run_id.to_string(),
                expected: expected_version,
                actual: run.version,
            });
        }
        self.outcomes
            .write()
            .await
            .entry(run_id.to_string())
            .or_default()
            .push(outcome.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<RunSummary>> {
        let mut summaries: Vec<RunSummary> = self
            .runs
            .read()
            .await
            .values()
            .map(WorkflowRun::summary)
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.run_id.cmp(&b.run_id)));
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{RunStatus, StepStatus};
    use serde_json::Map;

    #[tokio::test]
    async fn test_versioned_save() {
        let store = MemoryRunStore::new();
        let mut run = WorkflowRun::new("onboarding", Map::new());

        assert_eq!(store.save(&run, 0).await.unwrap(), 1);
        let err = store.save(&run, 0).await.unwrap_err();
        assert!(matches!(err, Error::VersionConflict { expected: 0, actual: 1, .. }));

        run.set_status(RunStatus::Running);
        assert_eq!(store.save(&run, 1).await.unwrap(), 2);

        let loaded = store.load(&run.run_id).await.unwrap().unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.status, RunStatus::Running);
    }

    #[tokio::test]
    async fn test_outcome_log_is_authoritative() {
        let store = MemoryRunStore::new();
        let mut run = WorkflowRun::new("onboarding", Map::new());
        run.outcomes
            .push(StepOutcome::new("stale", 0, StepStatus::Completed, 1));
        store.save(&run, 0).await.unwrap();

        store
            .append_outcome(
                &run.run_id,
                &StepOutcome::new("collect-profile", 0, StepStatus::Completed, 1),
                1,
            )
            .await
            .unwrap();

        let loaded = store.load(&run.run_id).await.unwrap().unwrap();
        assert_eq!(loaded.outcomes.len(), 1);
        assert_eq!(loaded.outcomes[0].step_id, "collect-profile");

        let err = store
            .append_outcome("missing", &StepOutcome::new("x", 0, StepStatus::Skipped, 0), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownRun(_)));
        assert!(store.load("missing").await.unwrap().is_none());
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_append_requires_current_version() {
        let store = MemoryRunStore::new();
        let mut run = WorkflowRun::new("daily-checkin", Map::new());
        store.save(&run, 0).await.unwrap();
        run.set_status(RunStatus::Aborted);
        store.save(&run, 1).await.unwrap();

        let outcome = StepOutcome::new("send-alerts", 2, StepStatus::Completed, 1);
        let err = store.append_outcome(&run.run_id, &outcome, 1).await.unwrap_err();
        assert!(matches!(err, Error::VersionConflict { expected: 1, actual: 2, .. }));
        assert!(store.load(&run.run_id).await.unwrap().unwrap().outcomes.is_empty());
    }
}
