//! Durable run status tracking.
//!
//! One [`StatusTracker`] exists per execution. Every mutation is serialized
//! by the mutex and immediately persisted as a full snapshot, so a crash at
//! any point leaves a readable results file describing exactly which runs
//! finished.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use gauntlet_core::state::{is_transition_allowed, RunStatus};
use gauntlet_core::types::{ExecutionState, RunId, RunRecord, RunUpdate};

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("failed to serialize results snapshot: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write results file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// On-disk form of the tracker's state. Runs are sorted by run id so
/// consecutive snapshots diff cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultsSnapshot {
    pub updated_at: DateTime<Utc>,
    pub runs: Vec<RunRecord>,
}

#[derive(Debug)]
pub struct StatusTracker {
    runs: Mutex<HashMap<RunId, RunRecord>>,
    results_file: PathBuf,
}

impl StatusTracker {
    pub fn new(results_file: impl Into<PathBuf>) -> Self {
        Self {
            runs: Mutex::new(HashMap::new()),
            results_file: results_file.into(),
        }
    }

    pub fn results_file(&self) -> &Path {
        &self.results_file
    }

    /// Insert all records before execution begins and persist once, so the
    /// results file lists every planned run from the start.
    pub fn register(&self, records: Vec<RunRecord>) -> Result<(), TrackerError> {
        let mut runs = self.lock_runs();
        for record in records {
            runs.insert(record.run_id.clone(), record);
        }
        self.persist(&runs)
    }

    /// Transition a run's status and apply a field update in one persisted
    /// step. An unknown run id is a silent no-op. A disallowed (backward)
    /// transition leaves the status untouched while still applying the fields.
    pub fn update_status(
        &self,
        run_id: &RunId,
        status: RunStatus,
        update: RunUpdate,
    ) -> Result<(), TrackerError> {
        let mut runs = self.lock_runs();
        let Some(record) = runs.get_mut(run_id) else {
            return Ok(());
        };

        if is_transition_allowed(record.status, status) {
            record.status = status;
        } else {
            debug!(
                run = %run_id,
                from = record.status.as_str(),
                to = status.as_str(),
                "ignoring disallowed status transition"
            );
        }
        record.apply(update);
        self.persist(&runs)
    }

    /// Field-only update that never touches the status. Used by the artifact
    /// capture phase, which may run after the terminal transition.
    pub fn record(&self, run_id: &RunId, update: RunUpdate) -> Result<(), TrackerError> {
        let mut runs = self.lock_runs();
        let Some(record) = runs.get_mut(run_id) else {
            return Ok(());
        };
        record.apply(update);
        self.persist(&runs)
    }

    pub fn get(&self, run_id: &RunId) -> Option<RunRecord> {
        self.lock_runs().get(run_id).cloned()
    }

    /// Consistent point-in-time aggregate. Snapshot copy only; holding the
    /// returned state does not block writers.
    pub fn get_state(&self) -> ExecutionState {
        let runs = self.lock_runs();
        ExecutionState::from_runs(sorted_records(&runs))
    }

    fn lock_runs(&self) -> std::sync::MutexGuard<'_, HashMap<RunId, RunRecord>> {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write the full snapshot to `{results_file}.tmp`, then rename it over
    /// the results file. Readers never observe a partial file.
    fn persist(&self, runs: &HashMap<RunId, RunRecord>) -> Result<(), TrackerError> {
        let snapshot = ResultsSnapshot {
            updated_at: Utc::now(),
            runs: sorted_records(runs),
        };
        let body = serde_json::to_vec_pretty(&snapshot)
            .map_err(|source| TrackerError::Serialize { source })?;

        let mut tmp_name = self.results_file.as_os_str().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        fs::write(&tmp_path, &body).map_err(|source| TrackerError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &self.results_file).map_err(|source| TrackerError::Io {
            path: self.results_file.clone(),
            source,
        })
    }
}

fn sorted_records(runs: &HashMap<RunId, RunRecord>) -> Vec<RunRecord> {
    let mut records: Vec<RunRecord> = runs.values().cloned().collect();
    records.sort_by(|a, b| a.run_id.0.cmp(&b.run_id.0));
    records
}
