//! Core types for the task × model harness.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::state::RunStatus;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RunId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A task definition: an ordered prompt sequence executed in one workspace.
/// Immutable once loaded; many runs may reference one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDef {
    pub id: TaskId,
    pub name: String,
    pub prompts: Vec<String>,
}

/// One cell of the task × model matrix. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunUnit {
    pub run_id: RunId,
    pub task: TaskDef,
    pub model: String,
}

/// Result of a single prompt invocation. Appended in prompt order, never
/// reordered or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptResult {
    /// 1-based index within the task's prompt sequence.
    pub prompt_index: usize,
    pub prompt_text: String,
    pub stdout_file: PathBuf,
    pub stderr_file: PathBuf,
    pub exit_code: i32,
    pub succeeded: bool,
}

/// Mutable execution record for one run; the persisted set of records is the
/// permanent audit trail of an execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub task_id: TaskId,
    pub task_name: String,
    pub model: String,
    pub status: RunStatus,
    pub worktree_path: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub logs_dir: Option<PathBuf>,
    pub stdout_file: Option<PathBuf>,
    pub stderr_file: Option<PathBuf>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub error_message: Option<String>,
    #[serde(default)]
    pub prompt_results: Vec<PromptResult>,
    pub diff_file: Option<PathBuf>,
    pub session_log_file: Option<PathBuf>,
    pub session_id: Option<String>,
}

impl RunRecord {
    /// Create a queued record for a matrix cell.
    pub fn queued(unit: &RunUnit) -> Self {
        Self {
            run_id: unit.run_id.clone(),
            task_id: unit.task.id.clone(),
            task_name: unit.task.name.clone(),
            model: unit.model.clone(),
            status: RunStatus::Queued,
            worktree_path: None,
            output_dir: None,
            logs_dir: None,
            stdout_file: None,
            stderr_file: None,
            started_at: None,
            ended_at: None,
            exit_code: None,
            error_message: None,
            prompt_results: Vec::new(),
            diff_file: None,
            session_log_file: None,
            session_id: None,
        }
    }

    /// Apply a partial update. Prompt results are appended, everything else
    /// replaces the current value when present.
    pub fn apply(&mut self, update: RunUpdate) {
        if let Some(path) = update.worktree_path {
            self.worktree_path = Some(path);
        }
        if let Some(path) = update.output_dir {
            self.output_dir = Some(path);
        }
        if let Some(path) = update.logs_dir {
            self.logs_dir = Some(path);
        }
        if let Some(path) = update.stdout_file {
            self.stdout_file = Some(path);
        }
        if let Some(path) = update.stderr_file {
            self.stderr_file = Some(path);
        }
        if let Some(at) = update.started_at {
            self.started_at = Some(at);
        }
        if let Some(at) = update.ended_at {
            self.ended_at = Some(at);
        }
        if let Some(code) = update.exit_code {
            self.exit_code = Some(code);
        }
        if let Some(message) = update.error_message {
            self.error_message = Some(message);
        }
        if let Some(result) = update.prompt_result {
            self.prompt_results.push(result);
        }
        if let Some(path) = update.diff_file {
            self.diff_file = Some(path);
        }
        if let Some(path) = update.session_log_file {
            self.session_log_file = Some(path);
        }
        if let Some(id) = update.session_id {
            self.session_id = Some(id);
        }
    }
}

/// Enumerated partial update for a [`RunRecord`]: one optional field per
/// mutable attribute, so the tracker's contract is statically checkable.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunUpdate {
    pub worktree_path: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub logs_dir: Option<PathBuf>,
    pub stdout_file: Option<PathBuf>,
    pub stderr_file: Option<PathBuf>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub error_message: Option<String>,
    /// Appended to the record's ordered prompt result list.
    pub prompt_result: Option<PromptResult>,
    pub diff_file: Option<PathBuf>,
    pub session_log_file: Option<PathBuf>,
    pub session_id: Option<String>,
}

impl RunUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_worktree_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.worktree_path = Some(path.into());
        self
    }

    pub fn with_output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    pub fn with_logs_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.logs_dir = Some(path.into());
        self
    }

    pub fn with_stdout_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout_file = Some(path.into());
        self
    }

    pub fn with_stderr_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stderr_file = Some(path.into());
        self
    }

    pub fn with_started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn with_ended_at(mut self, at: DateTime<Utc>) -> Self {
        self.ended_at = Some(at);
        self
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_prompt_result(mut self, result: PromptResult) -> Self {
        self.prompt_result = Some(result);
        self
    }

    pub fn with_diff_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.diff_file = Some(path.into());
        self
    }

    pub fn with_session_log(mut self, path: impl Into<PathBuf>, id: impl Into<String>) -> Self {
        self.session_log_file = Some(path.into());
        self.session_id = Some(id.into());
        self
    }
}

/// Derived aggregate over all run records. Computed on demand from the
/// tracker's map, never persisted as its own entity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecutionState {
    pub runs: Vec<RunRecord>,
    pub total: usize,
    pub completed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl ExecutionState {
    pub fn from_runs(runs: Vec<RunRecord>) -> Self {
        let completed = runs.iter().filter(|r| r.status.is_terminal()).count();
        let succeeded = runs
            .iter()
            .filter(|r| r.status == RunStatus::Succeeded)
            .count();
        let failed = runs
            .iter()
            .filter(|r| r.status == RunStatus::Failed)
            .count();

        Self {
            total: runs.len(),
            completed,
            succeeded,
            failed,
            runs,
        }
    }

    pub fn all_terminal(&self) -> bool {
        self.completed >= self.total
    }
}
