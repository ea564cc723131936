//! Configuration for one harness execution.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::TaskDef;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {message}")]
    Invalid { message: String },
}

/// Execution configuration, loaded from a JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub tasks: Vec<TaskDef>,
    pub models: Vec<String>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_yolo")]
    pub yolo: bool,
    #[serde(default = "default_source_repo")]
    pub source_repo: PathBuf,
    #[serde(default = "default_worktree_base")]
    pub worktree_base: PathBuf,
    #[serde(default = "default_outputs_dir")]
    pub outputs_dir: PathBuf,
    #[serde(default = "default_results_file")]
    pub results_file: PathBuf,
    #[serde(default)]
    pub branch: Option<String>,
    /// Retain worktrees after each run instead of tearing them down.
    #[serde(default)]
    pub keep_worktree: bool,
    #[serde(default = "default_agent_bin")]
    pub agent_bin: PathBuf,
}

fn default_concurrency() -> usize {
    4
}

fn default_yolo() -> bool {
    true
}

fn default_source_repo() -> PathBuf {
    PathBuf::from(".")
}

fn default_worktree_base() -> PathBuf {
    PathBuf::from("~/.qwen/worktrees")
}

fn default_outputs_dir() -> PathBuf {
    PathBuf::from("./outputs")
}

fn default_results_file() -> PathBuf {
    PathBuf::from("./results.json")
}

fn default_agent_bin() -> PathBuf {
    PathBuf::from("qwen")
}

pub fn parse_run_config(contents: &str) -> Result<RunConfig, serde_json::Error> {
    serde_json::from_str(contents)
}

pub fn load_run_config(path: impl AsRef<Path>) -> Result<RunConfig, ConfigError> {
    let path_ref = path.as_ref();
    let body = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
        path: path_ref.to_path_buf(),
        source,
    })?;
    let mut config = parse_run_config(&body).map_err(|source| ConfigError::Parse {
        path: path_ref.to_path_buf(),
        source,
    })?;
    config.worktree_base = expand_home(&config.worktree_base);
    config.validate()?;
    Ok(config)
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tasks.is_empty() {
            return Err(ConfigError::Invalid {
                message: "at least one task is required".to_string(),
            });
        }
        if self.models.is_empty() {
            return Err(ConfigError::Invalid {
                message: "at least one model is required".to_string(),
            });
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid {
                message: "concurrency must be greater than zero".to_string(),
            });
        }
        for task in &self.tasks {
            if task.prompts.is_empty() {
                return Err(ConfigError::Invalid {
                    message: format!("task '{}' has no prompts", task.id),
                });
            }
        }
        Ok(())
    }
}

/// Expand a leading `~` to the caller's home directory. Paths without the
/// prefix (or when HOME is unset) pass through untouched.
pub fn expand_home(path: &Path) -> PathBuf {
    let Some(raw) = path.to_str() else {
        return path.to_path_buf();
    };
    let Some(rest) = raw.strip_prefix("~/").or_else(|| {
        if raw == "~" {
            Some("")
        } else {
            None
        }
    }) else {
        return path.to_path_buf();
    };
    match std::env::var("HOME") {
        Ok(home) if !home.is_empty() => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}
