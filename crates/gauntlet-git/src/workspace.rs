use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::command::GitCli;
use crate::error::{GitError, WorkspaceError};

/// Manages isolated, branch-scoped checkouts of one source repository.
///
/// Each run gets its own worktree so concurrent runs never share mutable
/// files. Creation failures are per-run; only [`ensure_initialized`] failures
/// are fatal to the whole execution.
///
/// [`ensure_initialized`]: WorkspaceManager::ensure_initialized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceManager {
    git: GitCli,
    source_repo: PathBuf,
}

impl WorkspaceManager {
    pub fn new(git: GitCli, source_repo: impl Into<PathBuf>) -> Self {
        Self {
            git,
            source_repo: source_repo.into(),
        }
    }

    pub fn source_repo(&self) -> &Path {
        &self.source_repo
    }

    /// Guarantee the source repository is a git repository with at least one
    /// commit; bootstrap one if needed. Without a committed baseline no
    /// worktree can be created, so any failure here is fatal.
    pub fn ensure_initialized(&self) -> Result<(), WorkspaceError> {
        if self.source_repo.join(".git").exists() {
            return Ok(());
        }

        debug!(repo = %self.source_repo.display(), "initializing git repository");
        // The bootstrap commit pins an identity so it works on hosts without
        // global git config.
        for args in [
            vec!["init"],
            vec!["add", "."],
            vec![
                "-c",
                "user.name=gauntlet",
                "-c",
                "user.email=gauntlet@localhost",
                "commit",
                "-m",
                "Initial commit",
            ],
        ] {
            self.git
                .run(&self.source_repo, &args)
                .map_err(|source| WorkspaceError::Initialization {
                    path: self.source_repo.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Create a new isolated checkout rooted at `target_dir`.
    ///
    /// With a base branch, a run-unique derived branch
    /// `{branch}-{target_dir basename}` is created from it; otherwise the
    /// checkout tracks the repository's current HEAD.
    pub fn create(
        &self,
        target_dir: &Path,
        branch: Option<&str>,
    ) -> Result<PathBuf, WorkspaceError> {
        if let Some(parent) = target_dir.parent() {
            fs::create_dir_all(parent).map_err(|source| WorkspaceError::Create {
                path: target_dir.to_path_buf(),
                source: GitError::Io {
                    command: format!("create_dir_all {}", parent.display()),
                    source,
                },
            })?;
        }

        let target = target_dir.display().to_string();
        let args: Vec<String> = match branch {
            Some(base) => {
                let derived = derived_branch_name(base, target_dir);
                debug!(branch = %derived, base, "creating worktree on derived branch");
                vec![
                    "worktree".to_string(),
                    "add".to_string(),
                    "-b".to_string(),
                    derived,
                    target,
                    base.to_string(),
                ]
            }
            None => vec!["worktree".to_string(), "add".to_string(), target],
        };

        self.git
            .run(&self.source_repo, &args)
            .map_err(|source| WorkspaceError::Create {
                path: target_dir.to_path_buf(),
                source,
            })?;

        Ok(target_dir.to_path_buf())
    }

    /// Best-effort teardown. Removing an already-absent directory succeeds
    /// silently; a failed `git worktree remove` falls back to a forced
    /// filesystem delete. Never raises: cleanup must not block termination.
    pub fn remove(&self, target_dir: &Path) {
        if !target_dir.exists() {
            return;
        }

        let target = target_dir.display().to_string();
        if let Err(err) = self.git.run(
            &self.source_repo,
            ["worktree", "remove", "--force", target.as_str()],
        ) {
            warn!(path = %target_dir.display(), %err, "worktree remove failed, deleting directory");
            if let Err(err) = fs::remove_dir_all(target_dir) {
                warn!(path = %target_dir.display(), %err, "forced workspace delete failed");
            }
        }
    }

    /// Stage everything in the checkout (new files included) and return the
    /// complete staged diff. Best-effort: failures log a warning and yield an
    /// empty diff rather than masking the run's actual outcome.
    pub fn diff(&self, target_dir: &Path) -> String {
        if let Err(err) = self.git.run(target_dir, ["add", "-A"]) {
            warn!(path = %target_dir.display(), %err, "failed to stage changes for diff");
        }

        match self
            .git
            .run(target_dir, ["diff", "--cached", "--no-color"])
        {
            Ok(output) => output.stdout,
            Err(err) => {
                warn!(path = %target_dir.display(), %err, "failed to capture diff");
                String::new()
            }
        }
    }
}

fn derived_branch_name(base: &str, target_dir: &Path) -> String {
    let basename = target_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{base}-{basename}")
}
