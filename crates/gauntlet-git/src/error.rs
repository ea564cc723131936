use std::path::PathBuf;
use std::string::FromUtf8Error;

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("git command failed to start ({command}): {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("git command returned non-zero exit ({command}) status={status:?}: {stderr}")]
    CommandFailed {
        command: String,
        status: Option<i32>,
        stdout: String,
        stderr: String,
    },
    #[error("git command output was not valid UTF-8 ({command}, {stream}): {source}")]
    NonUtf8Output {
        command: String,
        stream: &'static str,
        #[source]
        source: FromUtf8Error,
    },
    #[error("git command timed out after {timeout_secs}s ({command})")]
    Timeout { command: String, timeout_secs: u64 },
}

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    /// The source repository could not be bootstrapped to a committed
    /// baseline. Fatal: no isolated checkout can be created without one.
    #[error("failed to initialize repository at {path}: {source}")]
    Initialization {
        path: PathBuf,
        #[source]
        source: GitError,
    },
    #[error("failed to create workspace at {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: GitError,
    },
}

#[cfg(test)]
mod tests {
    use super::{GitError, WorkspaceError};
    use std::error::Error;
    use std::path::PathBuf;

    #[test]
    fn io_variant_includes_command_and_io_message() {
        let err = GitError::Io {
            command: "git status".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing binary"),
        };

        let rendered = err.to_string();
        assert!(rendered.contains("git command failed to start (git status)"));
        assert!(rendered.contains("missing binary"));
        assert!(err.source().is_some());
    }

    #[test]
    fn command_failed_variant_mentions_command_and_diagnostics() {
        let err = GitError::CommandFailed {
            command: "git worktree add /tmp/wt".to_string(),
            status: Some(128),
            stdout: String::new(),
            stderr: "fatal: not a git repository".to_string(),
        };

        let rendered = err.to_string();
        assert!(rendered.contains("git worktree add /tmp/wt"));
        assert!(rendered.contains("status=Some(128)"));
        assert!(rendered.contains("fatal: not a git repository"));
    }

    #[test]
    fn timeout_variant_mentions_bound_and_command() {
        let err = GitError::Timeout {
            command: "git worktree add /tmp/wt".to_string(),
            timeout_secs: 60,
        };
        let rendered = err.to_string();
        assert!(rendered.contains("timed out after 60s"));
        assert!(rendered.contains("git worktree add"));
    }

    #[test]
    fn workspace_errors_carry_path_and_source() {
        let err = WorkspaceError::Create {
            path: PathBuf::from("/tmp/wt/run-1"),
            source: GitError::Timeout {
                command: "git worktree add".to_string(),
                timeout_secs: 60,
            },
        };
        assert!(err.to_string().contains("/tmp/wt/run-1"));
        assert!(err.source().is_some());
    }
}
