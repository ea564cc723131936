//! Session transcript collection.
//!
//! The agent records each conversation as a JSON-lines transcript under
//! `{root}/projects/{project_id}/chats/{session_id}.jsonl`, where the project
//! id is the sanitized workspace path. After a run we copy the newest
//! transcript into the run's output directory, rewriting the recorded working
//! directory so the copy points at the orchestrator's cwd instead of the
//! (soon to be removed) worktree.

use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde_json::Value;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to scan transcript directory {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read transcript {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write transcript copy {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A collected transcript copy and the session id embedded in its filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionArtifact {
    pub path: PathBuf,
    pub session_id: String,
}

/// Locates and copies session transcripts for finished runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCollector {
    transcript_root: PathBuf,
}

impl SessionCollector {
    /// `transcript_root` is the agent's state directory (e.g. `~/.qwen`).
    pub fn new(transcript_root: impl Into<PathBuf>) -> Self {
        Self {
            transcript_root: transcript_root.into(),
        }
    }

    /// Collect the most recently modified transcript for `workspace_dir` into
    /// `output_dir/chats/`, rewriting each well-formed record's `cwd` field to
    /// `rewrite_cwd`. Malformed lines are copied through verbatim. Returns
    /// `None` when no transcript directory or file exists.
    pub fn collect(
        &self,
        workspace_dir: &Path,
        output_dir: &Path,
        rewrite_cwd: &Path,
    ) -> Result<Option<SessionArtifact>, SessionError> {
        let project_id = sanitize_project_id(workspace_dir);
        let chats_dir = self
            .transcript_root
            .join("projects")
            .join(&project_id)
            .join("chats");

        if !chats_dir.is_dir() {
            debug!(path = %chats_dir.display(), "no transcript directory for workspace");
            return Ok(None);
        }

        let Some(source) = newest_transcript(&chats_dir)? else {
            debug!(path = %chats_dir.display(), "no transcript files for workspace");
            return Ok(None);
        };

        let session_id = source
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_name = source
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(format!("{session_id}.jsonl")));

        let chats_output = output_dir.join("chats");
        fs::create_dir_all(&chats_output).map_err(|source| SessionError::Write {
            path: chats_output.clone(),
            source,
        })?;
        let destination = chats_output.join(file_name);

        rewrite_transcript(&source, &destination, rewrite_cwd)?;
        debug!(from = %source.display(), to = %destination.display(), "session transcript collected");

        Ok(Some(SessionArtifact {
            path: destination,
            session_id,
        }))
    }
}

/// Replace every non-alphanumeric byte of the workspace path with `-`,
/// matching the agent's own project-id sanitization.
pub fn sanitize_project_id(workspace_dir: &Path) -> String {
    workspace_dir
        .display()
        .to_string()
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '-' })
        .collect()
}

fn newest_transcript(chats_dir: &Path) -> Result<Option<PathBuf>, SessionError> {
    let entries = fs::read_dir(chats_dir).map_err(|source| SessionError::Scan {
        path: chats_dir.to_path_buf(),
        source,
    })?;

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in entries {
        let entry = entry.map_err(|source| SessionError::Scan {
            path: chats_dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let is_jsonl = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("jsonl"))
            .unwrap_or(false);
        if !path.is_file() || !is_jsonl {
            continue;
        }

        let modified = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let newer = match &newest {
            Some((current, _)) => modified > *current,
            None => true,
        };
        if newer {
            newest = Some((modified, path));
        }
    }

    Ok(newest.map(|(_, path)| path))
}

/// Line-oriented streaming rewrite: parse each line as JSON, replace the
/// `cwd` field, and emit; lines that fail to parse are emitted unchanged in
/// their original position.
fn rewrite_transcript(
    source: &Path,
    destination: &Path,
    rewrite_cwd: &Path,
) -> Result<(), SessionError> {
    let input = fs::File::open(source).map_err(|err| SessionError::Read {
        path: source.to_path_buf(),
        source: err,
    })?;
    let output = fs::File::create(destination).map_err(|err| SessionError::Write {
        path: destination.to_path_buf(),
        source: err,
    })?;

    let reader = BufReader::new(input);
    let mut writer = BufWriter::new(output);
    let cwd_value = Value::String(rewrite_cwd.display().to_string());

    for line in reader.lines() {
        let line = line.map_err(|err| SessionError::Read {
            path: source.to_path_buf(),
            source: err,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let rewritten = match serde_json::from_str::<Value>(trimmed) {
            Ok(mut record) => {
                if let Some(object) = record.as_object_mut() {
                    object.insert("cwd".to_string(), cwd_value.clone());
                }
                record.to_string()
            }
            Err(_) => trimmed.to_string(),
        };

        writeln!(writer, "{rewritten}").map_err(|err| SessionError::Write {
            path: destination.to_path_buf(),
            source: err,
        })?;
    }

    writer.flush().map_err(|err| SessionError::Write {
        path: destination.to_path_buf(),
        source: err,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::{SystemTime, UNIX_EPOCH};

    use serde_json::Value;

    use super::{sanitize_project_id, SessionCollector};

    fn unique_temp_dir(prefix: &str) -> PathBuf {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let path = std::env::temp_dir().join(format!("gauntlet-session-{prefix}-{now}"));
        fs::create_dir_all(&path).expect("create temp dir");
        path
    }

    fn seed_transcript(root: &Path, workspace: &Path, name: &str, body: &str) -> PathBuf {
        let chats = root
            .join("projects")
            .join(sanitize_project_id(workspace))
            .join("chats");
        fs::create_dir_all(&chats).expect("create chats dir");
        let path = chats.join(name);
        fs::write(&path, body).expect("write transcript");
        path
    }

    #[test]
    fn sanitize_replaces_non_alphanumeric_with_dashes() {
        let id = sanitize_project_id(Path::new("/tmp/wt/run_1.x"));
        assert_eq!(id, "-tmp-wt-run-1-x");
    }

    #[test]
    fn collect_returns_none_without_transcript_directory() {
        let root = unique_temp_dir("none-root");
        let workspace = unique_temp_dir("none-ws");
        let output = unique_temp_dir("none-out");

        let collector = SessionCollector::new(&root);
        let artifact = collector
            .collect(&workspace, &output, Path::new("/cwd"))
            .expect("collect");
        assert!(artifact.is_none());

        for dir in [root, workspace, output] {
            let _ = fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn collect_rewrites_cwd_and_preserves_malformed_lines() {
        let root = unique_temp_dir("rewrite-root");
        let workspace = unique_temp_dir("rewrite-ws");
        let output = unique_temp_dir("rewrite-out");

        seed_transcript(
            &root,
            &workspace,
            "session-abc.jsonl",
            "{\"cwd\": \"/old/path\", \"role\": \"user\"}\nnot json at all\n",
        );

        let collector = SessionCollector::new(&root);
        let artifact = collector
            .collect(&workspace, &output, Path::new("/actual/cwd"))
            .expect("collect")
            .expect("artifact present");

        assert_eq!(artifact.session_id, "session-abc");
        assert_eq!(
            artifact.path,
            output.join("chats").join("session-abc.jsonl")
        );

        let body = fs::read_to_string(&artifact.path).expect("read copy");
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);

        let record: Value = serde_json::from_str(lines[0]).expect("first line is json");
        assert_eq!(record["cwd"], "/actual/cwd");
        assert_eq!(record["role"], "user");
        assert_eq!(lines[1], "not json at all");

        for dir in [root, workspace, output] {
            let _ = fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn collect_picks_most_recently_modified_transcript() {
        let root = unique_temp_dir("newest-root");
        let workspace = unique_temp_dir("newest-ws");
        let output = unique_temp_dir("newest-out");

        let older = seed_transcript(&root, &workspace, "older.jsonl", "{\"cwd\": \"/a\"}\n");
        // Push the first file's mtime into the past so ordering does not
        // depend on filesystem timestamp resolution.
        let past = filetime_from_secs_ago(&older, 3600);
        assert!(past.is_ok());
        seed_transcript(&root, &workspace, "newer.jsonl", "{\"cwd\": \"/b\"}\n");

        let collector = SessionCollector::new(&root);
        let artifact = collector
            .collect(&workspace, &output, Path::new("/cwd"))
            .expect("collect")
            .expect("artifact present");
        assert_eq!(artifact.session_id, "newer");

        for dir in [root, workspace, output] {
            let _ = fs::remove_dir_all(dir);
        }
    }

    fn filetime_from_secs_ago(path: &Path, secs: u64) -> std::io::Result<()> {
        let past = SystemTime::now() - std::time::Duration::from_secs(secs);
        let file = fs::File::options().append(true).open(path)?;
        file.set_modified(past)
    }

    #[test]
    fn collect_ignores_non_jsonl_files() {
        let root = unique_temp_dir("filter-root");
        let workspace = unique_temp_dir("filter-ws");
        let output = unique_temp_dir("filter-out");

        let chats = root
            .join("projects")
            .join(sanitize_project_id(&workspace))
            .join("chats");
        fs::create_dir_all(&chats).expect("create chats dir");
        fs::write(chats.join("notes.txt"), "not a transcript\n").expect("write txt");

        let collector = SessionCollector::new(&root);
        let artifact = collector
            .collect(&workspace, &output, Path::new("/cwd"))
            .expect("collect");
        assert!(artifact.is_none());

        for dir in [root, workspace, output] {
            let _ = fs::remove_dir_all(dir);
        }
    }
}
