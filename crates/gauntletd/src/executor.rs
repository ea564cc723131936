//! Agent invocation for one run.
//!
//! Each prompt in the task's sequence is a separate agent process executed
//! inside the run's workspace; `--continue` resumes the session from the
//! second prompt on. Output is streamed line by line to per-prompt capture
//! files so long sessions never buffer in memory.

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use tracing::debug;

use gauntlet_core::config::RunConfig;
use gauntlet_core::types::{PromptResult, RunUnit, RunUpdate};

use crate::tracker::{StatusTracker, TrackerError};

/// Environment variable pointing the agent at its workspace root.
pub const AGENT_ROOT_ENV: &str = "QWEN_CODE_ROOT";

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to open capture file {path}: {source}")]
    Capture {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to spawn agent ({command}): {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to wait for agent ({command}): {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("prompt {index} exited with code {exit_code}")]
    PromptFailed { index: usize, exit_code: i32 },
    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

/// Seam between the driver and the real agent binary, so scheduling can be
/// exercised without spawning processes.
pub trait RunExecutor: Send + Sync {
    fn execute(
        &self,
        unit: &RunUnit,
        workspace_dir: &Path,
        output_dir: &Path,
        tracker: &StatusTracker,
    ) -> Result<(), ExecutorError>;
}

/// Builds and runs agent invocations for each prompt of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCli {
    pub binary: PathBuf,
    pub yolo: bool,
}

impl AgentCli {
    pub fn new(binary: impl Into<PathBuf>, yolo: bool) -> Self {
        Self {
            binary: binary.into(),
            yolo,
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(&config.agent_bin, config.yolo)
    }

    /// Argument list for one prompt invocation. `--continue` resumes the
    /// session and is only valid from the second prompt on.
    pub fn prompt_args(
        &self,
        model: &str,
        logs_dir: &Path,
        prompt: &str,
        continue_session: bool,
    ) -> Vec<String> {
        let mut args = vec!["--model".to_string(), model.to_string()];
        if self.yolo {
            args.push("--yolo".to_string());
        }
        args.push("--openai-logging".to_string());
        args.push("--openai-logging-dir".to_string());
        args.push(logs_dir.display().to_string());
        if continue_session {
            args.push("--continue".to_string());
        }
        args.push("--prompt".to_string());
        args.push(prompt.to_string());
        args
    }

    fn run_prompt(
        &self,
        unit: &RunUnit,
        workspace_dir: &Path,
        logs_dir: &Path,
        outputs_dir: &Path,
        index: usize,
        prompt: &str,
        tracker: &StatusTracker,
    ) -> Result<PromptResult, ExecutorError> {
        let stdout_path = outputs_dir.join(format!("stdout-{index}.txt"));
        let stderr_path = outputs_dir.join(format!("stderr-{index}.txt"));
        let stdout_file = create_capture_file(&stdout_path)?;
        let stderr_file = create_capture_file(&stderr_path)?;

        let args = self.prompt_args(&unit.model, logs_dir, prompt, index > 1);
        let rendered = render_command(&self.binary, &args);
        debug!(run = %unit.run_id, index, command = %rendered, "starting agent prompt");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .current_dir(workspace_dir)
            .env(AGENT_ROOT_ENV, workspace_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExecutorError::Spawn {
                command: rendered.clone(),
                source,
            })?;

        let stdout_handle = spawn_capture_thread(child.stdout.take(), stdout_file);
        let stderr_handle = spawn_capture_thread(child.stderr.take(), stderr_file);

        let status = child.wait().map_err(|source| ExecutorError::Wait {
            command: rendered,
            source,
        })?;
        let _ = stdout_handle.join();
        let _ = stderr_handle.join();

        let exit_code = status.code().unwrap_or(-1);
        let result = PromptResult {
            prompt_index: index,
            prompt_text: prompt.to_string(),
            stdout_file: stdout_path,
            stderr_file: stderr_path,
            exit_code,
            succeeded: status.success(),
        };
        tracker.record(
            &unit.run_id,
            RunUpdate::new().with_prompt_result(result.clone()),
        )?;
        Ok(result)
    }
}

impl RunExecutor for AgentCli {
    /// Run the unit's prompt sequence to completion or first failure. The
    /// failing prompt's result is recorded before the error returns; later
    /// prompts are never attempted.
    fn execute(
        &self,
        unit: &RunUnit,
        workspace_dir: &Path,
        output_dir: &Path,
        tracker: &StatusTracker,
    ) -> Result<(), ExecutorError> {
        let outputs_dir = output_dir.join("outputs");
        let logs_dir = output_dir.join("openai-logs");
        for dir in [output_dir, &outputs_dir, &logs_dir] {
            fs::create_dir_all(dir).map_err(|source| ExecutorError::OutputDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        tracker.record(
            &unit.run_id,
            RunUpdate::new()
                .with_output_dir(output_dir)
                .with_logs_dir(&logs_dir),
        )?;

        let mut first_prompt: Option<PromptResult> = None;
        for (offset, prompt) in unit.task.prompts.iter().enumerate() {
            let index = offset + 1;
            let result = self.run_prompt(
                unit,
                workspace_dir,
                &logs_dir,
                &outputs_dir,
                index,
                prompt,
                tracker,
            )?;

            if !result.succeeded {
                tracker.record(
                    &unit.run_id,
                    RunUpdate::new().with_exit_code(result.exit_code),
                )?;
                return Err(ExecutorError::PromptFailed {
                    index,
                    exit_code: result.exit_code,
                });
            }
            if first_prompt.is_none() {
                first_prompt = Some(result);
            }
        }

        // The record's primary capture files point at prompt 1, matching the
        // single-prompt layout consumers already read.
        let mut update = RunUpdate::new().with_exit_code(0);
        if let Some(first) = first_prompt {
            update = update
                .with_stdout_file(first.stdout_file)
                .with_stderr_file(first.stderr_file);
        }
        tracker.record(&unit.run_id, update)?;
        Ok(())
    }
}

fn create_capture_file(path: &Path) -> Result<fs::File, ExecutorError> {
    fs::File::create(path).map_err(|source| ExecutorError::Capture {
        path: path.to_path_buf(),
        source,
    })
}

/// Stream one pipe to its capture file line by line, flushing per line so
/// partial output survives a crash.
fn spawn_capture_thread<R>(pipe: Option<R>, mut file: fs::File) -> thread::JoinHandle<()>
where
    R: std::io::Read + Send + 'static,
{
    thread::spawn(move || {
        let Some(reader) = pipe else {
            return;
        };
        let mut buffered = BufReader::new(reader);
        loop {
            let mut line = String::new();
            match buffered.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {
                    if file.write_all(line.as_bytes()).is_err() {
                        break;
                    }
                    let _ = file.flush();
                }
                Err(_) => break,
            }
        }
    })
}

fn render_command(binary: &Path, args: &[String]) -> String {
    let mut rendered = binary.to_string_lossy().into_owned();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(arg);
    }
    rendered
}
