//! Matrix driver: expands the task × model matrix and executes it over a
//! bounded worker pool.
//!
//! Failures are isolated per run. The only fatal startup errors are directory
//! creation, the initial tracker registration, and source repository
//! initialization; everything after that folds into a FAILED record for the
//! affected run.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tracing::warn;

use gauntlet_core::config::{expand_home, RunConfig};
use gauntlet_core::state::RunStatus;
use gauntlet_core::types::{ExecutionState, RunId, RunRecord, RunUnit, RunUpdate};
use gauntlet_git::{GitCli, SessionCollector, WorkspaceError, WorkspaceManager};

use crate::display;
use crate::executor::{AgentCli, RunExecutor};
use crate::tracker::{StatusTracker, TrackerError};

const DISPLAY_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

/// One unit per (task, model) pair, in task-major order. Run ids embed a
/// nanosecond timestamp plus a sequence number so they never collide within
/// an execution.
pub fn expand_matrix(config: &RunConfig) -> Vec<RunUnit> {
    let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let mut units = Vec::with_capacity(config.tasks.len() * config.models.len());
    let mut seq = 0usize;
    for task in &config.tasks {
        for model in &config.models {
            units.push(RunUnit {
                run_id: RunId::new(format!("{stamp:x}-{seq}")),
                task: task.clone(),
                model: model.clone(),
            });
            seq += 1;
        }
    }
    units
}

pub fn run_all(
    config: &RunConfig,
    tracker: &StatusTracker,
    interrupt: &AtomicBool,
) -> Result<ExecutionState, DriverError> {
    let executor = AgentCli::from_config(config);
    run_all_with(config, &executor, tracker, interrupt)
}

pub fn run_all_with<E: RunExecutor>(
    config: &RunConfig,
    executor: &E,
    tracker: &StatusTracker,
    interrupt: &AtomicBool,
) -> Result<ExecutionState, DriverError> {
    for dir in [&config.worktree_base, &config.outputs_dir] {
        fs::create_dir_all(dir).map_err(|source| DriverError::CreateDir {
            path: dir.clone(),
            source,
        })?;
    }

    let units = expand_matrix(config);
    tracker.register(units.iter().map(RunRecord::queued).collect())?;

    let manager = WorkspaceManager::new(GitCli::default(), &config.source_repo);
    manager.ensure_initialized()?;
    let collector = SessionCollector::new(expand_home(Path::new("~/.qwen")));

    let (tx, rx) = mpsc::channel::<RunUnit>();
    let unit_count = units.len();
    for unit in units {
        // The receiver lives below; this cannot fail before it is dropped.
        let _ = tx.send(unit);
    }
    drop(tx);

    let rx = Mutex::new(rx);
    let workers = config.concurrency.min(unit_count).max(1);
    let done = AtomicBool::new(false);

    thread::scope(|scope| {
        let worker_handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(|| loop {
                    if interrupt.load(Ordering::Relaxed) {
                        break;
                    }
                    // The channel was fully filled before workers started, so
                    // recv under the lock returns without blocking.
                    let next = rx
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .recv();
                    match next {
                        Ok(unit) => {
                            execute_single_run(
                                &unit, config, &manager, &collector, executor, tracker,
                            );
                        }
                        Err(_) => break,
                    }
                })
            })
            .collect();

        let display_handle = scope.spawn(|| loop {
            let state = tracker.get_state();
            display::render_progress(&state);
            if done.load(Ordering::Relaxed) {
                break;
            }
            thread::sleep(DISPLAY_POLL_INTERVAL);
        });

        for handle in worker_handles {
            let _ = handle.join();
        }
        done.store(true, Ordering::Relaxed);
        let _ = display_handle.join();
    });

    Ok(tracker.get_state())
}

/// The per-run protocol. Never panics or propagates: any failure lands in
/// this run's FAILED record, artifact capture and teardown always run.
fn execute_single_run<E: RunExecutor>(
    unit: &RunUnit,
    config: &RunConfig,
    manager: &WorkspaceManager,
    collector: &SessionCollector,
    executor: &E,
    tracker: &StatusTracker,
) {
    let worktree = config.worktree_base.join(unit.run_id.as_ref());
    let output_dir = config.outputs_dir.join(unit.run_id.as_ref());

    if let Err(err) = run_protocol(unit, &worktree, &output_dir, config, manager, executor, tracker)
    {
        if let Err(tracker_err) = tracker.update_status(
            &unit.run_id,
            RunStatus::Failed,
            RunUpdate::new()
                .with_error_message(format!("{err:#}"))
                .with_ended_at(Utc::now()),
        ) {
            warn!(run = %unit.run_id, %tracker_err, "failed to persist run failure");
        }
    }

    capture_artifacts(unit, &worktree, &output_dir, manager, collector, tracker);

    if !config.keep_worktree {
        manager.remove(&worktree);
    }

    if let Some(record) = tracker.get(&unit.run_id) {
        display::announce_run(&record);
    }
}

fn run_protocol<E: RunExecutor>(
    unit: &RunUnit,
    worktree: &Path,
    output_dir: &Path,
    config: &RunConfig,
    manager: &WorkspaceManager,
    executor: &E,
    tracker: &StatusTracker,
) -> anyhow::Result<()> {
    tracker.update_status(
        &unit.run_id,
        RunStatus::Preparing,
        RunUpdate::new()
            .with_worktree_path(worktree)
            .with_started_at(Utc::now()),
    )?;
    manager
        .create(worktree, config.branch.as_deref())
        .context("workspace creation failed")?;

    tracker.update_status(&unit.run_id, RunStatus::Running, RunUpdate::new())?;
    executor.execute(unit, worktree, output_dir, tracker)?;

    tracker.update_status(
        &unit.run_id,
        RunStatus::Succeeded,
        RunUpdate::new().with_ended_at(Utc::now()),
    )?;
    Ok(())
}

/// Best-effort capture of the diff and session transcript. Each step is
/// independently caught and warn-logged so one failed capture never skips
/// the next, and the terminal status is never disturbed.
fn capture_artifacts(
    unit: &RunUnit,
    worktree: &Path,
    output_dir: &Path,
    manager: &WorkspaceManager,
    collector: &SessionCollector,
    tracker: &StatusTracker,
) {
    if !worktree.exists() {
        return;
    }

    let diff = manager.diff(worktree);
    if !diff.trim().is_empty() {
        let diff_file = output_dir.join("diff.patch");
        let written = fs::create_dir_all(output_dir).and_then(|_| fs::write(&diff_file, &diff));
        match written {
            Ok(()) => {
                if let Err(err) =
                    tracker.record(&unit.run_id, RunUpdate::new().with_diff_file(&diff_file))
                {
                    warn!(run = %unit.run_id, %err, "failed to attach diff to record");
                }
            }
            Err(err) => {
                warn!(run = %unit.run_id, %err, "failed to write diff file");
            }
        }
    }

    let rewrite_cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    match collector.collect(worktree, output_dir, &rewrite_cwd) {
        Ok(Some(artifact)) => {
            if let Err(err) = tracker.record(
                &unit.run_id,
                RunUpdate::new().with_session_log(artifact.path, artifact.session_id),
            ) {
                warn!(run = %unit.run_id, %err, "failed to attach session transcript to record");
            }
        }
        Ok(None) => {}
        Err(err) => {
            warn!(run = %unit.run_id, %err, "failed to collect session transcript");
        }
    }
}
