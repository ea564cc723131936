//! Console progress rendering over [`ExecutionState`] snapshots.
//!
//! Pure presentation: the formatters take a snapshot and return text, the
//! print wrappers write it. Nothing here mutates tracker state.

use std::io::Write;

use gauntlet_core::state::RunStatus;
use gauntlet_core::types::{ExecutionState, RunRecord};

pub fn format_progress(state: &ExecutionState) -> String {
    let active = state
        .runs
        .iter()
        .filter(|run| run.status.is_active())
        .count();
    format!(
        "[{}/{}] {} succeeded, {} failed, {} active",
        state.completed, state.total, state.succeeded, state.failed, active
    )
}

pub fn format_run_line(record: &RunRecord) -> String {
    let label = format!(
        "run {} ({} x {})",
        record.run_id, record.task_name, record.model
    );
    match record.status {
        RunStatus::Succeeded => format!("{label} succeeded"),
        RunStatus::Failed => format!(
            "{label} failed: {}",
            record.error_message.as_deref().unwrap_or("unknown error")
        ),
        other => format!("{label} {}", other.as_str()),
    }
}

pub fn format_summary(state: &ExecutionState) -> String {
    let rate = if state.total > 0 {
        state.succeeded as f64 / state.total as f64 * 100.0
    } else {
        100.0
    };
    let mut lines = vec![
        "==== execution summary ====".to_string(),
        format!("total:     {}", state.total),
        format!("succeeded: {}", state.succeeded),
        format!("failed:    {}", state.failed),
    ];
    let unfinished = state.total - state.completed;
    if unfinished > 0 {
        lines.push(format!("unfinished: {unfinished}"));
    }
    lines.push(format!("success rate: {rate:.1}%"));
    lines.join("\n")
}

/// Overwrite the current console line with the progress counter.
pub fn render_progress(state: &ExecutionState) {
    print!("\r{}    ", format_progress(state));
    let _ = std::io::stdout().flush();
}

pub fn announce_run(record: &RunRecord) {
    println!("\r{}", format_run_line(record));
}

pub fn print_summary(state: &ExecutionState) {
    println!("\n{}", format_summary(state));
}

#[cfg(test)]
mod tests {
    use gauntlet_core::state::RunStatus;
    use gauntlet_core::types::{ExecutionState, RunId, RunRecord, RunUnit, TaskDef, TaskId};

    use super::{format_progress, format_run_line, format_summary};

    fn mk_record(run_id: &str, status: RunStatus) -> RunRecord {
        let unit = RunUnit {
            run_id: RunId::new(run_id),
            task: TaskDef {
                id: TaskId::new("T1"),
                name: "First task".to_string(),
                prompts: vec!["go".to_string()],
            },
            model: "model-a".to_string(),
        };
        let mut record = RunRecord::queued(&unit);
        record.status = status;
        record
    }

    #[test]
    fn progress_line_counts_terminal_and_active_runs() {
        let state = ExecutionState::from_runs(vec![
            mk_record("r-1", RunStatus::Succeeded),
            mk_record("r-2", RunStatus::Failed),
            mk_record("r-3", RunStatus::Running),
            mk_record("r-4", RunStatus::Queued),
        ]);

        let line = format_progress(&state);
        assert_eq!(line, "[2/4] 1 succeeded, 1 failed, 1 active");
    }

    #[test]
    fn run_line_includes_failure_message() {
        let mut record = mk_record("r-1", RunStatus::Failed);
        record.error_message = Some("prompt 2 exited with code 2".to_string());

        let line = format_run_line(&record);
        assert!(line.contains("r-1"));
        assert!(line.contains("failed: prompt 2 exited with code 2"));
    }

    #[test]
    fn run_line_defaults_missing_failure_message() {
        let record = mk_record("r-1", RunStatus::Failed);
        assert!(format_run_line(&record).contains("unknown error"));
    }

    #[test]
    fn summary_reports_success_rate() {
        let state = ExecutionState::from_runs(vec![
            mk_record("r-1", RunStatus::Succeeded),
            mk_record("r-2", RunStatus::Succeeded),
            mk_record("r-3", RunStatus::Failed),
            mk_record("r-4", RunStatus::Succeeded),
        ]);

        let summary = format_summary(&state);
        assert!(summary.contains("total:     4"));
        assert!(summary.contains("succeeded: 3"));
        assert!(summary.contains("failed:    1"));
        assert!(summary.contains("success rate: 75.0%"));
        assert!(!summary.contains("unfinished"));
    }

    #[test]
    fn summary_flags_unfinished_runs_after_interrupt() {
        let state = ExecutionState::from_runs(vec![
            mk_record("r-1", RunStatus::Succeeded),
            mk_record("r-2", RunStatus::Queued),
        ]);

        let summary = format_summary(&state);
        assert!(summary.contains("unfinished: 1"));
        assert!(summary.contains("success rate: 50.0%"));
    }
}
