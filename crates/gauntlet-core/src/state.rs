//! Run status state machine.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Queued,
    Preparing,
    Running,
    Cleaning,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Preparing => "preparing",
            RunStatus::Running => "running",
            RunStatus::Cleaning => "cleaning",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        }
    }

    /// Terminal statuses are never left once entered.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }

    /// True while the run holds an admission slot (workspace creation through
    /// agent execution).
    pub fn is_active(self) -> bool {
        matches!(self, RunStatus::Preparing | RunStatus::Running)
    }

    fn rank(self) -> u8 {
        match self {
            RunStatus::Queued => 0,
            RunStatus::Preparing => 1,
            RunStatus::Running => 2,
            RunStatus::Cleaning => 3,
            RunStatus::Succeeded | RunStatus::Failed => 4,
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "queued" => Ok(RunStatus::Queued),
            "preparing" => Ok(RunStatus::Preparing),
            "running" => Ok(RunStatus::Running),
            "cleaning" => Ok(RunStatus::Cleaning),
            "succeeded" => Ok(RunStatus::Succeeded),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!(
                "invalid run status '{other}'. valid values: queued, preparing, running, cleaning, succeeded, failed"
            )),
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check if a status transition is valid.
///
/// Transitions are strictly forward:
/// ```text
/// Queued → Preparing → Running → {Succeeded | Failed}
/// ```
/// with an optional Cleaning phase before either terminal state. Identity
/// transitions are allowed so field-only updates can reuse the current status.
pub fn is_transition_allowed(from: RunStatus, to: RunStatus) -> bool {
    if from == to {
        return true;
    }
    if from.is_terminal() {
        return false;
    }
    to.rank() > from.rank()
}

#[cfg(test)]
mod tests {
    use super::{is_transition_allowed, RunStatus};

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            RunStatus::Queued,
            RunStatus::Preparing,
            RunStatus::Running,
            RunStatus::Cleaning,
            RunStatus::Succeeded,
            RunStatus::Failed,
        ] {
            let parsed: RunStatus = status.as_str().parse().expect("parse status");
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn status_serializes_as_snake_case() {
        let json = serde_json::to_string(&RunStatus::Preparing).expect("serialize");
        assert_eq!(json, "\"preparing\"");
    }

    #[test]
    fn forward_transitions_are_allowed() {
        assert!(is_transition_allowed(RunStatus::Queued, RunStatus::Preparing));
        assert!(is_transition_allowed(RunStatus::Preparing, RunStatus::Running));
        assert!(is_transition_allowed(RunStatus::Running, RunStatus::Succeeded));
        assert!(is_transition_allowed(RunStatus::Running, RunStatus::Failed));
        assert!(is_transition_allowed(RunStatus::Running, RunStatus::Cleaning));
        assert!(is_transition_allowed(RunStatus::Cleaning, RunStatus::Failed));
    }

    #[test]
    fn queued_can_fail_directly() {
        assert!(is_transition_allowed(RunStatus::Queued, RunStatus::Failed));
    }

    #[test]
    fn identity_transitions_are_allowed() {
        assert!(is_transition_allowed(RunStatus::Succeeded, RunStatus::Succeeded));
        assert!(is_transition_allowed(RunStatus::Running, RunStatus::Running));
    }

    #[test]
    fn terminal_statuses_are_never_left() {
        assert!(!is_transition_allowed(RunStatus::Succeeded, RunStatus::Failed));
        assert!(!is_transition_allowed(RunStatus::Failed, RunStatus::Succeeded));
        assert!(!is_transition_allowed(RunStatus::Succeeded, RunStatus::Running));
        assert!(!is_transition_allowed(RunStatus::Failed, RunStatus::Queued));
    }

    #[test]
    fn backward_transitions_are_rejected() {
        assert!(!is_transition_allowed(RunStatus::Running, RunStatus::Preparing));
        assert!(!is_transition_allowed(RunStatus::Preparing, RunStatus::Queued));
        assert!(!is_transition_allowed(RunStatus::Cleaning, RunStatus::Running));
    }

    #[test]
    fn invalid_status_string_is_rejected() {
        let err = "exploded".parse::<RunStatus>().expect_err("invalid status");
        assert!(err.contains("invalid run status"));
    }

    #[test]
    fn is_active_covers_preparing_and_running_only() {
        assert!(RunStatus::Preparing.is_active());
        assert!(RunStatus::Running.is_active());
        assert!(!RunStatus::Queued.is_active());
        assert!(!RunStatus::Cleaning.is_active());
        assert!(!RunStatus::Succeeded.is_active());
        assert!(!RunStatus::Failed.is_active());
    }
}
