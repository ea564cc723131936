pub mod config;
pub mod state;
pub mod types;

pub use config::*;
pub use state::*;
pub use types::*;

#[cfg(test)]
mod tests {
    use super::{is_transition_allowed, RunId, RunStatus, TaskId};
    use std::any::TypeId;

    #[test]
    fn crate_root_reexports_core_types() {
        let _ = TypeId::of::<TaskId>();
        let _ = TypeId::of::<RunId>();
        let _ = TypeId::of::<RunStatus>();
    }

    #[test]
    fn crate_root_reexports_state_machine_helpers() {
        assert!(is_transition_allowed(RunStatus::Queued, RunStatus::Preparing));
    }
}
