//! Lock-scoped replay of a single [`Command`].
//!
//! Every replay runs unlock → re-run → relock. The relock is owned by a
//! guard that is armed before the unlock attempt, so it runs exactly once
//! on every exit path, including a panic in the unlock or re-run phase. A form
//! must never be left unlocked by remediation.

use crate::command::Command;
use crate::error::Result;
use crate::store::RecordStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info, warn};

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Unlock,
    Command,
    Relock,
}

impl Phase {
    pub fn all() -> &'static [Phase] {
        &[Phase::Unlock, Phase::Command, Phase::Relock]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Unlock => "unlock",
            Phase::Command => "command",
            Phase::Relock => "relock",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ExecutionResult / CommandOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub phase: Phase,
    pub success: bool,
    pub detail: String,
}

impl ExecutionResult {
    fn capture(phase: Phase, outcome: Result<String>) -> Self {
        match outcome {
            Ok(detail) => Self {
                phase,
                success: true,
                detail,
            },
            Err(e) => Self {
                phase,
                success: false,
                detail: e.to_string(),
            },
        }
    }
}

/// A command together with its unlock, command and relock results, in
/// that order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub command: Command,
    pub results: [ExecutionResult; 3],
}

impl CommandOutcome {
    pub fn succeeded(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }

    pub fn result(&self, phase: Phase) -> &ExecutionResult {
        match phase {
            Phase::Unlock => &self.results[0],
            Phase::Command => &self.results[1],
            Phase::Relock => &self.results[2],
        }
    }

    pub fn relock_failed(&self) -> bool {
        !self.result(Phase::Relock).success
    }
}

// ---------------------------------------------------------------------------
// RelockGuard
// ---------------------------------------------------------------------------

struct RelockGuard<'a> {
    store: &'a dyn RecordStore,
    command: &'a Command,
    released: bool,
}

impl<'a> RelockGuard<'a> {
    fn arm(store: &'a dyn RecordStore, command: &'a Command) -> Self {
        Self {
            store,
            command,
            released: false,
        }
    }

    fn release(mut self) -> ExecutionResult {
        self.released = true;
        ExecutionResult::capture(
            Phase::Relock,
            self.store
                .relock(self.command.study_id(), self.command.lock_target()),
        )
    }
}

impl Drop for RelockGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let cmd = self.command;
        match self.store.relock(cmd.study_id(), cmd.lock_target()) {
            Ok(_) => warn!(command = %cmd, "replay aborted; form relocked during unwind"),
            Err(e) => error!(command = %cmd, error = %e, "replay aborted and relock failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// LockScopedExecutor
// ---------------------------------------------------------------------------

pub struct LockScopedExecutor<'a> {
    store: &'a dyn RecordStore,
    operation: &'a str,
}

impl<'a> LockScopedExecutor<'a> {
    /// `operation` is the importer to replay, as known to the record store.
    pub fn new(store: &'a dyn RecordStore, operation: &'a str) -> Self {
        Self { store, operation }
    }

    pub fn execute(&self, command: &Command) -> CommandOutcome {
        let study_id = command.study_id();
        let form = command.lock_target();

        let guard = RelockGuard::arm(self.store, command);
        let unlock = ExecutionResult::capture(Phase::Unlock, self.store.unlock(study_id, form));
        if !unlock.success {
            warn!(command = %command, detail = %unlock.detail, "unlock failed; continuing");
        }

        let run = ExecutionResult::capture(
            Phase::Command,
            self.store.re_run(self.operation, study_id, command.form()),
        );
        if !run.success {
            warn!(command = %command, operation = self.operation, "re-run failed");
        }
        let relock = guard.release();
        if relock.success {
            info!(command = %command, ok = unlock.success && run.success, "replayed");
        } else {
            error!(command = %command, detail = %relock.detail, "RELOCK FAILED: form may be left unlocked");
        }

        CommandOutcome {
            command: command.clone(),
            results: [unlock, run, relock],
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemedyError;
    use crate::forms::MetadataRow;
    use std::cell::RefCell;

    #[derive(Default)]
    struct ScriptedStore {
        fail: Vec<Phase>,
        panic_on_unlock: bool,
        panic_on_rerun: bool,
        calls: RefCell<Vec<String>>,
    }

    impl ScriptedStore {
        fn failing(fail: &[Phase]) -> Self {
            Self {
                fail: fail.to_vec(),
                ..Default::default()
            }
        }

        fn step(&self, phase: Phase, what: String) -> Result<String> {
            self.calls.borrow_mut().push(what);
            if self.fail.contains(&phase) {
                Err(RemedyError::RecordStore(format!("{phase} refused")))
            } else {
                Ok(format!("{phase} ok"))
            }
        }

        fn count(&self, prefix: &str) -> usize {
            self.calls
                .borrow()
                .iter()
                .filter(|c| c.starts_with(prefix))
                .count()
        }
    }

    impl RecordStore for ScriptedStore {
        fn export_metadata(&self) -> Result<Vec<MetadataRow>> {
            Ok(Vec::new())
        }

        fn unlock(&self, study_id: &str, form: &str) -> Result<String> {
            if self.panic_on_unlock {
                self.calls.borrow_mut().push("unlock".into());
                panic!("lock script crashed");
            }
            self.step(Phase::Unlock, format!("unlock {study_id} {form}"))
        }

        fn relock(&self, study_id: &str, form: &str) -> Result<String> {
            self.step(Phase::Relock, format!("relock {study_id} {form}"))
        }

        fn re_run(&self, operation: &str, study_id: &str, form: &str) -> Result<String> {
            if self.panic_on_rerun {
                self.calls.borrow_mut().push("rerun".into());
                panic!("importer crashed");
            }
            self.step(Phase::Command, format!("rerun {operation} {study_id} {form}"))
        }
    }

    fn cmd() -> Command {
        Command::new("S001", "demographics").unwrap()
    }

    #[test]
    fn phases_run_in_order() {
        let store = ScriptedStore::default();
        let outcome = LockScopedExecutor::new(&store, "update_visit_data").execute(&cmd());
        assert!(outcome.succeeded());
        assert_eq!(
            *store.calls.borrow(),
            vec![
                "unlock S001 demographics",
                "rerun update_visit_data S001 demographics",
                "relock S001 demographics",
            ]
        );
        let phases: Vec<Phase> = outcome.results.iter().map(|r| r.phase).collect();
        assert_eq!(phases, Phase::all());
    }

    #[test]
    fn relock_runs_once_whatever_fails() {
        for fail in [
            vec![],
            vec![Phase::Unlock],
            vec![Phase::Command],
            vec![Phase::Unlock, Phase::Command],
            vec![Phase::Relock],
            vec![Phase::Unlock, Phase::Command, Phase::Relock],
        ] {
            let store = ScriptedStore::failing(&fail);
            let outcome = LockScopedExecutor::new(&store, "op").execute(&cmd());
            assert_eq!(store.count("relock"), 1, "fail set {fail:?}");
            assert_eq!(store.count("rerun"), 1, "fail set {fail:?}");
            for phase in Phase::all() {
                assert_eq!(
                    outcome.result(*phase).success,
                    !fail.contains(phase),
                    "phase {phase} with fail set {fail:?}"
                );
            }
            assert_eq!(outcome.succeeded(), fail.is_empty());
        }
    }

    #[test]
    fn failure_detail_is_captured() {
        let store = ScriptedStore::failing(&[Phase::Relock]);
        let outcome = LockScopedExecutor::new(&store, "op").execute(&cmd());
        assert!(outcome.relock_failed());
        assert!(outcome.result(Phase::Relock).detail.contains("relock refused"));
        assert_eq!(outcome.result(Phase::Command).detail, "command ok");
    }

    #[test]
    fn panic_in_rerun_still_relocks_once() {
        let store = ScriptedStore {
            panic_on_rerun: true,
            ..Default::default()
        };
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            LockScopedExecutor::new(&store, "op").execute(&cmd())
        }));
        assert!(result.is_err());
        assert_eq!(store.count("relock"), 1);
    }

    #[test]
    fn panic_in_unlock_still_relocks_once() {
        let store = ScriptedStore {
            panic_on_unlock: true,
            ..Default::default()
        };
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            LockScopedExecutor::new(&store, "op").execute(&cmd())
        }));
        assert!(result.is_err());
        assert_eq!(store.count("rerun"), 0);
        assert_eq!(store.count("relock"), 1);
    }

    #[test]
    fn phase_display() {
        assert_eq!(Phase::Unlock.to_string(), "unlock");
        assert_eq!(Phase::Command.to_string(), "command");
        assert_eq!(Phase::Relock.to_string(), "relock");
    }
}
