//! Recording lifecycle state machine.
//!
//! ```text
//!   Idle --begin--> Recording --request_finish--> Finalizing
//!    ^                  |                             |
//!    |                  +---------finish(..)----------+
//!    |                                                |
//!    +------------ finish(ok) ------------------------+
//!    +------------ acknowledge ---- Error <-- finish(err)
//! ```

use std::path::{Path, PathBuf};

use tracing::debug;

use camcapture_ipc::{RecordingOutcome, RecordingState};
use camcapture_platform::OutputHandle;

use crate::config::ErrorPolicy;
use crate::error::SessionError;
use crate::SessionResult;

/// Returns true if `from -> to` is a legal recording transition.
pub(crate) fn is_valid_transition(from: RecordingState, to: RecordingState) -> bool {
    use RecordingState::*;

    matches!(
        (from, to),
        (Idle, Recording)
            | (Recording, Finalizing)
            | (Recording, Idle)
            | (Recording, Error)
            | (Finalizing, Idle)
            | (Finalizing, Error)
            | (Error, Idle)
    )
}

/// Tracks the recording owned by one session.
#[derive(Debug, Default)]
pub(crate) struct RecordingMachine {
    state: RecordingState,
    path: Option<PathBuf>,
    output: Option<OutputHandle>,
    last_result: Option<RecordingOutcome>,
}

impl RecordingMachine {
    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn last_result(&self) -> Option<&RecordingOutcome> {
        self.last_result.as_ref()
    }

    fn transition(&mut self, to: RecordingState) -> SessionResult<()> {
        if !is_valid_transition(self.state, to) {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        debug!(from = self.state.name(), to = to.name(), "Recording transition");
        self.state = to;
        Ok(())
    }

    /// Check whether a new recording may start under `policy`.
    pub fn check_can_begin(&self, policy: ErrorPolicy) -> SessionResult<()> {
        match self.state {
            RecordingState::Idle => Ok(()),
            RecordingState::Recording | RecordingState::Finalizing => {
                Err(SessionError::RecordingInProgress)
            }
            RecordingState::Error => match policy {
                ErrorPolicy::AutoReset => Ok(()),
                ErrorPolicy::RequireAcknowledge => Err(SessionError::StaleError(
                    self.last_result
                        .as_ref()
                        .and_then(|outcome| outcome.error.clone())
                        .unwrap_or_default(),
                )),
            },
        }
    }

    /// Enter `Recording` for a freshly bound output.
    ///
    /// An unacknowledged error is cleared first; callers gate that through
    /// [`RecordingMachine::check_can_begin`].
    pub fn begin(&mut self, path: PathBuf, output: OutputHandle) -> SessionResult<()> {
        if self.state == RecordingState::Error {
            self.transition(RecordingState::Idle)?;
        }
        self.transition(RecordingState::Recording)?;
        self.path = Some(path);
        self.output = Some(output);
        Ok(())
    }

    /// Move `Recording -> Finalizing`. Returns the output to stop, if any.
    pub fn request_finish(&mut self) -> Option<(OutputHandle, PathBuf)> {
        if self.state != RecordingState::Recording {
            return None;
        }
        let output = self.output?;
        let path = self.path.clone()?;
        self.transition(RecordingState::Finalizing).ok()?;
        Some((output, path))
    }

    /// Apply the platform's completion for `output`.
    ///
    /// Returns `None` when the output does not belong to the active recording.
    pub fn finish(
        &mut self,
        output: OutputHandle,
        result: Result<(), String>,
    ) -> Option<RecordingOutcome> {
        if !self.state.is_active() || self.output != Some(output) {
            return None;
        }

        let target = if result.is_ok() {
            RecordingState::Idle
        } else {
            RecordingState::Error
        };
        self.transition(target).ok()?;

        let outcome = RecordingOutcome {
            path: self.path.take().unwrap_or_default(),
            error: result.err(),
        };
        self.output = None;
        self.last_result = Some(outcome.clone());
        Some(outcome)
    }

    /// Move `Error -> Idle`, returning the acknowledged outcome.
    pub fn acknowledge(&mut self) -> Option<RecordingOutcome> {
        if self.state != RecordingState::Error {
            return None;
        }
        self.transition(RecordingState::Idle).ok()?;
        self.last_result.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(raw: u64) -> OutputHandle {
        OutputHandle::from_raw(raw)
    }

    #[test]
    fn test_success_cycle() {
        let mut machine = RecordingMachine::default();
        machine.begin(PathBuf::from("a.mov"), output(1)).unwrap();
        assert_eq!(machine.state(), RecordingState::Recording);

        let (handle, path) = machine.request_finish().unwrap();
        assert_eq!(handle, output(1));
        assert_eq!(path, PathBuf::from("a.mov"));
        assert_eq!(machine.state(), RecordingState::Finalizing);

        let outcome = machine.finish(output(1), Ok(())).unwrap();
        assert!(outcome.is_success());
        assert_eq!(machine.state(), RecordingState::Idle);
        assert_eq!(machine.last_result(), Some(&outcome));
    }

    #[test]
    fn test_failure_then_auto_reset() {
        let mut machine = RecordingMachine::default();
        machine.begin(PathBuf::from("a.mov"), output(1)).unwrap();
        machine.request_finish();
        machine.finish(output(1), Err("disk full".into())).unwrap();
        assert_eq!(machine.state(), RecordingState::Error);

        machine.check_can_begin(ErrorPolicy::AutoReset).unwrap();
        machine.begin(PathBuf::from("b.mov"), output(2)).unwrap();
        assert_eq!(machine.state(), RecordingState::Recording);
    }

    #[test]
    fn test_failure_requires_acknowledge() {
        let mut machine = RecordingMachine::default();
        machine.begin(PathBuf::from("a.mov"), output(1)).unwrap();
        machine.finish(output(1), Err("device lost".into())).unwrap();

        match machine.check_can_begin(ErrorPolicy::RequireAcknowledge) {
            Err(SessionError::StaleError(message)) => assert_eq!(message, "device lost"),
            other => panic!("expected StaleError, got {other:?}"),
        }

        let acknowledged = machine.acknowledge().unwrap();
        assert_eq!(acknowledged.error.as_deref(), Some("device lost"));
        assert_eq!(machine.state(), RecordingState::Idle);
        machine
            .check_can_begin(ErrorPolicy::RequireAcknowledge)
            .unwrap();
    }

    #[test]
    fn test_in_progress_rejected() {
        let mut machine = RecordingMachine::default();
        machine.begin(PathBuf::from("a.mov"), output(1)).unwrap();
        assert!(matches!(
            machine.check_can_begin(ErrorPolicy::AutoReset),
            Err(SessionError::RecordingInProgress)
        ));
        machine.request_finish();
        assert!(matches!(
            machine.check_can_begin(ErrorPolicy::AutoReset),
            Err(SessionError::RecordingInProgress)
        ));
        assert!(matches!(
            machine.begin(PathBuf::from("b.mov"), output(2)),
            Err(SessionError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_foreign_output_ignored() {
        let mut machine = RecordingMachine::default();
        machine.begin(PathBuf::from("a.mov"), output(1)).unwrap();
        assert!(machine.finish(output(7), Ok(())).is_none());
        assert_eq!(machine.state(), RecordingState::Recording);

        assert!(machine.request_finish().is_some());
        assert!(machine.request_finish().is_none());
    }

    #[test]
    fn test_transition_table() {
        use RecordingState::*;

        assert!(is_valid_transition(Idle, Recording));
        assert!(!is_valid_transition(Idle, Finalizing));
        assert!(!is_valid_transition(Idle, Error));
        assert!(!is_valid_transition(Finalizing, Recording));
        assert!(!is_valid_transition(Error, Recording));
        assert!(is_valid_transition(Error, Idle));
    }
}
