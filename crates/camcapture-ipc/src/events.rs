//! Events sent from a session to its subscribers.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::state::{RecordingOutcome, SessionPhase};
use crate::types::Format;

/// Events that a session emits to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    /// Session phase has changed.
    PhaseChanged {
        /// Previous phase.
        previous: SessionPhase,

        /// Current phase.
        current: SessionPhase,
    },

    /// A new format was applied by `configure`.
    Configured(Format),

    /// Recording to a file has started.
    RecordingStarted { path: PathBuf },

    /// Recording stop was requested; the platform is closing the file.
    RecordingFinalizing { path: PathBuf },

    /// The platform finished (or failed) writing the file.
    RecordingFinished(RecordingOutcome),
}
