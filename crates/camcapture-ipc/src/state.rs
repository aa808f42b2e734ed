//! Session and recording state types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Lifecycle phase of a capture session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    /// No device or format selected yet.
    #[default]
    Unconfigured,

    /// Device input is open with an active format, not capturing.
    Configured,

    /// Capture is running.
    Capturing,
}

impl SessionPhase {
    /// Returns a simple string representation of the phase.
    pub fn name(self) -> &'static str {
        match self {
            Self::Unconfigured => "Unconfigured",
            Self::Configured => "Configured",
            Self::Capturing => "Capturing",
        }
    }
}

/// State of the recording lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordingState {
    /// No recording in progress.
    #[default]
    Idle,

    /// Frames are being written to the output file.
    Recording,

    /// Output close requested, waiting for the platform to finish the file.
    Finalizing,

    /// The last recording failed and has not been acknowledged.
    Error,
}

impl RecordingState {
    /// Returns true while an output file is bound (Recording or Finalizing).
    pub fn is_active(self) -> bool {
        matches!(self, Self::Recording | Self::Finalizing)
    }

    /// Returns a simple string representation of the state.
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Recording => "Recording",
            Self::Finalizing => "Finalizing",
            Self::Error => "Error",
        }
    }
}

/// Terminal result of one recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingOutcome {
    /// Destination file of the recording.
    pub path: PathBuf,

    /// Failure reported by the platform, if any.
    pub error: Option<String>,
}

impl RecordingOutcome {
    /// Returns true if the platform finished the file without error.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
