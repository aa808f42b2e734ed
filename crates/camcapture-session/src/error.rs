//! Error types for the session manager.

use std::path::PathBuf;

use thiserror::Error;

use camcapture_ipc::{Format, RecordingState};
use camcapture_platform::PlatformError;

/// Errors that can occur during session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The platform capture subsystem is unavailable.
    #[error("Device enumeration failed: {0}")]
    Enumeration(String),

    /// The device id is not (or no longer) present.
    #[error("Capture device not found: {0}")]
    DeviceNotFound(String),

    /// The device is opened by another session.
    #[error("Capture device busy: {0}")]
    DeviceBusy(String),

    /// No supported format matches the request.
    #[error("Format {requested} not supported by device {device}")]
    UnsupportedFormat { device: String, requested: Format },

    /// `start` called before `configure`.
    #[error("Session not configured")]
    NotConfigured,

    /// `record` called while not capturing.
    #[error("Session not capturing")]
    NotCapturing,

    /// A recording is already bound or finalizing.
    #[error("Recording already in progress")]
    RecordingInProgress,

    /// The previous recording failed and must be acknowledged first.
    #[error("Previous recording failed and was not acknowledged: {0}")]
    StaleError(String),

    /// Format changes are rejected while capture is running.
    #[error("Cannot reconfigure while capturing")]
    CaptureActive,

    /// The output path exists and overwriting is disabled.
    #[error("Output file already exists: {}", .0.display())]
    OutputExists(PathBuf),

    /// The recording state machine refused a transition.
    #[error("Invalid recording transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: RecordingState,
        to: RecordingState,
    },

    /// Generic failure of the platform on open/bind/start/stop.
    #[error("Native resource error: {message}")]
    NativeResource {
        message: String,
        #[source]
        source: Option<PlatformError>,
    },

    /// Filesystem error while preparing an output path.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<PlatformError> for SessionError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::Unavailable(message) => Self::Enumeration(message),
            PlatformError::DeviceNotFound(id) => Self::DeviceNotFound(id),
            PlatformError::DeviceBusy(id) => Self::DeviceBusy(id),
            other => Self::NativeResource {
                message: other.to_string(),
                source: Some(other),
            },
        }
    }
}
