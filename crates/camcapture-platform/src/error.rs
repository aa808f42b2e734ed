//! Error types for the platform layer.

use thiserror::Error;

/// Errors reported by a capture platform.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The capture subsystem cannot be reached.
    #[error("Capture subsystem unavailable: {0}")]
    Unavailable(String),

    /// Capture device not found.
    #[error("Capture device not found: {0}")]
    DeviceNotFound(String),

    /// Device already opened by another input.
    #[error("Capture device busy: {0}")]
    DeviceBusy(String),

    /// Input handle does not refer to an open input.
    #[error("Unknown input handle: {0}")]
    InputNotFound(u64),

    /// Output handle does not refer to a bound output.
    #[error("Unknown output handle: {0}")]
    OutputNotFound(u64),

    /// Filesystem error while binding or writing an output.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other failure of the native framework.
    #[error("Native capture error: {message}")]
    Native { message: String },
}

impl PlatformError {
    /// Build a generic native failure.
    pub fn native(message: impl Into<String>) -> Self {
        Self::Native {
            message: message.into(),
        }
    }
}
