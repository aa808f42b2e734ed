//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use camcapture_ipc::EVENT_CHANNEL_CAPACITY;

/// How `configure` matches a requested format against the device's list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatPolicy {
    /// Width, height and frame rate must all match a supported format.
    #[default]
    Exact,

    /// Pick the supported format closest in resolution, then frame rate.
    Nearest,
}

/// What `record` does when the destination file already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwritePolicy {
    /// Fail with `OutputExists`.
    #[default]
    Error,

    /// Remove the existing file before recording.
    Replace,
}

/// What `record` does while the previous recording is in the error state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Clear the error and start the new recording.
    #[default]
    AutoReset,

    /// Fail with `StaleError` until `acknowledge_error` is called.
    RequireAcknowledge,
}

/// Configuration for a capture session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Format matching policy for `configure`.
    pub format_policy: FormatPolicy,

    /// Existing-file policy for `record`.
    pub overwrite: OverwritePolicy,

    /// Error-state policy for `record`.
    pub error_policy: ErrorPolicy,

    /// How long `stop` waits for the platform to finish a recording (default: 2000).
    pub finalize_timeout_ms: u64,

    /// Capacity of each event subscription channel.
    pub event_channel_capacity: usize,
}

impl SessionConfig {
    /// Finalize timeout as a duration.
    pub fn finalize_timeout(&self) -> Duration {
        Duration::from_millis(self.finalize_timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            format_policy: FormatPolicy::default(),
            overwrite: OverwritePolicy::default(),
            error_policy: ErrorPolicy::default(),
            finalize_timeout_ms: 2000,
            event_channel_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}
