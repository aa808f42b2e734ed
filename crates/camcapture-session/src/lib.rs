//! Camera capture session manager.
//!
//! This crate turns a [`CapturePlatform`] into a [`CameraSession`]: pick a
//! device and format, start and stop capture, receive frames through a sink,
//! and record to a file with an explicit recording lifecycle.
//!
//! # Architecture
//!
//! ```text
//!  caller thread                          platform threads
//!  ─────────────                          ────────────────
//!  CameraSession ──configure/start──▶ NativeInput (Arc, shared by clones)
//!       │                                    │ open_input(events = router)
//!       │                                    ▼
//!       │                              InputRouter ──on_frame / on_file_output_done──┐
//!       ▼                                                                             │
//!  CallbackBridge (Mutex<SessionState>) ◀─────────────────────────────────────────────┘
//!       │ lock released before calling out
//!       ▼
//!  FrameSink / CompletionSink / SessionEvent subscribers
//! ```

mod bridge;
mod catalog;
mod config;
mod error;
mod native;
mod recording;
mod session;
mod sink;
mod stats;

pub use catalog::{match_format, DeviceCatalog};
pub use config::{ErrorPolicy, FormatPolicy, OverwritePolicy, SessionConfig};
pub use error::SessionError;
pub use session::{CameraSession, SessionStatus};
pub use sink::{frame_channel, ChannelFrameSink, CompletionSink, FrameSink, FRAME_CHANNEL_CAPACITY};
pub use stats::FrameStatsSnapshot;

pub use camcapture_ipc::{
    Device, DeviceId, DeviceInfo, Format, RecordingOutcome, RecordingState, SessionEvent,
    SessionPhase,
};
pub use camcapture_platform::{CapturePlatform, CapturedFrame, PlatformError};

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
