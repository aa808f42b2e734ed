//! Platform capture contract for camcapture.
//!
//! The session manager never talks to a media framework directly. It drives
//! a [`CapturePlatform`] and receives asynchronous notifications through a
//! [`PlatformEvents`] handler registered when an input is opened. Platform
//! implementations deliver those notifications on their own threads.
//!
//! [`SimulatedPlatform`] implements the contract in-process.

mod error;
mod frame;
mod simulated;

pub use error::PlatformError;
pub use frame::{CaptureTimestamp, CapturedFrame, PixelFormat};
pub use simulated::{SimulatedDevice, SimulatedPlatform};

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use camcapture_ipc::{DeviceId, DeviceInfo, Format};

/// Result type for platform operations.
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Opaque handle to an open device input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputHandle(u64);

/// Opaque handle to a file output bound to an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputHandle(u64);

impl InputHandle {
    /// Wrap a raw platform identifier.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw platform identifier.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl OutputHandle {
    /// Wrap a raw platform identifier.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw platform identifier.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InputHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "input#{}", self.0)
    }
}

impl fmt::Display for OutputHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "output#{}", self.0)
    }
}

/// Asynchronous notifications delivered by the platform.
///
/// Both methods are called from platform-owned threads and must not block
/// longer than the work they forward.
pub trait PlatformEvents: Send + Sync {
    /// A frame was captured on the input this handler was registered for.
    fn on_frame(&self, frame: CapturedFrame);

    /// The platform finished writing an output file, successfully or not.
    fn on_file_output_done(&self, output: OutputHandle, result: Result<(), String>);
}

/// Capability contract of the platform capture service.
pub trait CapturePlatform: Send + Sync {
    /// Enumerate the devices currently present.
    fn enumerate_devices(&self) -> PlatformResult<Vec<DeviceInfo>>;

    /// Formats supported by a device, in platform order.
    fn device_formats(&self, device: &DeviceId) -> PlatformResult<Vec<Format>>;

    /// Open a device input with the given format.
    ///
    /// `events` receives every frame and output completion for this input
    /// until it is closed.
    fn open_input(
        &self,
        device: &DeviceId,
        format: Format,
        events: Arc<dyn PlatformEvents>,
    ) -> PlatformResult<InputHandle>;

    /// Close an input. Capture on it stops and outputs still bound to it are
    /// finalized.
    fn close_input(&self, input: InputHandle);

    /// Start delivering frames for an input.
    fn start_session(&self, input: InputHandle) -> PlatformResult<()>;

    /// Stop delivering frames. Returns once no further frame will be delivered.
    fn stop_session(&self, input: InputHandle) -> PlatformResult<()>;

    /// Begin writing captured frames of `input` to a new file at `path`.
    fn bind_output_file(&self, input: InputHandle, path: &Path) -> PlatformResult<OutputHandle>;

    /// Request that an output stop writing. Completion is reported
    /// asynchronously through [`PlatformEvents::on_file_output_done`].
    fn stop_output(&self, output: OutputHandle) -> PlatformResult<()>;
}
