//! Reference-counted ownership of a native device input.
//!
//! A [`NativeInput`] is shared between clones of a session through an `Arc`.
//! The platform input is closed exactly once, when the last clone lets go.
//! Capture runs while at least one clone holds a [`RunGuard`].

use std::path::Path;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace, warn};

use camcapture_ipc::{DeviceId, Format};
use camcapture_platform::{
    CapturePlatform, CapturedFrame, InputHandle, OutputHandle, PlatformEvents, PlatformResult,
};

use crate::bridge::CallbackBridge;

/// Platform event handler for one input; fans events out to the bridges of
/// every session sharing the input.
pub(crate) struct InputRouter {
    bridges: RwLock<Vec<Weak<CallbackBridge>>>,
}

impl InputRouter {
    fn new() -> Self {
        Self {
            bridges: RwLock::new(Vec::new()),
        }
    }

    fn live_bridges(&self) -> Vec<Arc<CallbackBridge>> {
        self.bridges.read().iter().filter_map(Weak::upgrade).collect()
    }
}

impl PlatformEvents for InputRouter {
    fn on_frame(&self, frame: CapturedFrame) {
        let mut bridges = self.live_bridges();
        let Some(last) = bridges.pop() else {
            trace!(sequence = frame.sequence, "No session attached, dropping frame");
            return;
        };
        for bridge in bridges {
            bridge.handle_frame(frame.clone());
        }
        last.handle_frame(frame);
    }

    fn on_file_output_done(&self, output: OutputHandle, result: Result<(), String>) {
        let owned = self
            .live_bridges()
            .into_iter()
            .any(|bridge| bridge.handle_output_done(output, &result));
        if !owned {
            debug!(%output, "Output completion for a released recording, ignoring");
        }
    }
}

/// An open platform input plus its event router.
pub(crate) struct NativeInput {
    platform: Arc<dyn CapturePlatform>,
    handle: InputHandle,
    device: DeviceId,
    format: Format,
    router: Arc<InputRouter>,
    runners: Mutex<usize>,
}

impl NativeInput {
    /// Open `device` at `format` on the platform.
    pub fn open(
        platform: Arc<dyn CapturePlatform>,
        device: &DeviceId,
        format: Format,
    ) -> PlatformResult<Arc<Self>> {
        let router = Arc::new(InputRouter::new());
        let handle = platform.open_input(device, format, router.clone())?;
        info!(%handle, %device, %format, "Opened device input");

        Ok(Arc::new(Self {
            platform,
            handle,
            device: device.clone(),
            format,
            router,
            runners: Mutex::new(0),
        }))
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Route this input's events to `bridge` as well.
    pub fn attach(&self, bridge: &Arc<CallbackBridge>) {
        let mut bridges = self.router.bridges.write();
        bridges.retain(|weak| weak.strong_count() > 0);
        bridges.push(Arc::downgrade(bridge));
    }

    /// Stop routing events to `bridge`.
    pub fn detach(&self, bridge: &Arc<CallbackBridge>) {
        let target = Arc::as_ptr(bridge);
        self.router
            .bridges
            .write()
            .retain(|weak| weak.strong_count() > 0 && weak.as_ptr() != target);
    }

    /// Claim a run reference, starting native capture on the first claim.
    pub fn acquire_run(self: &Arc<Self>) -> PlatformResult<RunGuard> {
        let mut runners = self.runners.lock();
        if *runners == 0 {
            self.platform.start_session(self.handle)?;
        }
        *runners += 1;
        debug!(input = %self.handle, runners = *runners, "Run reference acquired");

        Ok(RunGuard {
            input: Some(Arc::clone(self)),
        })
    }

    fn release_run(&self) -> PlatformResult<()> {
        let mut runners = self.runners.lock();
        *runners = runners.saturating_sub(1);
        debug!(input = %self.handle, runners = *runners, "Run reference released");
        if *runners == 0 {
            self.platform.stop_session(self.handle)?;
        }
        Ok(())
    }

    /// Bind a file output to this input.
    pub fn bind_output(&self, path: &Path) -> PlatformResult<OutputHandle> {
        self.platform.bind_output_file(self.handle, path)
    }

    /// Ask the platform to finish an output.
    pub fn stop_output(&self, output: OutputHandle) -> PlatformResult<()> {
        self.platform.stop_output(output)
    }

    /// Give up one session's hold on the input: the input reference first,
    /// then its recording output, then its run reference.
    ///
    /// The last holder closes the input outright, which finalizes the output
    /// and stops capture on the platform side. Otherwise the output and run
    /// are released explicitly and the input stays open for the other clones.
    pub fn release(self: Arc<Self>, run: Option<RunGuard>, output: Option<OutputHandle>) {
        let running = run.and_then(RunGuard::disarm).is_some();

        let shared = match Arc::try_unwrap(self) {
            Ok(input) => {
                debug!(input = %input.handle, "Last holder released, closing input");
                drop(input);
                return;
            }
            Err(shared) => shared,
        };

        if let Some(output) = output {
            if let Err(e) = shared.stop_output(output) {
                warn!(%output, "Failed to finalize recording on release: {}", e);
            }
        }
        if running {
            if let Err(e) = shared.release_run() {
                warn!("Failed to stop capture on release: {}", e);
            }
        }
    }
}

impl Drop for NativeInput {
    fn drop(&mut self) {
        info!(input = %self.handle, device = %self.device, "Closing device input");
        self.platform.close_input(self.handle);
    }
}

/// One session's claim that the shared input should be capturing.
///
/// Dropping the guard releases the claim; the last release stops capture.
pub(crate) struct RunGuard {
    input: Option<Arc<NativeInput>>,
}

impl RunGuard {
    /// Release the claim, reporting a failed native stop.
    pub fn release(mut self) -> PlatformResult<()> {
        match self.input.take() {
            Some(input) => input.release_run(),
            None => Ok(()),
        }
    }

    /// Take the input out without releasing the claim.
    fn disarm(mut self) -> Option<Arc<NativeInput>> {
        self.input.take()
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Some(input) = self.input.take() {
            if let Err(e) = input.release_run() {
                warn!("Failed to stop capture while releasing run reference: {}", e);
            }
        }
    }
}
