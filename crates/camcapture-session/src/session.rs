//! Capture session manager.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Instant;

use crossbeam_channel::Receiver;
use tracing::{debug, error, info, instrument, warn};

use camcapture_ipc::{
    DeviceId, DeviceInfo, Format, RecordingOutcome, RecordingState, SessionEvent, SessionPhase,
};
use camcapture_platform::CapturePlatform;

use crate::bridge::{CallbackBridge, SessionState};
use crate::catalog::{match_format, DeviceCatalog};
use crate::config::{OverwritePolicy, SessionConfig};
use crate::error::SessionError;
use crate::native::NativeInput;
use crate::sink::{CompletionSink, FrameSink};
use crate::stats::FrameStatsSnapshot;
use crate::SessionResult;

/// A camera capture session with value semantics.
///
/// Cloning a session yields an independent session bound to the same device
/// input: the native input is shared and reference counted, while phase,
/// recording, and event subscriptions belong to each clone. A clone starts in
/// `Configured` (or `Unconfigured`) regardless of the source's phase, and keeps
/// the source's frame and completion sinks.
pub struct CameraSession {
    catalog: DeviceCatalog,
    config: SessionConfig,
    bridge: Arc<CallbackBridge>,
}

/// Cloneable read-only view of a session, usable from other threads and from
/// inside sinks.
#[derive(Clone)]
pub struct SessionStatus {
    bridge: Arc<CallbackBridge>,
}

impl SessionStatus {
    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.bridge.lock().phase
    }

    /// Returns true while capture is running.
    pub fn is_capturing(&self) -> bool {
        self.phase() == SessionPhase::Capturing
    }

    /// Current recording state.
    pub fn recording_state(&self) -> RecordingState {
        self.bridge.lock().recording.state()
    }

    /// Outcome of the most recent finished recording.
    pub fn last_recording_result(&self) -> Option<RecordingOutcome> {
        self.bridge.lock().recording.last_result().cloned()
    }

    /// Frame delivery counters.
    pub fn frame_stats(&self) -> FrameStatsSnapshot {
        self.bridge.stats().snapshot()
    }
}

impl CameraSession {
    /// Create an unconfigured session on a platform.
    pub fn new(platform: Arc<dyn CapturePlatform>, config: SessionConfig) -> Self {
        Self {
            catalog: DeviceCatalog::new(platform),
            config,
            bridge: Arc::new(CallbackBridge::new()),
        }
    }

    /// Create a session with the default configuration.
    pub fn with_defaults(platform: Arc<dyn CapturePlatform>) -> Self {
        Self::new(platform, SessionConfig::default())
    }

    /// The device catalog of this session's platform.
    pub fn catalog(&self) -> &DeviceCatalog {
        &self.catalog
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// A read-only status handle.
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            bridge: Arc::clone(&self.bridge),
        }
    }

    /// Select a device and format, opening the device input.
    ///
    /// The device is looked up in the live catalog and the format matched
    /// under the configured [`FormatPolicy`](crate::FormatPolicy). On error the
    /// previous configuration is left in place.
    #[instrument(name = "session_configure", skip(self), fields(device = %device_id))]
    pub fn configure(
        &mut self,
        device_id: &DeviceId,
        width: u32,
        height: u32,
        fps: f64,
    ) -> SessionResult<Format> {
        if self.bridge.lock().phase == SessionPhase::Capturing {
            return Err(SessionError::CaptureActive);
        }

        let requested = Format::new(width, height, fps);
        let device = self.catalog.find_device(device_id)?;
        let format = match_format(&device, requested, self.config.format_policy)?;

        let (prior, previous_phase) = {
            let mut state = self.bridge.lock();
            if let Some(input) = &state.input {
                if input.device() == device_id && input.format() == format {
                    debug!(%format, "Device already configured with this format");
                    state.device = Some(device.info.clone());
                    return Ok(format);
                }
            }
            let prior = state
                .input
                .take()
                .map(|input| (input, state.device.take()));
            (prior, state.phase)
        };

        // Release the prior binding before opening the new one. Clones may
        // keep it open, in which case it is reattached on failure.
        let restore = prior.map(|(input, info)| {
            input.detach(&self.bridge);
            PriorBinding {
                device: input.device().clone(),
                format: input.format(),
                info,
                input: Arc::downgrade(&input),
            }
        });

        let opened = NativeInput::open(Arc::clone(self.catalog.platform()), device_id, format);
        let result = match opened {
            Ok(input) => {
                self.install_input(input, device.info.clone());
                info!(%format, "Session configured");
                self.bridge.events().emit(SessionEvent::Configured(format));
                Ok(format)
            }
            Err(e) => {
                warn!("Failed to open device input: {}", e);
                self.restore_binding(restore);
                Err(e.into())
            }
        };

        self.emit_phase_change(previous_phase);
        result
    }

    fn install_input(&self, input: Arc<NativeInput>, info: DeviceInfo) {
        input.attach(&self.bridge);
        let mut state = self.bridge.lock();
        state.input = Some(input);
        state.device = Some(info);
        state.phase = SessionPhase::Configured;
    }

    /// Reinstate a binding released by a failed `configure`: reattach it if
    /// another clone kept it open, otherwise reopen it best-effort.
    fn restore_binding(&self, prior: Option<PriorBinding>) {
        let Some(prior) = prior else {
            return;
        };
        let PriorBinding {
            device,
            format,
            info,
            input,
        } = prior;
        let info = info.unwrap_or_else(|| DeviceInfo {
            name: device.to_string(),
            id: device.clone(),
        });

        if let Some(input) = input.upgrade() {
            self.install_input(input, info);
            debug!(%device, %format, "Reattached shared device input");
            return;
        }

        match NativeInput::open(Arc::clone(self.catalog.platform()), &device, format) {
            Ok(input) => {
                self.install_input(input, info);
                debug!(%device, %format, "Restored previous device input");
            }
            Err(e) => {
                error!(%device, "Could not restore previous device input: {}", e);
                self.bridge.lock().phase = SessionPhase::Unconfigured;
            }
        }
    }

    /// Start capturing. A no-op if already capturing.
    #[instrument(name = "session_start", skip(self))]
    pub fn start(&mut self) -> SessionResult<()> {
        let input = {
            let state = self.bridge.lock();
            match state.phase {
                SessionPhase::Capturing => {
                    debug!("Already capturing, ignoring start");
                    return Ok(());
                }
                SessionPhase::Unconfigured => return Err(SessionError::NotConfigured),
                SessionPhase::Configured => {}
            }
            state.input.clone().ok_or(SessionError::NotConfigured)?
        };

        let run = input.acquire_run()?;
        {
            let mut state = self.bridge.lock();
            state.run = Some(run);
            state.phase = SessionPhase::Capturing;
        }

        self.bridge.stats().start();
        info!("Capture started");
        self.emit_phase_change(SessionPhase::Configured);
        Ok(())
    }

    /// Stop capturing, finalizing an active recording first.
    ///
    /// A no-op when not capturing. Frames delivered before the native stop
    /// completes are still forwarded to the sink.
    #[instrument(name = "session_stop", skip(self))]
    pub fn stop(&mut self) -> SessionResult<()> {
        if self.bridge.lock().phase != SessionPhase::Capturing {
            debug!("Not capturing, ignoring stop");
            return Ok(());
        }

        let finalize = self.finish_recording();

        let run = self.bridge.lock().run.take();
        let stopped = match run {
            Some(run) => run.release(),
            None => Ok(()),
        };

        self.bridge.lock().phase = SessionPhase::Configured;
        self.bridge.stats().stop();
        info!("Capture stopped");
        self.emit_phase_change(SessionPhase::Capturing);

        finalize?;
        stopped.map_err(SessionError::from)
    }

    /// Start recording captured video to `path`.
    ///
    /// Requires a capturing session. An existing file at `path` is handled
    /// according to the configured [`OverwritePolicy`].
    #[instrument(
        name = "session_record",
        skip(self, path),
        fields(path = %path.as_ref().display())
    )]
    pub fn record(&mut self, path: impl AsRef<Path>) -> SessionResult<()> {
        let path = path.as_ref().to_path_buf();

        {
            let mut state = self.bridge.lock();
            if state.phase != SessionPhase::Capturing {
                return Err(SessionError::NotCapturing);
            }
            state.recording.check_can_begin(self.config.error_policy)?;
            let input = state.input.clone().ok_or(SessionError::NotCapturing)?;

            let replaced = prepare_output_path(&path, self.config.overwrite)?;

            // Bound under the lock so the completion can never race ahead of
            // the state change below.
            let output = match input.bind_output(&path) {
                Ok(output) => output,
                Err(e) => {
                    if let Some(replaced) = replaced {
                        replaced.restore();
                    }
                    return Err(e.into());
                }
            };
            if let Some(replaced) = replaced {
                replaced.discard();
            }
            if let Err(e) = state.recording.begin(path.clone(), output) {
                drop(state);
                if let Err(stop_err) = input.stop_output(output) {
                    warn!(%output, "Failed to release rejected output: {}", stop_err);
                }
                return Err(e);
            }
            debug!(%output, "Output bound");
        }

        info!("Recording started");
        self.bridge
            .events()
            .emit(SessionEvent::RecordingStarted { path });
        Ok(())
    }

    /// Finish the active recording without stopping capture.
    ///
    /// Waits up to the configured finalize timeout for the platform to close
    /// the file. A no-op when nothing is recording.
    #[instrument(name = "session_stop_recording", skip(self))]
    pub fn stop_recording(&mut self) -> SessionResult<()> {
        self.finish_recording()
    }

    fn finish_recording(&self) -> SessionResult<()> {
        let (finish, input) = {
            let mut state = self.bridge.lock();
            (state.recording.request_finish(), state.input.clone())
        };
        let (Some((output, path)), Some(input)) = (finish, input) else {
            return Ok(());
        };

        info!(path = %path.display(), "Finalizing recording");
        self.bridge
            .events()
            .emit(SessionEvent::RecordingFinalizing { path });

        if let Err(e) = input.stop_output(output) {
            // The platform will never report this output; fail it ourselves.
            let message = e.to_string();
            self.bridge.handle_output_done(output, &Err(message));
            return Err(e.into());
        }

        let deadline = Instant::now() + self.config.finalize_timeout();
        if !self.bridge.wait_finalized(deadline) {
            warn!(
                timeout_ms = self.config.finalize_timeout_ms,
                "Recording still finalizing after timeout"
            );
        }
        Ok(())
    }

    /// Clear a failed recording, returning its outcome.
    pub fn acknowledge_error(&mut self) -> Option<RecordingOutcome> {
        self.bridge.lock().recording.acknowledge()
    }

    /// Register the frame consumer, replacing any previous one.
    pub fn register_frame_sink(&mut self, sink: impl FrameSink + 'static) {
        self.bridge.lock().frame_sink = Some(Arc::new(sink));
    }

    /// Remove the frame consumer. Subsequent frames are dropped.
    pub fn clear_frame_sink(&mut self) {
        self.bridge.lock().frame_sink = None;
    }

    /// Register a callback for recording outcomes, replacing any previous one.
    pub fn register_completion_sink(&mut self, sink: impl CompletionSink + 'static) {
        self.bridge.lock().completion_sink = Some(Arc::new(sink));
    }

    /// Subscribe to this session's events.
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.bridge
            .events()
            .subscribe(self.config.event_channel_capacity)
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.bridge.lock().phase
    }

    /// Returns true while capture is running.
    pub fn is_capturing(&self) -> bool {
        self.phase() == SessionPhase::Capturing
    }

    /// Active format, if configured.
    pub fn format(&self) -> Option<Format> {
        self.bridge.lock().format()
    }

    /// Configured device, if any.
    pub fn device(&self) -> Option<DeviceInfo> {
        self.bridge.lock().device.clone()
    }

    /// Width and height of the active format, `(0, 0)` when unconfigured.
    pub fn dimensions(&self) -> (u32, u32) {
        self.format()
            .map(|format| (format.width, format.height))
            .unwrap_or((0, 0))
    }

    /// Current recording state.
    pub fn recording_state(&self) -> RecordingState {
        self.bridge.lock().recording.state()
    }

    /// Destination of the active recording.
    pub fn recording_path(&self) -> Option<PathBuf> {
        self.bridge.lock().recording.path().map(Path::to_path_buf)
    }

    /// Outcome of the most recent finished recording.
    pub fn last_recording_result(&self) -> Option<RecordingOutcome> {
        self.bridge.lock().recording.last_result().cloned()
    }

    /// Frame delivery counters.
    pub fn frame_stats(&self) -> FrameStatsSnapshot {
        self.bridge.stats().snapshot()
    }

    fn emit_phase_change(&self, previous: SessionPhase) {
        let current = self.phase();
        if current != previous {
            debug!(from = previous.name(), to = current.name(), "Session phase changed");
            self.bridge
                .events()
                .emit(SessionEvent::PhaseChanged { previous, current });
        }
    }
}

/// An existing output file moved aside by [`OverwritePolicy::Replace`].
///
/// The original stays on disk until the new output is bound, so a failed
/// `record` leaves it in place.
struct ReplacedOutput {
    path: PathBuf,
    backup: PathBuf,
}

impl ReplacedOutput {
    /// Put the original file back.
    fn restore(self) {
        if let Err(e) = std::fs::rename(&self.backup, &self.path) {
            warn!(path = %self.path.display(), "Failed to restore replaced output: {}", e);
        }
    }

    /// Delete the original file.
    fn discard(self) {
        if let Err(e) = std::fs::remove_file(&self.backup) {
            warn!(backup = %self.backup.display(), "Failed to remove replaced output: {}", e);
        }
    }
}

fn prepare_output_path(
    path: &Path,
    policy: OverwritePolicy,
) -> SessionResult<Option<ReplacedOutput>> {
    if !path.exists() {
        return Ok(None);
    }
    match policy {
        OverwritePolicy::Error => Err(SessionError::OutputExists(path.to_path_buf())),
        OverwritePolicy::Replace => {
            let mut name = path.file_name().unwrap_or_default().to_os_string();
            name.push(".replaced");
            let backup = path.with_file_name(name);

            debug!(path = %path.display(), "Moving existing output file aside");
            std::fs::rename(path, &backup)?;
            Ok(Some(ReplacedOutput {
                path: path.to_path_buf(),
                backup,
            }))
        }
    }
}

/// Binding released by `configure`, kept so a failed open can put it back.
struct PriorBinding {
    device: DeviceId,
    format: Format,
    info: Option<DeviceInfo>,
    input: Weak<NativeInput>,
}

impl Clone for CameraSession {
    fn clone(&self) -> Self {
        let (state, input) = {
            let source = self.bridge.lock();
            let state = SessionState {
                phase: if source.input.is_some() {
                    SessionPhase::Configured
                } else {
                    SessionPhase::Unconfigured
                },
                device: source.device.clone(),
                input: source.input.clone(),
                frame_sink: source.frame_sink.clone(),
                completion_sink: source.completion_sink.clone(),
                ..SessionState::default()
            };
            (state, source.input.clone())
        };

        let bridge = Arc::new(CallbackBridge::with_state(state));
        if let Some(input) = input {
            input.attach(&bridge);
        }
        debug!("Session cloned");

        Self {
            catalog: self.catalog.clone(),
            config: self.config.clone(),
            bridge,
        }
    }

    /// Copy-then-swap: the copy is fully built before `self` changes, and the
    /// previous contents of `self` are released when the temporary drops.
    fn clone_from(&mut self, source: &Self) {
        let mut fresh = source.clone();
        std::mem::swap(self, &mut fresh);
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        let (finish, run, input) = {
            let mut state = self.bridge.lock();
            let finish = state.recording.request_finish();
            state.phase = SessionPhase::Unconfigured;
            (finish, state.run.take(), state.input.take())
        };

        // Input, then output, then the capture run.
        if let Some(input) = input {
            input.detach(&self.bridge);
            input.release(run, finish.map(|(output, _)| output));
        }
        self.bridge.stats().stop();
        debug!("Session released");
    }
}
