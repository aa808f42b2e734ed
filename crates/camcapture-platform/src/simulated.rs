//! In-process capture platform.
//!
//! Behaves like a native capture service: devices can only be opened once,
//! frames are delivered on a pump thread (or on demand), file outputs receive
//! the raw frame bytes, and output completion is reported from a separate
//! thread after `stop_output`.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use bytes::Bytes;
use crossbeam_channel::{RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, trace, warn};

use camcapture_ipc::{DeviceId, DeviceInfo, Format};

use crate::error::PlatformError;
use crate::frame::{CaptureTimestamp, CapturedFrame, PixelFormat};
use crate::{CapturePlatform, InputHandle, OutputHandle, PlatformEvents, PlatformResult};

/// A device exposed by the simulated platform.
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    /// Device identity.
    pub info: DeviceInfo,

    /// Supported formats, in the order they are reported.
    pub formats: Vec<Format>,
}

impl SimulatedDevice {
    /// Create a simulated device.
    pub fn new(id: &str, name: &str, formats: Vec<Format>) -> Self {
        Self {
            info: DeviceInfo {
                id: DeviceId::new(id),
                name: name.to_string(),
            },
            formats,
        }
    }
}

/// In-process implementation of [`CapturePlatform`].
///
/// Cloning yields another handle to the same simulated hardware.
#[derive(Clone)]
pub struct SimulatedPlatform {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<SimState>,
    next_handle: AtomicU64,
}

struct SimState {
    available: bool,
    devices: Vec<SimulatedDevice>,
    inputs: HashMap<InputHandle, SimInput>,
    outputs: HashMap<OutputHandle, SimOutput>,
    auto_finalize: bool,
    frame_pump: bool,
    pixel_format: PixelFormat,
    fail_next_finalize: Option<String>,
    closed_inputs: u64,
}

struct SimInput {
    device: DeviceId,
    format: Format,
    events: Arc<dyn PlatformEvents>,
    running: bool,
    sequence: u64,
    start_time: Instant,
    pump: Option<FramePump>,
}

struct FramePump {
    stop_tx: Sender<()>,
    thread: JoinHandle<()>,
}

impl FramePump {
    fn halt(self) {
        let _ = self.stop_tx.send(());
        if self.thread.thread().id() == thread::current().id() {
            // Stopped from inside a frame callback; the loop exits on its own.
            return;
        }
        if self.thread.join().is_err() {
            warn!("Frame pump thread panicked");
        }
    }
}

struct SimOutput {
    input: InputHandle,
    path: PathBuf,
    events: Arc<dyn PlatformEvents>,
    writer: Option<BufWriter<File>>,
    frames_written: u64,
    write_error: Option<String>,
    stopping: bool,
}

impl SimOutput {
    fn write_frame(&mut self, frame: &CapturedFrame) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        match writer.write_all(&frame.data) {
            Ok(()) => self.frames_written += 1,
            Err(e) => {
                warn!(path = %self.path.display(), "Output write failed: {}", e);
                self.write_error.get_or_insert_with(|| e.to_string());
                self.writer = None;
            }
        }
    }

    /// Close the file and compute the completion result.
    fn finish(&mut self, forced_error: Option<String>) -> Result<(), String> {
        let flushed = match self.writer.take() {
            Some(mut writer) => writer.flush().map_err(|e| e.to_string()),
            None => Ok(()),
        };

        if let Some(message) = forced_error {
            return Err(message);
        }
        if let Some(message) = self.write_error.take() {
            return Err(message);
        }
        flushed
    }
}

impl SimulatedPlatform {
    /// Create a platform exposing the given devices.
    pub fn new(devices: Vec<SimulatedDevice>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SimState {
                    available: true,
                    devices,
                    inputs: HashMap::new(),
                    outputs: HashMap::new(),
                    auto_finalize: true,
                    frame_pump: false,
                    pixel_format: PixelFormat::Nv12,
                    fail_next_finalize: None,
                    closed_inputs: 0,
                }),
                next_handle: AtomicU64::new(1),
            }),
        }
    }

    /// A platform with two typical webcams.
    pub fn with_default_devices() -> Self {
        Self::new(vec![
            SimulatedDevice::new(
                "sim:0",
                "Simulated HD Camera",
                vec![
                    Format::new(640, 480, 30.0),
                    Format::new(1280, 720, 30.0),
                    Format::new(1280, 720, 60.0),
                    Format::new(1920, 1080, 30.0),
                ],
            ),
            SimulatedDevice::new(
                "sim:1",
                "Simulated USB Camera",
                vec![Format::new(320, 240, 15.0), Format::new(640, 480, 30.0)],
            ),
        ])
    }

    /// Make the capture subsystem (un)reachable.
    pub fn set_available(&self, available: bool) {
        self.shared.state.lock().available = available;
    }

    /// Plug in a device.
    pub fn add_device(&self, device: SimulatedDevice) {
        self.shared.state.lock().devices.push(device);
    }

    /// Unplug a device. Inputs already open on it keep running.
    pub fn remove_device(&self, id: &DeviceId) {
        self.shared
            .state
            .lock()
            .devices
            .retain(|device| &device.info.id != id);
    }

    /// Whether `stop_output` reports completion by itself (default) or waits
    /// for [`SimulatedPlatform::complete_output`].
    pub fn set_auto_finalize(&self, enabled: bool) {
        self.shared.state.lock().auto_finalize = enabled;
    }

    /// Whether running inputs produce frames on a timer at their frame rate.
    pub fn set_frame_pump(&self, enabled: bool) {
        self.shared.state.lock().frame_pump = enabled;
    }

    /// Pixel layout of synthesized frames.
    pub fn set_pixel_format(&self, pixel_format: PixelFormat) {
        self.shared.state.lock().pixel_format = pixel_format;
    }

    /// Make the next automatic output finalization fail with `message`.
    pub fn fail_next_finalize(&self, message: impl Into<String>) {
        self.shared.state.lock().fail_next_finalize = Some(message.into());
    }

    /// Synthesize and deliver one frame on the input open for `device`.
    ///
    /// Returns false if the device has no running input.
    pub fn emit_frame(&self, device: &DeviceId) -> bool {
        match self.input_for(device) {
            Some(input) => self.shared.deliver(input, None),
            None => false,
        }
    }

    /// Deliver a caller-built frame on the input open for `device`.
    pub fn emit_raw_frame(&self, device: &DeviceId, frame: CapturedFrame) -> bool {
        match self.input_for(device) {
            Some(input) => self.shared.deliver(input, Some(frame)),
            None => false,
        }
    }

    /// Report completion of an output, as the native framework would.
    ///
    /// Works for outputs that are still recording (platform-initiated stop)
    /// and for outputs waiting on manual finalization.
    pub fn complete_output(
        &self,
        output: OutputHandle,
        result: Result<(), String>,
    ) -> PlatformResult<()> {
        let (events, result) = {
            let mut state = self.shared.state.lock();
            let mut sim = state
                .outputs
                .remove(&output)
                .ok_or(PlatformError::OutputNotFound(output.raw()))?;
            let forced = result.err();
            (Arc::clone(&sim.events), sim.finish(forced))
        };

        debug!(%output, ok = result.is_ok(), "Completing output");
        events.on_file_output_done(output, result);
        Ok(())
    }

    /// Outputs that have been bound and not yet completed.
    pub fn pending_outputs(&self) -> Vec<OutputHandle> {
        let state = self.shared.state.lock();
        let mut outputs: Vec<_> = state.outputs.keys().copied().collect();
        outputs.sort_by_key(|handle| handle.raw());
        outputs
    }

    /// Number of frames written to an output that is still pending.
    pub fn frames_written(&self, output: OutputHandle) -> Option<u64> {
        self.shared
            .state
            .lock()
            .outputs
            .get(&output)
            .map(|sim| sim.frames_written)
    }

    /// Whether an input is open on `device`.
    pub fn is_open(&self, device: &DeviceId) -> bool {
        self.input_for(device).is_some()
    }

    /// Whether the input open on `device` is delivering frames.
    pub fn is_running(&self, device: &DeviceId) -> bool {
        let state = self.shared.state.lock();
        state
            .inputs
            .values()
            .any(|input| &input.device == device && input.running)
    }

    /// Number of inputs currently open.
    pub fn open_input_count(&self) -> usize {
        self.shared.state.lock().inputs.len()
    }

    /// Number of inputs closed since the platform was created.
    pub fn closed_input_count(&self) -> u64 {
        self.shared.state.lock().closed_inputs
    }

    fn input_for(&self, device: &DeviceId) -> Option<InputHandle> {
        let state = self.shared.state.lock();
        state
            .inputs
            .iter()
            .find(|(_, input)| &input.device == device)
            .map(|(handle, _)| *handle)
    }

    fn next_raw(&self) -> u64 {
        self.shared.next_handle.fetch_add(1, Ordering::SeqCst)
    }
}

impl Shared {
    /// Deliver one frame on `input`. Returns false if the input is not running.
    fn deliver(&self, input: InputHandle, frame: Option<CapturedFrame>) -> bool {
        let (events, frame) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let pixel_format = state.pixel_format;

            let Some(sim) = state.inputs.get_mut(&input) else {
                return false;
            };
            if !sim.running {
                return false;
            }

            let frame = frame.unwrap_or_else(|| synthesize_frame(sim, pixel_format));
            sim.sequence += 1;

            for output in state
                .outputs
                .values_mut()
                .filter(|output| output.input == input && !output.stopping)
            {
                output.write_frame(&frame);
            }

            (Arc::clone(&sim.events), frame)
        };

        trace!(%input, sequence = frame.sequence, "Delivering frame");
        events.on_frame(frame);
        true
    }

    /// Finalize an output according to the auto-finalize setting.
    fn finalize_output(self: &Arc<Self>, output: OutputHandle) -> PlatformResult<()> {
        let pending = {
            let mut state = self.state.lock();
            let auto = state.auto_finalize;
            let forced = if auto {
                state.fail_next_finalize.take()
            } else {
                None
            };

            let sim = state
                .outputs
                .get_mut(&output)
                .ok_or(PlatformError::OutputNotFound(output.raw()))?;
            if sim.stopping {
                return Ok(());
            }
            sim.stopping = true;

            if auto {
                let result = sim.finish(forced);
                let events = Arc::clone(&sim.events);
                state.outputs.remove(&output);
                Some((events, result))
            } else {
                None
            }
        };

        let Some((events, result)) = pending else {
            debug!(%output, "Output stopped, awaiting manual completion");
            return Ok(());
        };

        thread::Builder::new()
            .name(format!("sim-finalize-{}", output.raw()))
            .spawn(move || {
                debug!(%output, ok = result.is_ok(), "Output finalized");
                events.on_file_output_done(output, result);
            })?;

        Ok(())
    }
}

fn synthesize_frame(input: &SimInput, pixel_format: PixelFormat) -> CapturedFrame {
    let size = pixel_format.buffer_size(input.format.width, input.format.height);
    let fill = (input.sequence & 0xff) as u8;
    CapturedFrame::new(
        Bytes::from(vec![fill; size]),
        input.format.width,
        input.format.height,
        pixel_format,
        CaptureTimestamp::now(input.start_time),
        input.sequence,
    )
}

impl CapturePlatform for SimulatedPlatform {
    fn enumerate_devices(&self) -> PlatformResult<Vec<DeviceInfo>> {
        let state = self.shared.state.lock();
        if !state.available {
            return Err(PlatformError::Unavailable(
                "simulated capture subsystem offline".to_string(),
            ));
        }
        Ok(state.devices.iter().map(|d| d.info.clone()).collect())
    }

    fn device_formats(&self, device: &DeviceId) -> PlatformResult<Vec<Format>> {
        let state = self.shared.state.lock();
        if !state.available {
            return Err(PlatformError::Unavailable(
                "simulated capture subsystem offline".to_string(),
            ));
        }
        state
            .devices
            .iter()
            .find(|d| &d.info.id == device)
            .map(|d| d.formats.clone())
            .ok_or_else(|| PlatformError::DeviceNotFound(device.to_string()))
    }

    #[instrument(
        name = "sim_open_input",
        skip(self, events),
        fields(device = %device, format = %format)
    )]
    fn open_input(
        &self,
        device: &DeviceId,
        format: Format,
        events: Arc<dyn PlatformEvents>,
    ) -> PlatformResult<InputHandle> {
        let mut state = self.shared.state.lock();
        if !state.available {
            return Err(PlatformError::Unavailable(
                "simulated capture subsystem offline".to_string(),
            ));
        }

        let formats = state
            .devices
            .iter()
            .find(|d| &d.info.id == device)
            .map(|d| &d.formats)
            .ok_or_else(|| PlatformError::DeviceNotFound(device.to_string()))?;
        if !formats.contains(&format) {
            return Err(PlatformError::native(format!(
                "device {device} cannot produce {format}"
            )));
        }

        if state.inputs.values().any(|input| &input.device == device) {
            return Err(PlatformError::DeviceBusy(device.to_string()));
        }

        let handle = InputHandle::from_raw(self.next_raw());
        state.inputs.insert(
            handle,
            SimInput {
                device: device.clone(),
                format,
                events,
                running: false,
                sequence: 0,
                start_time: Instant::now(),
                pump: None,
            },
        );

        debug!(%handle, "Input opened");
        Ok(handle)
    }

    #[instrument(name = "sim_close_input", skip(self))]
    fn close_input(&self, input: InputHandle) {
        let (pump, outputs) = {
            let mut state = self.shared.state.lock();
            let Some(mut sim) = state.inputs.remove(&input) else {
                warn!(%input, "Close requested for unknown input");
                return;
            };
            state.closed_inputs += 1;
            let outputs: Vec<_> = state
                .outputs
                .iter()
                .filter(|(_, output)| output.input == input)
                .map(|(handle, _)| *handle)
                .collect();
            (sim.pump.take(), outputs)
        };

        if let Some(pump) = pump {
            pump.halt();
        }
        for output in outputs {
            if let Err(e) = self.shared.finalize_output(output) {
                warn!(%output, "Failed to finalize output on close: {}", e);
            }
        }

        debug!(%input, "Input closed");
    }

    #[instrument(name = "sim_start_session", skip(self))]
    fn start_session(&self, input: InputHandle) -> PlatformResult<()> {
        let mut state = self.shared.state.lock();
        let pump_enabled = state.frame_pump;
        let sim = state
            .inputs
            .get_mut(&input)
            .ok_or(PlatformError::InputNotFound(input.raw()))?;
        if sim.running {
            return Ok(());
        }

        if pump_enabled {
            let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
            let shared = Arc::clone(&self.shared);
            let interval = sim.format.frame_interval();
            let thread = thread::Builder::new()
                .name(format!("sim-pump-{}", input.raw()))
                .spawn(move || loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            if !shared.deliver(input, None) {
                                break;
                            }
                        }
                        _ => break,
                    }
                })?;
            sim.pump = Some(FramePump { stop_tx, thread });
        }
        sim.running = true;

        info!(%input, device = %sim.device, "Simulated capture started");
        Ok(())
    }

    #[instrument(name = "sim_stop_session", skip(self))]
    fn stop_session(&self, input: InputHandle) -> PlatformResult<()> {
        let pump = {
            let mut state = self.shared.state.lock();
            let sim = state
                .inputs
                .get_mut(&input)
                .ok_or(PlatformError::InputNotFound(input.raw()))?;
            sim.running = false;
            sim.pump.take()
        };

        // Joined outside the lock: the pump may be mid-delivery.
        if let Some(pump) = pump {
            pump.halt();
        }

        info!(%input, "Simulated capture stopped");
        Ok(())
    }

    #[instrument(name = "sim_bind_output", skip(self), fields(path = %path.display()))]
    fn bind_output_file(&self, input: InputHandle, path: &Path) -> PlatformResult<OutputHandle> {
        let mut state = self.shared.state.lock();
        let events = state
            .inputs
            .get(&input)
            .map(|sim| Arc::clone(&sim.events))
            .ok_or(PlatformError::InputNotFound(input.raw()))?;

        let file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let handle = OutputHandle::from_raw(self.next_raw());
        state.outputs.insert(
            handle,
            SimOutput {
                input,
                path: path.to_path_buf(),
                events,
                writer: Some(BufWriter::new(file)),
                frames_written: 0,
                write_error: None,
                stopping: false,
            },
        );

        debug!(%handle, "Output bound");
        Ok(handle)
    }

    fn stop_output(&self, output: OutputHandle) -> PlatformResult<()> {
        self.shared.finalize_output(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    #[derive(Default)]
    struct Recorder {
        frames: PlMutex<Vec<u64>>,
        done: PlMutex<Vec<(OutputHandle, Result<(), String>)>>,
    }

    impl PlatformEvents for Recorder {
        fn on_frame(&self, frame: CapturedFrame) {
            self.frames.lock().push(frame.sequence);
        }

        fn on_file_output_done(&self, output: OutputHandle, result: Result<(), String>) {
            self.done.lock().push((output, result));
        }
    }

    fn cam0() -> DeviceId {
        DeviceId::new("sim:0")
    }

    #[test]
    fn test_enumerate_and_formats() {
        let platform = SimulatedPlatform::with_default_devices();
        let devices = platform.enumerate_devices().unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(platform.device_formats(&cam0()).unwrap().len(), 4);
        assert!(matches!(
            platform.device_formats(&DeviceId::new("nope")),
            Err(PlatformError::DeviceNotFound(_))
        ));

        platform.set_available(false);
        assert!(matches!(
            platform.enumerate_devices(),
            Err(PlatformError::Unavailable(_))
        ));
    }

    #[test]
    fn test_device_opened_once() {
        let platform = SimulatedPlatform::with_default_devices();
        let events: Arc<dyn PlatformEvents> = Arc::new(Recorder::default());
        let format = Format::new(640, 480, 30.0);

        let input = platform.open_input(&cam0(), format, events.clone()).unwrap();
        assert!(matches!(
            platform.open_input(&cam0(), format, events.clone()),
            Err(PlatformError::DeviceBusy(_))
        ));

        platform.close_input(input);
        assert_eq!(platform.closed_input_count(), 1);
        assert!(platform.open_input(&cam0(), format, events).is_ok());
    }

    #[test]
    fn test_frames_only_while_running() {
        let platform = SimulatedPlatform::with_default_devices();
        let recorder = Arc::new(Recorder::default());
        let input = platform
            .open_input(&cam0(), Format::new(640, 480, 30.0), recorder.clone())
            .unwrap();

        assert!(!platform.emit_frame(&cam0()));
        platform.start_session(input).unwrap();
        assert!(platform.emit_frame(&cam0()));
        assert!(platform.emit_frame(&cam0()));
        platform.stop_session(input).unwrap();
        assert!(!platform.emit_frame(&cam0()));

        assert_eq!(*recorder.frames.lock(), vec![0, 1]);
    }

    #[test]
    fn test_output_writes_frames_and_completes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.raw");
        let platform = SimulatedPlatform::with_default_devices();
        platform.set_auto_finalize(false);
        let recorder = Arc::new(Recorder::default());
        let input = platform
            .open_input(&cam0(), Format::new(640, 480, 30.0), recorder.clone())
            .unwrap();
        platform.start_session(input).unwrap();

        let output = platform.bind_output_file(input, &path).unwrap();
        platform.emit_frame(&cam0());
        platform.emit_frame(&cam0());
        assert_eq!(platform.frames_written(output), Some(2));

        platform.stop_output(output).unwrap();
        platform.emit_frame(&cam0());
        assert_eq!(platform.frames_written(output), Some(2));

        platform.complete_output(output, Ok(())).unwrap();
        assert_eq!(recorder.done.lock().len(), 1);
        assert!(recorder.done.lock()[0].1.is_ok());
        assert!(platform.pending_outputs().is_empty());

        let expected = PixelFormat::Nv12.buffer_size(640, 480) as u64 * 2;
        assert_eq!(std::fs::metadata(&path).unwrap().len(), expected);
    }

    #[test]
    fn test_bind_refuses_existing_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let platform = SimulatedPlatform::with_default_devices();
        let input = platform
            .open_input(
                &cam0(),
                Format::new(640, 480, 30.0),
                Arc::new(Recorder::default()),
            )
            .unwrap();

        assert!(matches!(
            platform.bind_output_file(input, file.path()),
            Err(PlatformError::Io(_))
        ));
    }

    #[test]
    fn test_frame_pump_delivers_until_stopped() {
        let platform = SimulatedPlatform::with_default_devices();
        platform.set_frame_pump(true);
        let recorder = Arc::new(Recorder::default());
        let input = platform
            .open_input(&cam0(), Format::new(1280, 720, 60.0), recorder.clone())
            .unwrap();

        platform.start_session(input).unwrap();
        thread::sleep(std::time::Duration::from_millis(100));
        platform.stop_session(input).unwrap();

        let delivered = recorder.frames.lock().len();
        assert!(delivered > 0);
        thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(recorder.frames.lock().len(), delivered);

        let frames = recorder.frames.lock();
        assert!(frames.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
