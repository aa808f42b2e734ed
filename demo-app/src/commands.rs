//! Steps of the demo, each driving one part of the session API.

use std::thread::{self, JoinHandle};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use tracing::{debug, info, warn};

use camcapture_session::{
    frame_channel, CameraSession, Device, Format, SessionEvent, FRAME_CHANNEL_CAPACITY,
};

/// Totals seen by the frame consumer thread.
#[derive(Debug, Default)]
pub struct FrameSummary {
    pub frames: u64,
    pub bytes: u64,
}

/// Enumerate devices and print them as JSON.
pub fn list_devices(session: &CameraSession) -> anyhow::Result<Vec<Device>> {
    let devices = session
        .catalog()
        .list_devices()
        .context("failed to enumerate capture devices")?;
    println!("{}", serde_json::to_string_pretty(&devices)?);
    Ok(devices)
}

/// Configure `device` at its largest format, preferring the higher frame rate.
pub fn configure_largest(session: &mut CameraSession, device: &Device) -> anyhow::Result<Format> {
    let format = device
        .formats
        .iter()
        .max_by(|a, b| {
            a.pixel_count()
                .cmp(&b.pixel_count())
                .then_with(|| a.fps.total_cmp(&b.fps))
        })
        .copied()
        .with_context(|| format!("device {} reports no formats", device.id()))?;

    session
        .configure(device.id(), format.width, format.height, format.fps)
        .with_context(|| format!("failed to configure {}", device.id()))
}

/// Log session events until the session goes away.
pub fn spawn_event_logger(session: &CameraSession) -> JoinHandle<()> {
    let events = session.subscribe();
    thread::spawn(move || {
        for event in events {
            match &event {
                SessionEvent::RecordingFinished(outcome) if !outcome.is_success() => {
                    warn!(?event, "Session event");
                }
                _ => info!(?event, "Session event"),
            }
        }
        debug!("Event logger stopped");
    })
}

/// Register a channel sink, start capture, and consume frames on a thread.
pub fn start_capture(session: &mut CameraSession) -> anyhow::Result<JoinHandle<FrameSummary>> {
    let (sink, frames) = frame_channel(FRAME_CHANNEL_CAPACITY);
    session.register_frame_sink(sink);
    session.start().context("failed to start capture")?;

    Ok(thread::spawn(move || {
        let mut summary = FrameSummary::default();
        for frame in frames {
            summary.frames += 1;
            summary.bytes += frame.data.len() as u64;
        }
        debug!(frames = summary.frames, "Frame consumer stopped");
        summary
    }))
}

/// File name for a new recording.
pub fn recording_file_name() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    format!("camcapture-{millis}.raw")
}

/// Print the recording outcome and frame counters.
pub fn report(session: &CameraSession, summary: &FrameSummary) -> anyhow::Result<()> {
    let outcome = session
        .last_recording_result()
        .context("recording did not finish")?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    println!("{}", serde_json::to_string_pretty(&session.frame_stats())?);
    info!(
        frames = summary.frames,
        bytes = summary.bytes,
        "Frames consumed"
    );

    match &outcome.error {
        None => Ok(()),
        Some(error) => anyhow::bail!("recording to {} failed: {error}", outcome.path.display()),
    }
}
