//! Camera capture demo application library.

mod commands;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use camcapture_platform::SimulatedPlatform;
use camcapture_session::{CameraSession, SessionConfig};

/// Path of a JSON [`SessionConfig`] file.
pub const CONFIG_ENV: &str = "CAMCAPTURE_CONFIG";

/// Directory recordings are written to (default: the system temp dir).
pub const OUTPUT_DIR_ENV: &str = "CAMCAPTURE_OUTPUT_DIR";

/// How long the demo records.
const RECORD_DURATION: Duration = Duration::from_secs(1);

/// Initialize logging.
fn init_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "camcapture_demo=debug,camcapture_session=debug,camcapture_platform=debug".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Load the session configuration named by `CAMCAPTURE_CONFIG`, or defaults.
pub fn load_config() -> anyhow::Result<SessionConfig> {
    let Some(path) = std::env::var_os(CONFIG_ENV) else {
        return Ok(SessionConfig::default());
    };
    let path = PathBuf::from(path);
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = serde_json::from_str(&text)
        .with_context(|| format!("invalid config {}", path.display()))?;
    info!(path = %path.display(), "Loaded session config");
    Ok(config)
}

fn output_dir() -> PathBuf {
    std::env::var_os(OUTPUT_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}

/// Run the demo: list devices, capture, record a short clip, and report.
pub fn run() -> anyhow::Result<()> {
    init_logging();
    info!("Camera capture demo starting");

    let config = load_config()?;
    let platform = SimulatedPlatform::with_default_devices();
    platform.set_frame_pump(true);
    let mut session = CameraSession::new(Arc::new(platform), config);

    let devices = commands::list_devices(&session)?;
    let device = devices.first().context("no capture devices available")?;
    let format = commands::configure_largest(&mut session, device)?;
    info!(device = %device.id(), %format, "Using device");

    let events = commands::spawn_event_logger(&session);
    let frames = commands::start_capture(&mut session)?;

    let path = output_dir().join(commands::recording_file_name());
    session
        .record(&path)
        .with_context(|| format!("failed to record to {}", path.display()))?;
    thread::sleep(RECORD_DURATION);

    session.stop().context("failed to stop capture")?;
    // Dropping the sink closes the frame channel.
    session.clear_frame_sink();
    let summary = frames
        .join()
        .map_err(|_| anyhow::anyhow!("frame consumer panicked"))?;
    let reported = commands::report(&session, &summary);

    drop(session);
    if events.join().is_err() {
        tracing::warn!("Event logger panicked");
    }
    reported?;
    info!("Camera capture demo finished");
    Ok(())
}
