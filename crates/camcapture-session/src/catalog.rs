//! Device catalog: live queries against the platform's device list.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, instrument};

use camcapture_ipc::{Device, DeviceId, Format};
use camcapture_platform::{CapturePlatform, PlatformError};

use crate::config::FormatPolicy;
use crate::error::SessionError;
use crate::SessionResult;

/// Read-only view of the platform's capture devices.
///
/// Nothing is cached: every call re-queries the platform, since devices come
/// and go while the process runs.
#[derive(Clone)]
pub struct DeviceCatalog {
    platform: Arc<dyn CapturePlatform>,
}

impl DeviceCatalog {
    /// Create a catalog over a platform.
    pub fn new(platform: Arc<dyn CapturePlatform>) -> Self {
        Self { platform }
    }

    /// The platform this catalog queries.
    pub(crate) fn platform(&self) -> &Arc<dyn CapturePlatform> {
        &self.platform
    }

    /// List every device with its supported formats.
    #[instrument(name = "list_devices", skip(self))]
    pub fn list_devices(&self) -> SessionResult<Vec<Device>> {
        let infos = self.platform.enumerate_devices()?;
        let mut devices = Vec::with_capacity(infos.len());

        for info in infos {
            match self.platform.device_formats(&info.id) {
                Ok(formats) => devices.push(Device { info, formats }),
                // Unplugged between the two queries.
                Err(PlatformError::DeviceNotFound(_)) => {
                    debug!(device = %info.id, "Device vanished during enumeration");
                }
                Err(e) => return Err(e.into()),
            }
        }

        debug!(count = devices.len(), "Enumerated capture devices");
        Ok(devices)
    }

    /// Formats supported by a device, in platform order.
    pub fn supported_formats(&self, device: &DeviceId) -> SessionResult<Vec<Format>> {
        Ok(self.platform.device_formats(device)?)
    }

    /// Look up a device by id, re-validating that it is still present.
    #[instrument(name = "find_device", skip(self), fields(device = %id))]
    pub fn find_device(&self, id: &DeviceId) -> SessionResult<Device> {
        let info = self
            .platform
            .enumerate_devices()?
            .into_iter()
            .find(|info| &info.id == id)
            .ok_or_else(|| SessionError::DeviceNotFound(id.to_string()))?;
        let formats = self.supported_formats(id)?;

        Ok(Device { info, formats })
    }
}

/// Pick the device format to use for a requested one.
pub fn match_format(
    device: &Device,
    requested: Format,
    policy: FormatPolicy,
) -> SessionResult<Format> {
    let unsupported = || SessionError::UnsupportedFormat {
        device: device.id().to_string(),
        requested,
    };

    if !requested.is_valid() {
        return Err(unsupported());
    }

    let found = match policy {
        FormatPolicy::Exact => device.supports(&requested).then_some(requested),
        FormatPolicy::Nearest => device
            .formats
            .iter()
            .min_by(|a, b| compare_distance(a, b, &requested))
            .copied(),
    };

    found.ok_or_else(unsupported)
}

fn dimension_distance(format: &Format, requested: &Format) -> u64 {
    u64::from(format.width.abs_diff(requested.width))
        + u64::from(format.height.abs_diff(requested.height))
}

fn compare_distance(a: &Format, b: &Format, requested: &Format) -> Ordering {
    dimension_distance(a, requested)
        .cmp(&dimension_distance(b, requested))
        .then_with(|| {
            let fa = (a.fps - requested.fps).abs();
            let fb = (b.fps - requested.fps).abs();
            fa.partial_cmp(&fb).unwrap_or(Ordering::Equal)
        })
}
