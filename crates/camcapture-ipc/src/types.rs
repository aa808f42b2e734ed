//! Device and format types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a capture device, as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a device id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A capture mode: resolution and frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Format {
    /// Width in pixels.
    pub width: u32,

    /// Height in pixels.
    pub height: u32,

    /// Frames per second.
    pub fps: f64,
}

impl Format {
    /// Create a new format.
    pub const fn new(width: u32, height: u32, fps: f64) -> Self {
        Self { width, height, fps }
    }

    /// Returns true if every field is strictly positive and the frame rate is finite.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && self.fps.is_finite() && self.fps > 0.0
    }

    /// Number of pixels in one frame.
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Duration of one frame, used to pace frame delivery.
    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.fps)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}@{}", self.width, self.height, self.fps)
    }
}

/// Identity of a capture device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Unique identifier for this device.
    pub id: DeviceId,

    /// Display name for the UI.
    pub name: String,
}

/// A device together with the formats it supports, in platform order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Device identity.
    pub info: DeviceInfo,

    /// Supported formats.
    pub formats: Vec<Format>,
}

impl Device {
    /// Device identifier.
    pub fn id(&self) -> &DeviceId {
        &self.info.id
    }

    /// Returns true if the device lists exactly this format.
    pub fn supports(&self, format: &Format) -> bool {
        self.formats.iter().any(|f| f == format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_validity() {
        assert!(Format::new(640, 480, 30.0).is_valid());
        assert!(!Format::new(0, 480, 30.0).is_valid());
        assert!(!Format::new(640, 0, 30.0).is_valid());
        assert!(!Format::new(640, 480, 0.0).is_valid());
        assert!(!Format::new(640, 480, f64::NAN).is_valid());
    }

    #[test]
    fn test_format_display() {
        assert_eq!(Format::new(1280, 720, 30.0).to_string(), "1280x720@30");
    }

    #[test]
    fn test_device_id_serializes_as_string() {
        let json = serde_json::to_string(&DeviceId::new("cam:0")).unwrap();
        assert_eq!(json, "\"cam:0\"");
    }

    #[test]
    fn test_device_supports() {
        let device = Device {
            info: DeviceInfo {
                id: DeviceId::new("cam:0"),
                name: "Built-in".to_string(),
            },
            formats: vec![Format::new(640, 480, 30.0), Format::new(1280, 720, 60.0)],
        };

        assert!(device.supports(&Format::new(1280, 720, 60.0)));
        assert!(!device.supports(&Format::new(1280, 720, 30.0)));
    }
}
