//! Captured frame types.

use std::time::Instant;

use bytes::Bytes;

/// Timestamp for a captured frame.
#[derive(Debug, Clone, Copy)]
pub struct CaptureTimestamp {
    /// Monotonic timestamp when the frame was captured.
    pub capture_time: Instant,

    /// Frame presentation timestamp in 100ns units, relative to session start.
    pub pts_100ns: u64,
}

impl CaptureTimestamp {
    /// Create a new capture timestamp.
    pub fn now(start_time: Instant) -> Self {
        let capture_time = Instant::now();
        let elapsed = capture_time.duration_since(start_time);
        let pts_100ns = elapsed.as_nanos() as u64 / 100;

        Self {
            capture_time,
            pts_100ns,
        }
    }

    /// Get the presentation timestamp in milliseconds.
    pub fn pts_ms(&self) -> u64 {
        self.pts_100ns / 10_000
    }
}

/// Pixel layout of a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 32-bit BGRA, packed.
    Bgra,

    /// Y plane followed by an interleaved, 2x2 subsampled UV plane.
    Nv12,
}

impl PixelFormat {
    /// Expected buffer size in bytes for the given dimensions.
    pub fn buffer_size(self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            Self::Bgra => pixels * 4,
            // NV12: Y plane (width * height) + UV plane (width * height / 2)
            Self::Nv12 => pixels + pixels / 2,
        }
    }
}

/// A captured video frame.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Raw pixel data.
    pub data: Bytes,

    /// Frame width in pixels.
    pub width: u32,

    /// Frame height in pixels.
    pub height: u32,

    /// Layout of `data`.
    pub pixel_format: PixelFormat,

    /// Capture timestamp.
    pub timestamp: CaptureTimestamp,

    /// Monotonically increasing sequence number.
    pub sequence: u64,
}

impl CapturedFrame {
    /// Create a new captured frame.
    pub fn new(
        data: Bytes,
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
        timestamp: CaptureTimestamp,
        sequence: u64,
    ) -> Self {
        Self {
            data,
            width,
            height,
            pixel_format,
            timestamp,
            sequence,
        }
    }

    /// Validate that the frame data matches the declared dimensions.
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == self.pixel_format.buffer_size(self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_sizes() {
        assert_eq!(PixelFormat::Bgra.buffer_size(4, 2), 32);
        assert_eq!(PixelFormat::Nv12.buffer_size(4, 2), 12);
    }

    #[test]
    fn test_frame_validation() {
        let start = Instant::now();
        let good = CapturedFrame::new(
            Bytes::from(vec![0u8; 12]),
            4,
            2,
            PixelFormat::Nv12,
            CaptureTimestamp::now(start),
            0,
        );
        assert!(good.is_valid());

        let short = CapturedFrame {
            data: Bytes::from_static(&[0u8; 5]),
            ..good.clone()
        };
        assert!(!short.is_valid());

        let empty = CapturedFrame {
            width: 0,
            data: Bytes::new(),
            ..good
        };
        assert!(!empty.is_valid());
    }

    #[test]
    fn test_pts_ms() {
        let ts = CaptureTimestamp {
            capture_time: Instant::now(),
            pts_100ns: 25_000_000,
        };
        assert_eq!(ts.pts_ms(), 2_500);
    }
}
