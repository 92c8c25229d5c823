//! Owned frame types copied in and out of shared memory

use serde::{Deserialize, Serialize};

/// Camera source identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraId {
    /// Daylight RGB camera
    #[default]
    Day,
    /// Low-light IR camera
    Night,
}

impl CameraId {
    /// The other camera of the pair.
    pub fn other(self) -> Self {
        match self {
            CameraId::Day => CameraId::Night,
            CameraId::Night => CameraId::Day,
        }
    }

    pub(crate) fn from_raw(raw: u8) -> Self {
        match raw {
            1 => CameraId::Night,
            _ => CameraId::Day,
        }
    }

    pub(crate) fn as_raw(self) -> u8 {
        match self {
            CameraId::Day => 0,
            CameraId::Night => 1,
        }
    }
}

/// Pixel format tag carried in each frame slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// Single-plane 8-bit luma (IR camera)
    #[default]
    Gray8,
    /// Planar luma followed by interleaved chroma
    Nv12,
    /// Packed Y0 U Y1 V
    Yuyv,
    /// Packed 8-bit RGB
    Rgb24,
}

impl PixelFormat {
    pub(crate) fn from_raw(raw: u8) -> Self {
        match raw {
            1 => PixelFormat::Nv12,
            2 => PixelFormat::Yuyv,
            3 => PixelFormat::Rgb24,
            _ => PixelFormat::Gray8,
        }
    }

    pub(crate) fn as_raw(self) -> u8 {
        match self {
            PixelFormat::Gray8 => 0,
            PixelFormat::Nv12 => 1,
            PixelFormat::Yuyv => 2,
            PixelFormat::Rgb24 => 3,
        }
    }
}

/// Capture timestamp, split the way the shared layout stores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Timestamp {
    pub sec: u64,
    pub nsec: u32,
}

impl Timestamp {
    /// Current wall-clock time.
    pub fn now() -> Self {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| Timestamp {
                sec: d.as_secs(),
                nsec: d.subsec_nanos(),
            })
            .unwrap_or_default()
    }
}

/// Frame metadata, mirroring the fixed slot record minus the payload.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameMeta {
    pub camera_id: CameraId,
    pub sequence: u64,
    pub timestamp: Timestamp,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub pixel_format: PixelFormat,
    /// Mean luma as computed by the producer (0 if not yet estimated)
    pub brightness_avg: f32,
    /// Hardware illuminance statistic; 0 means unset
    pub brightness_lux: u32,
    /// Discretized brightness zone as a raw tag
    pub brightness_zone: u8,
    pub correction_applied: bool,
}

/// An owned copy of one frame slot.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub meta: FrameMeta,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a frame with the given metadata and pixel payload.
    pub fn new(meta: FrameMeta, payload: Vec<u8>) -> Self {
        Self { meta, payload }
    }
}
