//! Brightness Estimation
//!
//! Pure functions producing a mean-luma value and a discretized zone from
//! a frame. The estimator has no knowledge of the selection automaton: the
//! selector calls it, never the reverse.
//!
//! A hardware illuminance statistic (lux), when present on the frame,
//! pushes a borderline pixel-based reading toward `Dark`. When the
//! statistic is unset (zero sentinel) brightness comes from sampling the
//! frame's luma plane directly. The estimator never fails the caller: an
//! empty or malformed payload yields a best-effort dark reading.

mod luma;

pub use luma::mean_luma;

use frame_shm::Frame;
use serde::{Deserialize, Serialize};

/// Discretized brightness classification driving automaton decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrightnessZone {
    #[default]
    Dark,
    Dim,
    Normal,
    Bright,
}

impl BrightnessZone {
    /// Raw tag as stored in the shared frame slot.
    pub fn as_raw(self) -> u8 {
        match self {
            BrightnessZone::Dark => 0,
            BrightnessZone::Dim => 1,
            BrightnessZone::Normal => 2,
            BrightnessZone::Bright => 3,
        }
    }

    /// Decode a raw tag, falling back to `Dark` for unknown values.
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => BrightnessZone::Dim,
            2 => BrightnessZone::Normal,
            3 => BrightnessZone::Bright,
            _ => BrightnessZone::Dark,
        }
    }
}

/// Zone boundaries on the 0..255 luma scale, plus the low-light lux
/// threshold for the hardware override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneThresholds {
    /// Luma below this is `Dark`
    pub dark_below: f32,
    /// Luma below this (and at least `dark_below`) is `Dim`
    pub dim_below: f32,
    /// Luma at or above this is `Bright`
    pub bright_from: f32,
    /// Hardware lux below this overrides a `Dim` reading to `Dark`
    pub low_light_lux: u32,
}

impl Default for ZoneThresholds {
    fn default() -> Self {
        Self {
            dark_below: 50.0,
            dim_below: 70.0,
            bright_from: 180.0,
            low_light_lux: 10,
        }
    }
}

/// Result of one brightness estimate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BrightnessReading {
    pub avg: f32,
    pub zone: BrightnessZone,
}

/// Classify a mean-luma value into a zone.
pub fn classify(avg: f32, thresholds: &ZoneThresholds) -> BrightnessZone {
    if avg < thresholds.dark_below {
        BrightnessZone::Dark
    } else if avg < thresholds.dim_below {
        BrightnessZone::Dim
    } else if avg < thresholds.bright_from {
        BrightnessZone::Normal
    } else {
        BrightnessZone::Bright
    }
}

/// Estimate brightness for a frame.
///
/// Pixel-based mean luma is computed from a coarse sampling grid over the
/// frame's luma plane (format-aware). A hardware lux value on the frame
/// (`brightness_lux`, 0 = unset) below the low-light threshold demotes a
/// borderline `Dim` reading to `Dark`.
pub fn estimate(frame: &Frame, thresholds: &ZoneThresholds) -> BrightnessReading {
    let avg = luma::mean_luma(frame);
    let mut zone = classify(avg, thresholds);

    let lux = frame.meta.brightness_lux;
    if lux != 0 && lux < thresholds.low_light_lux && zone == BrightnessZone::Dim {
        zone = BrightnessZone::Dark;
    }

    BrightnessReading { avg, zone }
}
