//! Selector configuration

use std::time::Duration;

use brightness::ZoneThresholds;
use frame_shm::CameraId;
use serde::{Deserialize, Serialize};

use crate::state::SelectorMode;

/// Selector tuning. The dwell counts and intervals are empirically tuned
/// operational constants, configurable with these defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Camera probed first at startup
    pub preferred: CameraId,

    /// Consecutive dark samples before leaving DAY_ACTIVE
    /// (~1 s at the day sampling rate)
    pub dwell_dark_samples: u32,

    /// Consecutive bright samples before leaving NIGHT_ACTIVE
    /// (~2 s at the night sampling rate, deliberately the longer dwell)
    pub dwell_bright_samples: u32,

    /// Sampling interval while DAY_ACTIVE (~every 3 frames at 30 fps)
    pub day_sample_interval_ms: u64,

    /// Sampling interval while NIGHT_ACTIVE (~every 30 frames)
    pub night_sample_interval_ms: u64,

    /// Probe interval for the inactive camera
    pub probe_interval_ms: u64,

    /// No new sequence number for this long counts as a dark-threshold
    /// breach (producer stalled)
    pub stall_timeout_ms: u64,

    /// Failed probes before the probe target flips to the other camera
    pub probe_failover_after: u32,

    /// Brightness zone boundaries
    pub thresholds: ZoneThresholds,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            preferred: CameraId::Day,
            dwell_dark_samples: 10,
            dwell_bright_samples: 2,
            day_sample_interval_ms: 100,
            night_sample_interval_ms: 1000,
            probe_interval_ms: 2000,
            stall_timeout_ms: 500,
            probe_failover_after: 3,
            thresholds: ZoneThresholds::default(),
        }
    }
}

impl SelectorConfig {
    /// Sampling interval for a given automaton mode.
    pub fn sample_interval(&self, mode: SelectorMode) -> Duration {
        let ms = match mode {
            SelectorMode::DayActive => self.day_sample_interval_ms,
            SelectorMode::NightActive => self.night_sample_interval_ms,
            SelectorMode::Probing(_) => self.probe_interval_ms,
        };
        Duration::from_millis(ms)
    }

    /// Stall bound as a duration.
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }
}
