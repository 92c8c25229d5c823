//! Automaton state

use std::time::Instant;

use frame_shm::CameraId;
use serde::{Deserialize, Serialize};

/// Automaton mode. `Probing` carries the camera currently being probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorMode {
    DayActive,
    NightActive,
    Probing(CameraId),
}

impl SelectorMode {
    /// Camera whose feed is authoritative, `None` while probing.
    pub fn active_camera(self) -> Option<CameraId> {
        match self {
            SelectorMode::DayActive => Some(CameraId::Day),
            SelectorMode::NightActive => Some(CameraId::Night),
            SelectorMode::Probing(_) => None,
        }
    }

    /// The active mode corresponding to a camera.
    pub fn for_camera(camera: CameraId) -> Self {
        match camera {
            CameraId::Day => SelectorMode::DayActive,
            CameraId::Night => SelectorMode::NightActive,
        }
    }
}

/// Mutable selector state; owned solely by the selector and reset on cold
/// start (hysteresis does not persist across restarts).
#[derive(Debug, Clone)]
pub struct CameraState {
    pub mode: SelectorMode,
    /// Consecutive dark (or stalled) samples
    pub consecutive_dark: u32,
    /// Consecutive bright samples
    pub consecutive_bright: u32,
    /// Consecutive failed probes of the current probe target
    pub failed_probes: u32,
    /// Time of the last mode change
    pub last_switch: Option<Instant>,
}

impl CameraState {
    pub fn new(mode: SelectorMode) -> Self {
        Self {
            mode,
            consecutive_dark: 0,
            consecutive_bright: 0,
            failed_probes: 0,
            last_switch: None,
        }
    }

    /// Reset all dwell counters, as required on every transition.
    pub fn reset_counters(&mut self) {
        self.consecutive_dark = 0;
        self.consecutive_bright = 0;
        self.failed_probes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_camera_mapping() {
        assert_eq!(SelectorMode::DayActive.active_camera(), Some(CameraId::Day));
        assert_eq!(
            SelectorMode::NightActive.active_camera(),
            Some(CameraId::Night)
        );
        assert_eq!(SelectorMode::Probing(CameraId::Day).active_camera(), None);
        assert_eq!(
            SelectorMode::for_camera(CameraId::Night),
            SelectorMode::NightActive
        );
    }

    #[test]
    fn test_counter_reset() {
        let mut state = CameraState::new(SelectorMode::DayActive);
        state.consecutive_dark = 5;
        state.consecutive_bright = 2;
        state.failed_probes = 1;
        state.reset_counters();
        assert_eq!(state.consecutive_dark, 0);
        assert_eq!(state.consecutive_bright, 0);
        assert_eq!(state.failed_probes, 0);
    }
}
