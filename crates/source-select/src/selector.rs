//! The selection automaton

use std::time::Instant;

use tracing::{debug, info, warn};

use brightness::{BrightnessReading, BrightnessZone};
use frame_shm::{ActiveFrameBuffer, CameraId, Frame, FrameRing, ReadOutcome};

use crate::config::SelectorConfig;
use crate::state::{CameraState, SelectorMode};

/// A completed mode change, reported by `tick` for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SelectorMode,
    pub to: SelectorMode,
    /// Active-buffer generation after the change
    pub generation: u32,
}

/// Per-camera publish progress, for producer-stall detection.
#[derive(Debug, Clone, Copy, Default)]
struct Watermark {
    last: Option<u64>,
    since: Option<Instant>,
}

/// The active-camera selection automaton.
///
/// Owns reader handles for both camera rings and the writer handle for the
/// canonical active slot. Every mode change copies the new camera's frame
/// into the active slot before the generation counter advances.
pub struct ActiveFrameSelector {
    cfg: SelectorConfig,
    state: CameraState,
    day: FrameRing,
    night: FrameRing,
    active: ActiveFrameBuffer,
    scratch: Frame,
    last_reading: Option<BrightnessReading>,
    watermarks: [Watermark; 2],
}

fn cam_index(camera: CameraId) -> usize {
    match camera {
        CameraId::Day => 0,
        CameraId::Night => 1,
    }
}

impl ActiveFrameSelector {
    /// Build the selector. Startup never assumes data is present: the
    /// automaton begins by probing the preferred camera if its ring has
    /// ever been written, the alternate otherwise.
    pub fn new(
        day: FrameRing,
        night: FrameRing,
        active: ActiveFrameBuffer,
        cfg: SelectorConfig,
    ) -> Self {
        let preferred_ring = match cfg.preferred {
            CameraId::Day => &day,
            CameraId::Night => &night,
        };
        let probe = if preferred_ring.last_sequence().is_some() {
            cfg.preferred
        } else {
            cfg.preferred.other()
        };
        info!(?probe, "selector starting, probing");

        Self {
            state: CameraState::new(SelectorMode::Probing(probe)),
            cfg,
            day,
            night,
            active,
            scratch: Frame::default(),
            last_reading: None,
            watermarks: [Watermark::default(); 2],
        }
    }

    /// Current automaton mode.
    pub fn mode(&self) -> SelectorMode {
        self.state.mode
    }

    /// Full automaton state, for inspection.
    pub fn state(&self) -> &CameraState {
        &self.state
    }

    /// Sampling interval for the current mode, for the driving task.
    pub fn sample_interval(&self) -> std::time::Duration {
        self.cfg.sample_interval(self.state.mode)
    }

    /// Run one sample step at time `now`. Non-blocking and bounded;
    /// returns the transition if this step changed the mode.
    pub fn tick(&mut self, now: Instant) -> Option<Transition> {
        match self.state.mode {
            SelectorMode::DayActive => self.tick_active(CameraId::Day, now),
            SelectorMode::NightActive => self.tick_active(CameraId::Night, now),
            SelectorMode::Probing(camera) => self.tick_probe(camera, now),
        }
    }

    fn read_camera(&mut self, camera: CameraId) -> ReadOutcome {
        let ring = match camera {
            CameraId::Day => &self.day,
            CameraId::Night => &self.night,
        };
        ring.read_latest(&mut self.scratch)
    }

    /// Track publish progress; true once the producer has shown no new
    /// sequence number for the stall timeout.
    fn update_watermark(&mut self, camera: CameraId, now: Instant) -> bool {
        let seq = match camera {
            CameraId::Day => self.day.last_sequence(),
            CameraId::Night => self.night.last_sequence(),
        };
        let mark = &mut self.watermarks[cam_index(camera)];
        if mark.since.is_none() || mark.last != seq {
            mark.last = seq;
            mark.since = Some(now);
            return false;
        }
        match mark.since {
            Some(since) => now.duration_since(since) >= self.cfg.stall_timeout(),
            None => false,
        }
    }

    fn reset_watermark(&mut self, camera: CameraId, now: Instant) {
        let seq = match camera {
            CameraId::Day => self.day.last_sequence(),
            CameraId::Night => self.night.last_sequence(),
        };
        self.watermarks[cam_index(camera)] = Watermark {
            last: seq,
            since: Some(now),
        };
    }

    fn tick_active(&mut self, camera: CameraId, now: Instant) -> Option<Transition> {
        let outcome = self.read_camera(camera);
        let stalled = self.update_watermark(camera, now);
        if stalled {
            warn!(?camera, "active camera stalled, counting as dark");
        }

        let reading = match outcome {
            ReadOutcome::Fresh => {
                let reading = brightness::estimate(&self.scratch, &self.cfg.thresholds);
                self.last_reading = Some(reading);
                Some(reading)
            }
            // Stale means a lost seqlock race: reuse the previous reading.
            ReadOutcome::Stale => self.last_reading,
            ReadOutcome::NoData => None,
        };

        if outcome == ReadOutcome::Fresh {
            // Steady-state republish; the generation moves only on switches.
            if let Err(error) = self.active.republish(&self.scratch) {
                warn!(%error, "active-slot republish failed");
            }
        }

        let dark = stalled || reading.map_or(true, |r| r.zone == BrightnessZone::Dark);
        let bright = !stalled && reading.is_some_and(|r| r.zone == BrightnessZone::Bright);

        match camera {
            CameraId::Day => {
                if dark {
                    self.state.consecutive_dark += 1;
                } else {
                    self.state.consecutive_dark = 0;
                }
                if self.state.consecutive_dark >= self.cfg.dwell_dark_samples {
                    return self.switch_to(CameraId::Night, now);
                }
            }
            CameraId::Night => {
                if bright {
                    self.state.consecutive_bright += 1;
                } else {
                    self.state.consecutive_bright = 0;
                }
                if self.state.consecutive_bright >= self.cfg.dwell_bright_samples {
                    return self.switch_to(CameraId::Day, now);
                }

                // A stalled night producer falls back on the (shorter)
                // dark dwell rather than waiting out the bright dwell.
                if stalled {
                    self.state.consecutive_dark += 1;
                } else {
                    self.state.consecutive_dark = 0;
                }
                if self.state.consecutive_dark >= self.cfg.dwell_dark_samples {
                    return self.switch_to(CameraId::Day, now);
                }
            }
        }

        None
    }

    fn tick_probe(&mut self, camera: CameraId, now: Instant) -> Option<Transition> {
        let outcome = self.read_camera(camera);

        if outcome == ReadOutcome::Fresh {
            let reading = brightness::estimate(&self.scratch, &self.cfg.thresholds);
            if reading.zone != BrightnessZone::Dark {
                // First valid probe wins; no dwell while probing.
                let from = self.state.mode;
                match self.active.switch_to(camera, &self.scratch) {
                    Ok(generation) => {
                        let to = SelectorMode::for_camera(camera);
                        info!(?from, ?to, generation, avg = reading.avg, "probe succeeded");
                        self.enter(to, now);
                        self.reset_watermark(camera, now);
                        return Some(Transition {
                            from,
                            to,
                            generation,
                        });
                    }
                    Err(error) => {
                        warn!(%error, ?camera, "probe frame could not be republished");
                    }
                }
            }
        }

        self.state.failed_probes += 1;
        if self.state.failed_probes >= self.cfg.probe_failover_after {
            let other = camera.other();
            debug!(?camera, ?other, "probe target unusable, flipping probe");
            self.state.mode = SelectorMode::Probing(other);
            self.state.failed_probes = 0;
        }
        None
    }

    fn switch_to(&mut self, target: CameraId, now: Instant) -> Option<Transition> {
        let from = self.state.mode;
        let outcome = self.read_camera(target);

        let to = if outcome == ReadOutcome::Fresh {
            match self.active.switch_to(target, &self.scratch) {
                Ok(generation) => {
                    let to = SelectorMode::for_camera(target);
                    info!(?from, ?to, generation, "switched active camera");
                    self.enter(to, now);
                    self.reset_watermark(target, now);
                    return Some(Transition {
                        from,
                        to,
                        generation,
                    });
                }
                Err(error) => {
                    warn!(%error, ?target, "switch republish failed, probing instead");
                    SelectorMode::Probing(target)
                }
            }
        } else {
            // Never announce a camera we cannot republish from.
            warn!(?target, ?outcome, "switch target has no usable frame, probing it");
            SelectorMode::Probing(target)
        };

        self.enter(to, now);
        Some(Transition {
            from,
            to,
            generation: self.active.generation(),
        })
    }

    fn enter(&mut self, mode: SelectorMode, now: Instant) {
        self.state.mode = mode;
        self.state.reset_counters();
        self.state.last_switch = Some(now);
        self.last_reading = None;
    }
}
