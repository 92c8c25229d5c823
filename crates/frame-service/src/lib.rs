//! Dualcam Pipeline Service
//!
//! Host process for the frame-sharing core: creates the shared-memory
//! segments, runs the source-selection task, and exposes the facade that
//! rendering/streaming collaborators poll (`read_latest_frame`,
//! `read_detection`, `current_active_camera`). Capture and inference run
//! as separate processes and attach to the same segments through
//! `FrameRing::open` / `DetectionStore::open`.

mod config;
mod service;

pub use config::{CameraSegmentConfig, ServiceConfig};
pub use service::SelectorService;

use thiserror::Error;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use detection_store::{DetectionRead, DetectionStore};
use frame_shm::{
    ActiveFrameBuffer, CameraId, Frame, FrameRing, ReadOutcome, RingOptions, ShmError,
};
use source_select::ActiveFrameSelector;

/// Service error types
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error(transparent)]
    Shm(#[from] ShmError),
}

/// Handles to every segment of one pipeline instance.
///
/// Created once at startup and passed to whatever needs it; dropping the
/// context unmaps the segments but leaves the files (and the last
/// published values) in place for straggling readers.
pub struct PipelineContext {
    pub day_ring: FrameRing,
    pub night_ring: FrameRing,
    pub active: ActiveFrameBuffer,
    pub detections: DetectionStore,
}

impl PipelineContext {
    /// Create all segments fresh (the service is the segment owner).
    pub fn create(cfg: &ServiceConfig) -> Result<Self, ServiceError> {
        let day_ring = FrameRing::create(
            &cfg.day_ring_path(),
            &RingOptions {
                capacity: cfg.day.capacity,
                payload_capacity: cfg.day.payload_capacity,
                pixel_format: cfg.day.pixel_format,
            },
        )?
        .with_retry_bound(cfg.retry_bound);

        let night_ring = FrameRing::create(
            &cfg.night_ring_path(),
            &RingOptions {
                capacity: cfg.night.capacity,
                payload_capacity: cfg.night.payload_capacity,
                pixel_format: cfg.night.pixel_format,
            },
        )?
        .with_retry_bound(cfg.retry_bound);

        let active = ActiveFrameBuffer::create(&cfg.active_path(), cfg.active_payload_capacity())?
            .with_retry_bound(cfg.retry_bound);
        let detections =
            DetectionStore::create(&cfg.detections_path())?.with_retry_bound(cfg.retry_bound);

        info!(dir = %cfg.shm_dir.display(), "pipeline segments created");
        Ok(Self {
            day_ring,
            night_ring,
            active,
            detections,
        })
    }

    /// Attach to segments created by another process.
    pub fn open(cfg: &ServiceConfig) -> Result<Self, ServiceError> {
        Ok(Self {
            day_ring: FrameRing::open(&cfg.day_ring_path())?.with_retry_bound(cfg.retry_bound),
            night_ring: FrameRing::open(&cfg.night_ring_path())?.with_retry_bound(cfg.retry_bound),
            active: ActiveFrameBuffer::open(&cfg.active_path())?.with_retry_bound(cfg.retry_bound),
            detections: DetectionStore::open(&cfg.detections_path())?
                .with_retry_bound(cfg.retry_bound),
        })
    }

    /// Build the selection automaton over freshly opened handles of the
    /// same segments.
    pub fn build_selector(&self, cfg: &ServiceConfig) -> Result<ActiveFrameSelector, ServiceError> {
        let day = FrameRing::open(&cfg.day_ring_path())?.with_retry_bound(cfg.retry_bound);
        let night = FrameRing::open(&cfg.night_ring_path())?.with_retry_bound(cfg.retry_bound);
        let active = ActiveFrameBuffer::open(&cfg.active_path())?.with_retry_bound(cfg.retry_bound);
        Ok(ActiveFrameSelector::new(
            day,
            night,
            active,
            cfg.selector.clone(),
        ))
    }

    /// Latest canonical active frame.
    pub fn read_latest_frame(&self, out: &mut Frame) -> ReadOutcome {
        self.active.read(out)
    }

    /// Latest detection snapshot.
    pub fn read_detection(&self) -> DetectionRead {
        self.detections.read()
    }

    /// Currently selected camera; `None` before the first selection.
    pub fn current_active_camera(&self) -> Option<CameraId> {
        self.active.selected_camera()
    }

    /// Unmap and unlink every segment (explicit teardown).
    pub fn destroy(self) -> Result<(), ShmError> {
        self.day_ring.destroy()?;
        self.night_ring.destroy()?;
        self.active.destroy()?;
        self.detections.destroy()
    }
}

/// Install the global fmt subscriber.
pub fn init_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}
