//! Service configuration
//!
//! Layered: built-in defaults, then an optional TOML file (path from
//! `DUALCAM_CONFIG`, falling back to `dualcam.toml` in the working
//! directory), then `DUALCAM_*` environment overrides.

use std::path::PathBuf;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use frame_shm::PixelFormat;
use source_select::SelectorConfig;

use crate::ServiceError;

/// Geometry of one camera's ring segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSegmentConfig {
    /// Segment file name under `shm_dir`
    pub file: String,
    /// Ring capacity in slots (~1 s at the capture rate)
    pub capacity: u32,
    /// Payload bytes per slot, sized to the largest supported frame
    pub payload_capacity: u32,
    pub pixel_format: PixelFormat,
}

impl Default for CameraSegmentConfig {
    fn default() -> Self {
        // Daylight RGB camera geometry.
        Self {
            file: "day.ring".into(),
            capacity: 30,
            payload_capacity: 1280 * 720 * 3,
            pixel_format: PixelFormat::Rgb24,
        }
    }
}

impl CameraSegmentConfig {
    fn night_default() -> Self {
        // Low-light IR camera: single-plane luma at a lower resolution.
        Self {
            file: "night.ring".into(),
            capacity: 30,
            payload_capacity: 640 * 480,
            pixel_format: PixelFormat::Gray8,
        }
    }
}

/// Full service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Directory holding every segment file
    pub shm_dir: PathBuf,
    pub day: CameraSegmentConfig,
    pub night: CameraSegmentConfig,
    /// Active-frame segment file name under `shm_dir`
    pub active_file: String,
    /// Detection store segment file name under `shm_dir`
    pub detections_file: String,
    /// Bound on snapshot-and-recheck attempts before a read is stale
    pub retry_bound: u32,
    pub selector: SelectorConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            shm_dir: PathBuf::from("/dev/shm/dualcam"),
            day: CameraSegmentConfig::default(),
            night: CameraSegmentConfig::night_default(),
            active_file: "active.frame".into(),
            detections_file: "detections".into(),
            retry_bound: frame_shm::DEFAULT_RETRY_BOUND,
            selector: SelectorConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from file and environment layers.
    pub fn load() -> Result<Self, ServiceError> {
        let mut builder = Config::builder();
        builder = match std::env::var("DUALCAM_CONFIG") {
            Ok(path) => builder.add_source(File::with_name(&path)),
            Err(_) => builder.add_source(File::with_name("dualcam").required(false)),
        };
        let loaded = builder
            .add_source(Environment::with_prefix("DUALCAM").separator("__"))
            .build()?;
        Ok(loaded.try_deserialize()?)
    }

    pub fn day_ring_path(&self) -> PathBuf {
        self.shm_dir.join(&self.day.file)
    }

    pub fn night_ring_path(&self) -> PathBuf {
        self.shm_dir.join(&self.night.file)
    }

    pub fn active_path(&self) -> PathBuf {
        self.shm_dir.join(&self.active_file)
    }

    pub fn detections_path(&self) -> PathBuf {
        self.shm_dir.join(&self.detections_file)
    }

    /// Active slot payload capacity: the larger of the two cameras, so a
    /// switch can always republish either feed.
    pub fn active_payload_capacity(&self) -> u32 {
        self.day.payload_capacity.max(self.night.payload_capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_consistent() {
        let cfg = ServiceConfig::default();
        assert_ne!(cfg.day.file, cfg.night.file);
        assert!(cfg.active_payload_capacity() >= cfg.day.payload_capacity);
        assert!(cfg.active_payload_capacity() >= cfg.night.payload_capacity);
        assert!(cfg.retry_bound >= 1);
    }

    #[test]
    fn test_paths_join_shm_dir() {
        let mut cfg = ServiceConfig::default();
        cfg.shm_dir = PathBuf::from("/tmp/cams");
        assert_eq!(cfg.day_ring_path(), PathBuf::from("/tmp/cams/day.ring"));
        assert_eq!(
            cfg.detections_path(),
            PathBuf::from("/tmp/cams/detections")
        );
    }
}
