//! Detection record types

use frame_shm::Timestamp;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

/// One detected object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Class label, e.g. "cat". Truncated to the fixed shared-memory
    /// label width on write.
    pub label: String,
    pub bbox: BoundingBox,
    /// Confidence in [0, 1]
    pub confidence: f32,
}

/// The payload of one store write.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// Sequence number of the frame the detections refer to
    pub frame_number: u64,
    pub timestamp: Timestamp,
    pub detections: Vec<Detection>,
}

/// A consistent (version, payload) snapshot returned by reads.
///
/// Version 0 with empty detections is the valid never-written sentinel.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetectionSnapshot {
    pub version: u32,
    pub record: DetectionRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_snapshot_is_cold_start_sentinel() {
        let snap = DetectionSnapshot::default();
        assert_eq!(snap.version, 0);
        assert!(snap.record.detections.is_empty());
    }
}
