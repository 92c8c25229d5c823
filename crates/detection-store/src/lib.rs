//! Detection Result Store
//!
//! A single-slot, versioned shared-memory store for the latest detection
//! record. The inference process writes at its own best-effort rate;
//! overlay and streaming consumers poll at theirs.
//!
//! Publish-then-stamp: the payload is fully written (guarded by a seqlock
//! stamp) before the version counter advances, so any reader observing
//! version v gets exactly the payload of write number v. A never-written
//! store reads as version 0 with no detections, which is a valid cold
//! start, not an error.

mod record;
mod store;

pub use record::{BoundingBox, Detection, DetectionRecord, DetectionSnapshot};
pub use store::{DetectionStore, MAX_DETECTIONS};

/// Outcome of a store read.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionRead {
    /// A consistent (version, payload) snapshot.
    Snapshot(DetectionSnapshot),
    /// The retry bound was exhausted by concurrent writes; the caller
    /// should keep its previous snapshot.
    Stale,
}

impl DetectionRead {
    /// Unwrap the snapshot if the read was consistent.
    pub fn snapshot(self) -> Option<DetectionSnapshot> {
        match self {
            DetectionRead::Snapshot(s) => Some(s),
            DetectionRead::Stale => None,
        }
    }
}
