//! Shared-Memory Frame Transport
//!
//! Lock-free distribution of camera frames between independent processes:
//! - Per-camera ring buffers with a hard-real-time single writer and any
//!   number of non-blocking readers
//! - A canonical "active frame" slot republished by the source selector
//!
//! Correctness rests on atomic counters plus a per-slot seqlock stamp
//! (stamp, copy, re-check, retry-on-mismatch). The writer never waits on
//! readers; readers that lose the race a bounded number of times get a
//! `Stale` outcome and reuse their previous value.

mod active;
mod frame;
mod layout;
mod ring;
mod segment;

pub use active::ActiveFrameBuffer;
pub use frame::{CameraId, Frame, FrameMeta, PixelFormat, Timestamp};
pub use ring::{FrameRing, RingOptions};
pub use segment::Segment;

use std::path::PathBuf;
use thiserror::Error;

/// Default bound on snapshot-and-recheck attempts before a read is
/// declared stale.
pub const DEFAULT_RETRY_BOUND: u32 = 3;

/// Shared-memory segment errors. All of these are fatal at startup;
/// nothing on the steady-state path produces them.
#[derive(Error, Debug)]
pub enum ShmError {
    #[error("failed to create segment {path}: {source}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to open segment {path}: {source}")]
    OpenSegment {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to map segment {path}: {source}")]
    Map {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("segment {path} has bad magic: expected {expected:#010x}, got {actual:#010x}")]
    BadMagic {
        path: PathBuf,
        expected: u32,
        actual: u32,
    },

    #[error("segment {path} layout mismatch: {reason}")]
    LayoutMismatch { path: PathBuf, reason: String },

    #[error("frame payload ({len} bytes) exceeds slot payload capacity ({capacity} bytes)")]
    FrameTooLarge { len: usize, capacity: usize },
}

/// Outcome of a non-blocking read.
///
/// `Stale` and `NoData` are recoverable conditions, not errors: callers
/// reuse their previous value on `Stale` and treat `NoData` as a valid
/// cold start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A consistent snapshot was copied out.
    Fresh,
    /// The retry bound was exhausted by concurrent overwrites.
    Stale,
    /// The segment has never been written.
    NoData,
}

impl ReadOutcome {
    /// True when the output buffer holds a consistent new snapshot.
    pub fn is_fresh(self) -> bool {
        matches!(self, ReadOutcome::Fresh)
    }
}
