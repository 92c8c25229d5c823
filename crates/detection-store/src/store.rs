//! Shared-memory store implementation

use std::path::Path;
use std::ptr;
use std::sync::atomic::{fence, AtomicU32, AtomicU64, Ordering};

use tracing::warn;

use frame_shm::{Segment, ShmError, Timestamp, DEFAULT_RETRY_BOUND};

use crate::record::{BoundingBox, Detection, DetectionRecord, DetectionSnapshot};
use crate::DetectionRead;

/// Fixed capacity of the shared detection array.
pub const MAX_DETECTIONS: usize = 32;

const LABEL_LEN: usize = 16;
const DETECTION_MAGIC: u32 = 0x4443_4454; // "DCDT"
const HEADER_SIZE: usize = 64;

#[repr(C)]
struct StoreHeader {
    magic: u32,
    max_detections: u32,
    /// Advances only after the payload write completes.
    version: AtomicU32,
    _pad: u32,
    /// Seqlock guarding the payload; odd while a write is in progress.
    stamp: AtomicU64,
    _reserved: [u8; 40],
}

const _: () = assert!(std::mem::size_of::<StoreHeader>() == HEADER_SIZE);

#[repr(C)]
struct RawDetection {
    label: [u8; LABEL_LEN],
    x: f32,
    y: f32,
    w: f32,
    h: f32,
    confidence: f32,
    _pad: u32,
}

const _: () = assert!(std::mem::size_of::<RawDetection>() == 40);

#[repr(C)]
struct RawRecord {
    frame_number: u64,
    timestamp_sec: u64,
    timestamp_nsec: u32,
    num_detections: u32,
    detections: [RawDetection; MAX_DETECTIONS],
}

const _: () = assert!(std::mem::size_of::<RawRecord>() == 24 + 40 * MAX_DETECTIONS);

/// Handle to the detection store segment. One writer (the inference
/// process), any number of readers.
#[derive(Debug)]
pub struct DetectionStore {
    seg: Segment,
    retry_bound: u32,
}

impl DetectionStore {
    /// Create the store segment; version starts at the cold-start 0.
    pub fn create(path: &Path) -> Result<Self, ShmError> {
        let total = HEADER_SIZE + std::mem::size_of::<RawRecord>();
        let seg = Segment::create(path, total)?;

        let header = Self::header_ptr(&seg);
        // SAFETY: freshly created zero-filled segment, not yet shared.
        unsafe {
            ptr::write(
                header,
                StoreHeader {
                    magic: DETECTION_MAGIC,
                    max_detections: MAX_DETECTIONS as u32,
                    version: AtomicU32::new(0),
                    _pad: 0,
                    stamp: AtomicU64::new(0),
                    _reserved: [0; 40],
                },
            );
        }

        Ok(Self {
            seg,
            retry_bound: DEFAULT_RETRY_BOUND,
        })
    }

    /// Map an existing store segment, validating magic and size.
    pub fn open(path: &Path) -> Result<Self, ShmError> {
        let seg = Segment::open(path)?;
        let expected = HEADER_SIZE + std::mem::size_of::<RawRecord>();
        if seg.len() < expected {
            return Err(ShmError::LayoutMismatch {
                path: path.to_path_buf(),
                reason: format!("segment is {} bytes, expected {expected}", seg.len()),
            });
        }

        // SAFETY: length checked above.
        let magic = unsafe { (*Self::header_ptr(&seg)).magic };
        if magic != DETECTION_MAGIC {
            return Err(ShmError::BadMagic {
                path: path.to_path_buf(),
                expected: DETECTION_MAGIC,
                actual: magic,
            });
        }

        Ok(Self {
            seg,
            retry_bound: DEFAULT_RETRY_BOUND,
        })
    }

    /// Override the bounded retry count used by `read`.
    pub fn with_retry_bound(mut self, retry_bound: u32) -> Self {
        self.retry_bound = retry_bound.max(1);
        self
    }

    fn header_ptr(seg: &Segment) -> *mut StoreHeader {
        seg.base() as *mut StoreHeader
    }

    fn header(&self) -> &StoreHeader {
        // SAFETY: validated at create/open time.
        unsafe { &*Self::header_ptr(&self.seg) }
    }

    fn record(&self) -> *mut RawRecord {
        // SAFETY: segment holds one record after the header.
        unsafe { self.seg.base().add(HEADER_SIZE) as *mut RawRecord }
    }

    /// Publish a new record and return its version.
    ///
    /// The payload write completes (seqlock stamp even) before the version
    /// advances, so readers can never pair version v with a payload other
    /// than v's. Detections beyond [`MAX_DETECTIONS`] are truncated.
    pub fn write(&self, record: &DetectionRecord) -> u32 {
        let count = if record.detections.len() > MAX_DETECTIONS {
            warn!(
                total = record.detections.len(),
                kept = MAX_DETECTIONS,
                "detection record exceeds shared capacity, truncating"
            );
            MAX_DETECTIONS
        } else {
            record.detections.len()
        };

        let header = self.header();
        let raw = self.record();

        // SAFETY: single-writer contract; readers retry on the odd stamp.
        unsafe {
            header.stamp.fetch_add(1, Ordering::Acquire);

            (*raw).frame_number = record.frame_number;
            (*raw).timestamp_sec = record.timestamp.sec;
            (*raw).timestamp_nsec = record.timestamp.nsec;
            (*raw).num_detections = count as u32;
            for (slot, det) in (*raw).detections.iter_mut().zip(&record.detections) {
                let mut label = [0u8; LABEL_LEN];
                let bytes = det.label.as_bytes();
                let n = bytes.len().min(LABEL_LEN);
                label[..n].copy_from_slice(&bytes[..n]);
                slot.label = label;
                slot.x = det.bbox.x;
                slot.y = det.bbox.y;
                slot.w = det.bbox.w;
                slot.h = det.bbox.h;
                slot.confidence = det.confidence;
                slot._pad = 0;
            }

            header.stamp.fetch_add(1, Ordering::Release);
        }

        header.version.fetch_add(1, Ordering::Release) + 1
    }

    /// Snapshot the current (version, payload).
    ///
    /// An unchanged version across polls is expected (the producer runs
    /// slower than its consumers). `Stale` only when the retry bound is
    /// exhausted by concurrent writes.
    pub fn read(&self) -> DetectionRead {
        let header = self.header();

        for _ in 0..self.retry_bound {
            let version = header.version.load(Ordering::Acquire);
            if version == 0 {
                return DetectionRead::Snapshot(DetectionSnapshot::default());
            }

            let s1 = header.stamp.load(Ordering::Acquire);
            if s1 & 1 == 1 {
                continue;
            }

            let raw = self.record();
            // SAFETY: in-bounds record pointer; torn data is rejected by
            // the stamp/version re-check below.
            let (record, consistent) = unsafe {
                let count = ((*raw).num_detections as usize).min(MAX_DETECTIONS);
                let mut detections = Vec::with_capacity(count);
                for slot in (*raw).detections.iter().take(count) {
                    let end = slot
                        .label
                        .iter()
                        .position(|&b| b == 0)
                        .unwrap_or(LABEL_LEN);
                    detections.push(Detection {
                        label: String::from_utf8_lossy(&slot.label[..end]).into_owned(),
                        bbox: BoundingBox {
                            x: slot.x,
                            y: slot.y,
                            w: slot.w,
                            h: slot.h,
                        },
                        confidence: slot.confidence,
                    });
                }
                let record = DetectionRecord {
                    frame_number: (*raw).frame_number,
                    timestamp: Timestamp {
                        sec: (*raw).timestamp_sec,
                        nsec: (*raw).timestamp_nsec,
                    },
                    detections,
                };

                fence(Ordering::Acquire);
                let s2 = header.stamp.load(Ordering::Relaxed);
                let v2 = header.version.load(Ordering::Relaxed);
                (record, s1 == s2 && version == v2)
            };

            if consistent {
                return DetectionRead::Snapshot(DetectionSnapshot { version, record });
            }
        }

        DetectionRead::Stale
    }

    /// Current version without copying the payload.
    pub fn version(&self) -> u32 {
        self.header().version.load(Ordering::Acquire)
    }

    /// Path of the backing segment file.
    pub fn path(&self) -> &Path {
        self.seg.path()
    }

    /// Unmap and unlink the segment.
    pub fn destroy(self) -> Result<(), ShmError> {
        self.seg.destroy()
    }
}
