//! Lock-free frame ring buffer over a shared-memory segment
//!
//! One hard-real-time writer per ring, any number of readers. The writer
//! claims a slot by post-incrementing the header's `write_index`, marks the
//! slot's seqlock stamp odd, copies the record and payload, then marks the
//! stamp even. Readers snapshot the newest slot and re-check the stamp;
//! a bounded number of lost races yields `Stale` instead of a torn frame.

use std::path::Path;
use std::ptr;
use std::sync::atomic::{fence, Ordering};

use tracing::trace;

use crate::frame::{CameraId, Frame, PixelFormat, Timestamp};
use crate::layout::{self, RingHeader, SlotRecord, HEADER_SIZE, RING_MAGIC, SLOT_RECORD_SIZE};
use crate::segment::Segment;
use crate::{ReadOutcome, ShmError, DEFAULT_RETRY_BOUND};

/// Geometry of a ring segment at creation time.
#[derive(Debug, Clone)]
pub struct RingOptions {
    /// Number of slots (~1 s of frames at the capture rate).
    pub capacity: u32,
    /// Fixed payload bytes per slot, sized to the largest supported frame.
    pub payload_capacity: u32,
    /// Pixel format produced by this ring's camera.
    pub pixel_format: PixelFormat,
}

impl Default for RingOptions {
    fn default() -> Self {
        Self {
            capacity: 30,
            payload_capacity: 1280 * 720 * 3,
            pixel_format: PixelFormat::Rgb24,
        }
    }
}

/// Handle to one camera's frame ring.
///
/// The handle itself is read/write; the single-writer contract is between
/// processes: exactly one process calls `publish` on a given segment.
#[derive(Debug)]
pub struct FrameRing {
    seg: Segment,
    capacity: u32,
    slot_size: u32,
    payload_capacity: u32,
    retry_bound: u32,
}

impl FrameRing {
    /// Create a ring segment and initialize its header.
    pub fn create(path: &Path, opts: &RingOptions) -> Result<Self, ShmError> {
        if opts.capacity == 0 {
            return Err(ShmError::LayoutMismatch {
                path: path.to_path_buf(),
                reason: "ring capacity must be non-zero".into(),
            });
        }

        let slot_size = layout::slot_size(opts.payload_capacity);
        let total = HEADER_SIZE + opts.capacity as usize * slot_size as usize;
        let seg = Segment::create(path, total)?;

        let header = seg.base() as *mut RingHeader;
        // SAFETY: the segment is at least HEADER_SIZE bytes and freshly
        // zero-filled; no other process maps it until create returns.
        unsafe {
            ptr::write(
                header,
                RingHeader {
                    magic: RING_MAGIC,
                    capacity: opts.capacity,
                    slot_size,
                    pixel_format: opts.pixel_format.as_raw(),
                    _pad: [0; 3],
                    write_index: std::sync::atomic::AtomicU32::new(0),
                    _reserved: [0; 44],
                },
            );
        }

        Ok(Self {
            seg,
            capacity: opts.capacity,
            slot_size,
            payload_capacity: opts.payload_capacity,
            retry_bound: DEFAULT_RETRY_BOUND,
        })
    }

    /// Map an existing ring segment, validating magic and geometry.
    pub fn open(path: &Path) -> Result<Self, ShmError> {
        let seg = Segment::open(path)?;
        if seg.len() < HEADER_SIZE {
            return Err(ShmError::LayoutMismatch {
                path: path.to_path_buf(),
                reason: format!("segment is {} bytes, smaller than the header", seg.len()),
            });
        }

        // SAFETY: length checked above; the header is written once by the
        // creating process before any reader opens the file.
        let (magic, capacity, slot_size) = unsafe {
            let header = &*(seg.base() as *const RingHeader);
            (header.magic, header.capacity, header.slot_size)
        };

        if magic != RING_MAGIC {
            return Err(ShmError::BadMagic {
                path: path.to_path_buf(),
                expected: RING_MAGIC,
                actual: magic,
            });
        }

        let expected = HEADER_SIZE + capacity as usize * slot_size as usize;
        if capacity == 0 || (slot_size as usize) < SLOT_RECORD_SIZE || seg.len() < expected {
            return Err(ShmError::LayoutMismatch {
                path: path.to_path_buf(),
                reason: format!(
                    "header claims {capacity} slots of {slot_size} bytes but segment is {} bytes",
                    seg.len()
                ),
            });
        }

        Ok(Self {
            seg,
            capacity,
            slot_size,
            payload_capacity: layout::payload_capacity(slot_size),
            retry_bound: DEFAULT_RETRY_BOUND,
        })
    }

    /// Override the bounded retry count used by `read_latest`.
    pub fn with_retry_bound(mut self, retry_bound: u32) -> Self {
        self.retry_bound = retry_bound.max(1);
        self
    }

    fn header(&self) -> &RingHeader {
        // SAFETY: validated at create/open time.
        unsafe { &*(self.seg.base() as *const RingHeader) }
    }

    fn slot(&self, idx: u32) -> *mut SlotRecord {
        debug_assert!(idx < self.capacity);
        // SAFETY: idx < capacity and the segment holds `capacity` slots.
        unsafe {
            self.seg
                .base()
                .add(HEADER_SIZE + idx as usize * self.slot_size as usize)
                as *mut SlotRecord
        }
    }

    /// Publish a fully formed frame into the next slot.
    ///
    /// Never blocks and never waits on readers; returns the sequence number
    /// assigned to the frame. Fails only if the payload cannot fit the
    /// slot geometry chosen at segment creation.
    pub fn publish(&self, frame: &Frame) -> Result<u64, ShmError> {
        if frame.payload.len() > self.payload_capacity as usize {
            return Err(ShmError::FrameTooLarge {
                len: frame.payload.len(),
                capacity: self.payload_capacity as usize,
            });
        }

        let seq = self.header().write_index.fetch_add(1, Ordering::AcqRel) as u64;
        let idx = (seq % self.capacity as u64) as u32;
        let slot = self.slot(idx);

        // SAFETY: single-writer contract; readers detect the in-progress
        // copy through the odd stamp and retry.
        unsafe {
            (*slot).stamp.fetch_add(1, Ordering::Acquire);

            (*slot).sequence = seq;
            (*slot).timestamp_sec = frame.meta.timestamp.sec;
            (*slot).timestamp_nsec = frame.meta.timestamp.nsec;
            (*slot).width = frame.meta.width;
            (*slot).height = frame.meta.height;
            (*slot).stride = frame.meta.stride;
            (*slot).brightness_avg = frame.meta.brightness_avg;
            (*slot).brightness_lux = frame.meta.brightness_lux;
            (*slot).payload_len = frame.payload.len() as u32;
            (*slot).camera_id = frame.meta.camera_id.as_raw();
            (*slot).pixel_format = frame.meta.pixel_format.as_raw();
            (*slot).brightness_zone = frame.meta.brightness_zone;
            (*slot).correction_applied = frame.meta.correction_applied as u8;

            let dst = (slot as *mut u8).add(SLOT_RECORD_SIZE);
            ptr::copy_nonoverlapping(frame.payload.as_ptr(), dst, frame.payload.len());

            (*slot).stamp.fetch_add(1, Ordering::Release);
        }

        Ok(seq)
    }

    /// Snapshot the most recently published frame into `out`.
    ///
    /// `NoData` before the first publish, `Stale` when the retry bound is
    /// exhausted by concurrent overwrites; `out` is only meaningful on
    /// `Fresh`.
    pub fn read_latest(&self, out: &mut Frame) -> ReadOutcome {
        for attempt in 0..self.retry_bound {
            let write_index = self.header().write_index.load(Ordering::Acquire);
            if write_index == 0 {
                return ReadOutcome::NoData;
            }

            let expected_seq = write_index as u64 - 1;
            let idx = (write_index - 1) % self.capacity;
            let slot = self.slot(idx);

            // SAFETY: slot pointer is in bounds; torn data is rejected by
            // the stamp re-check below.
            let consistent = unsafe {
                let s1 = (*slot).stamp.load(Ordering::Acquire);
                // Odd: copy in progress. Zero: the slot was claimed (the
                // write index already moved) but its first write has not
                // completed yet.
                if s1 & 1 == 1 || s1 == 0 {
                    trace!(attempt, "slot copy in progress, retrying");
                    continue;
                }

                let len = ((*slot).payload_len).min(self.payload_capacity) as usize;
                out.meta.sequence = (*slot).sequence;
                out.meta.timestamp = Timestamp {
                    sec: (*slot).timestamp_sec,
                    nsec: (*slot).timestamp_nsec,
                };
                out.meta.width = (*slot).width;
                out.meta.height = (*slot).height;
                out.meta.stride = (*slot).stride;
                out.meta.brightness_avg = (*slot).brightness_avg;
                out.meta.brightness_lux = (*slot).brightness_lux;
                out.meta.camera_id = CameraId::from_raw((*slot).camera_id);
                out.meta.pixel_format = PixelFormat::from_raw((*slot).pixel_format);
                out.meta.brightness_zone = (*slot).brightness_zone;
                out.meta.correction_applied = (*slot).correction_applied != 0;

                out.payload.resize(len, 0);
                let src = (slot as *const u8).add(SLOT_RECORD_SIZE);
                ptr::copy_nonoverlapping(src, out.payload.as_mut_ptr(), len);

                fence(Ordering::Acquire);
                let s2 = (*slot).stamp.load(Ordering::Relaxed);
                s1 == s2
            };

            // The sequence check also rejects the window where the writer
            // has claimed the slot (write_index already advanced) but not
            // yet stamped it: the slot then still holds a lapped frame
            // from `capacity` publishes ago.
            if consistent && out.meta.sequence == expected_seq {
                return ReadOutcome::Fresh;
            }
            trace!(attempt, "slot overwritten mid-copy, retrying");
        }

        ReadOutcome::Stale
    }

    /// Allocate-and-read convenience wrapper; `None` unless a fresh
    /// snapshot was obtained.
    pub fn latest(&self) -> Option<Frame> {
        let mut frame = Frame::default();
        match self.read_latest(&mut frame) {
            ReadOutcome::Fresh => Some(frame),
            _ => None,
        }
    }

    /// Sequence number of the most recent publish, `None` before the first.
    /// Used for producer-stall detection.
    pub fn last_sequence(&self) -> Option<u64> {
        let write_index = self.header().write_index.load(Ordering::Acquire);
        if write_index == 0 {
            None
        } else {
            Some(write_index as u64 - 1)
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Fixed payload bytes per slot.
    pub fn payload_capacity(&self) -> u32 {
        self.payload_capacity
    }

    /// Pixel format recorded at segment creation.
    pub fn pixel_format(&self) -> PixelFormat {
        PixelFormat::from_raw(self.header().pixel_format)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameMeta;
    use proptest::prelude::*;

    fn test_frame(seq_hint: u8, len: usize) -> Frame {
        Frame::new(
            FrameMeta {
                camera_id: CameraId::Day,
                width: 4,
                height: 4,
                stride: 4,
                pixel_format: PixelFormat::Gray8,
                timestamp: Timestamp { sec: 1, nsec: 0 },
                ..Default::default()
            },
            vec![seq_hint; len],
        )
    }

    fn small_ring(dir: &tempfile::TempDir, capacity: u32) -> FrameRing {
        FrameRing::create(
            &dir.path().join("ring"),
            &RingOptions {
                capacity,
                payload_capacity: 64,
                pixel_format: PixelFormat::Gray8,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_cold_start_reports_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let ring = small_ring(&dir, 4);
        let mut out = Frame::default();
        assert_eq!(ring.read_latest(&mut out), ReadOutcome::NoData);
        assert_eq!(ring.last_sequence(), None);
    }

    #[test]
    fn test_publish_then_read_latest() {
        let dir = tempfile::tempdir().unwrap();
        let ring = small_ring(&dir, 4);

        assert_eq!(ring.publish(&test_frame(7, 16)).unwrap(), 0);
        assert_eq!(ring.publish(&test_frame(9, 16)).unwrap(), 1);

        let mut out = Frame::default();
        assert_eq!(ring.read_latest(&mut out), ReadOutcome::Fresh);
        assert_eq!(out.meta.sequence, 1);
        assert_eq!(out.payload, vec![9; 16]);
        assert_eq!(ring.last_sequence(), Some(1));
    }

    #[test]
    fn test_slot_reuse_keeps_sequence_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let ring = small_ring(&dir, 4);

        for i in 0..10u8 {
            ring.publish(&test_frame(i, 8)).unwrap();
        }

        let out = ring.latest().unwrap();
        assert_eq!(out.meta.sequence, 9);
        assert_eq!(out.payload, vec![9; 8]);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ring = small_ring(&dir, 4);
        let err = ring.publish(&test_frame(0, 65)).unwrap_err();
        assert!(matches!(err, ShmError::FrameTooLarge { len: 65, .. }));
    }

    #[test]
    fn test_open_validates_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bogus");
        Segment::create(&path, 4096).unwrap();
        let err = FrameRing::open(&path).unwrap_err();
        assert!(matches!(err, ShmError::BadMagic { .. }));
    }

    proptest! {
        #[test]
        fn prop_latest_always_reflects_newest_publish(count in 1usize..200) {
            let dir = tempfile::tempdir().unwrap();
            let ring = small_ring(&dir, 7);
            for i in 0..count {
                ring.publish(&test_frame((i % 256) as u8, 8)).unwrap();
            }
            prop_assert_eq!(ring.last_sequence(), Some(count as u64 - 1));
            let out = ring.latest().unwrap();
            prop_assert_eq!(out.meta.sequence, count as u64 - 1);
            prop_assert_eq!(out.payload, vec![((count - 1) % 256) as u8; 8]);
        }
    }

    #[test]
    fn test_reader_sees_writer_segment() {
        let dir = tempfile::tempdir().unwrap();
        let writer = small_ring(&dir, 4);
        let reader = FrameRing::open(writer.path()).unwrap();

        writer.publish(&test_frame(3, 8)).unwrap();

        let out = reader.latest().unwrap();
        assert_eq!(out.payload, vec![3; 8]);
        assert_eq!(reader.capacity(), 4);
        assert_eq!(reader.pixel_format(), PixelFormat::Gray8);
    }
}
