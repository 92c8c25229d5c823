//! Canonical active-frame slot
//!
//! A single republished frame slot plus the selected-camera identifier and
//! a switch-generation counter. The selector copies the newly active
//! camera's frame first and only then advances the generation
//! (publish-before-announce), so consumers detecting a generation change
//! never race the copy.

use std::path::Path;
use std::ptr;
use std::sync::atomic::{fence, AtomicU32, Ordering};

use crate::frame::{CameraId, Frame, PixelFormat, Timestamp};
use crate::layout::{self, ActiveHeader, SlotRecord, ACTIVE_MAGIC, HEADER_SIZE, SLOT_RECORD_SIZE};
use crate::segment::Segment;
use crate::{ReadOutcome, ShmError, DEFAULT_RETRY_BOUND};

/// Handle to the active-frame segment. Exactly one process (the selector)
/// writes it; overlay and streaming consumers read it.
pub struct ActiveFrameBuffer {
    seg: Segment,
    payload_capacity: u32,
    retry_bound: u32,
}

impl ActiveFrameBuffer {
    /// Create the active-frame segment.
    pub fn create(path: &Path, payload_capacity: u32) -> Result<Self, ShmError> {
        let slot_size = layout::slot_size(payload_capacity);
        let total = HEADER_SIZE + slot_size as usize;
        let seg = Segment::create(path, total)?;

        let header = seg.base() as *mut ActiveHeader;
        // SAFETY: freshly created zero-filled segment, not yet shared.
        unsafe {
            ptr::write(
                header,
                ActiveHeader {
                    magic: ACTIVE_MAGIC,
                    slot_size,
                    selected_camera: AtomicU32::new(0),
                    generation: AtomicU32::new(0),
                    _reserved: [0; 48],
                },
            );
        }

        Ok(Self {
            seg,
            payload_capacity,
            retry_bound: DEFAULT_RETRY_BOUND,
        })
    }

    /// Map an existing active-frame segment.
    pub fn open(path: &Path) -> Result<Self, ShmError> {
        let seg = Segment::open(path)?;
        if seg.len() < HEADER_SIZE + SLOT_RECORD_SIZE {
            return Err(ShmError::LayoutMismatch {
                path: path.to_path_buf(),
                reason: format!("segment is {} bytes, smaller than one slot", seg.len()),
            });
        }

        // SAFETY: length checked above.
        let (magic, slot_size) = unsafe {
            let header = &*(seg.base() as *const ActiveHeader);
            (header.magic, header.slot_size)
        };

        if magic != ACTIVE_MAGIC {
            return Err(ShmError::BadMagic {
                path: path.to_path_buf(),
                expected: ACTIVE_MAGIC,
                actual: magic,
            });
        }
        if seg.len() < HEADER_SIZE + slot_size as usize {
            return Err(ShmError::LayoutMismatch {
                path: path.to_path_buf(),
                reason: format!(
                    "header claims a {slot_size}-byte slot but segment is {} bytes",
                    seg.len()
                ),
            });
        }

        Ok(Self {
            seg,
            payload_capacity: layout::payload_capacity(slot_size),
            retry_bound: DEFAULT_RETRY_BOUND,
        })
    }

    /// Override the bounded retry count used by `read`.
    pub fn with_retry_bound(mut self, retry_bound: u32) -> Self {
        self.retry_bound = retry_bound.max(1);
        self
    }

    fn header(&self) -> &ActiveHeader {
        // SAFETY: validated at create/open time.
        unsafe { &*(self.seg.base() as *const ActiveHeader) }
    }

    fn slot(&self) -> *mut SlotRecord {
        // SAFETY: segment holds one slot immediately after the header.
        unsafe { self.seg.base().add(HEADER_SIZE) as *mut SlotRecord }
    }

    fn copy_slot(&self, frame: &Frame) -> Result<(), ShmError> {
        if frame.payload.len() > self.payload_capacity as usize {
            return Err(ShmError::FrameTooLarge {
                len: frame.payload.len(),
                capacity: self.payload_capacity as usize,
            });
        }

        let slot = self.slot();
        // SAFETY: single-writer contract; readers retry on the odd stamp.
        unsafe {
            (*slot).stamp.fetch_add(1, Ordering::Acquire);

            (*slot).sequence = frame.meta.sequence;
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
        Ok(())
    }

    /// Refresh the slot content from the currently active camera without
    /// touching the generation counter (steady-state republish).
    pub fn republish(&self, frame: &Frame) -> Result<(), ShmError> {
        self.copy_slot(frame)
    }

    /// Switch the active camera: copy the new camera's frame into the
    /// slot, then announce by storing the camera id and bumping the
    /// generation. Returns the new generation.
    pub fn switch_to(&self, camera: CameraId, frame: &Frame) -> Result<u32, ShmError> {
        self.copy_slot(frame)?;
        let header = self.header();
        header
            .selected_camera
            .store(camera.as_raw() as u32, Ordering::Release);
        Ok(header.generation.fetch_add(1, Ordering::Release) + 1)
    }

    /// Snapshot the active frame into `out`. `NoData` until the first
    /// switch republishes a frame.
    pub fn read(&self, out: &mut Frame) -> ReadOutcome {
        let slot = self.slot();

        for _ in 0..self.retry_bound {
            // SAFETY: slot pointer is in bounds; torn data is rejected by
            // the stamp re-check.
            let consistent = unsafe {
                let s1 = (*slot).stamp.load(Ordering::Acquire);
                if s1 == 0 {
                    return ReadOutcome::NoData;
                }
                if s1 & 1 == 1 {
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

            if consistent {
                return ReadOutcome::Fresh;
            }
        }

        ReadOutcome::Stale
    }

    /// Camera currently selected; `None` until the first switch.
    pub fn selected_camera(&self) -> Option<CameraId> {
        let header = self.header();
        if header.generation.load(Ordering::Acquire) == 0 {
            return None;
        }
        Some(CameraId::from_raw(
            header.selected_camera.load(Ordering::Acquire) as u8,
        ))
    }

    /// Switch-generation counter; 0 until the first switch.
    pub fn generation(&self) -> u32 {
        self.header().generation.load(Ordering::Acquire)
    }

    /// Fixed payload bytes of the slot.
    pub fn payload_capacity(&self) -> u32 {
        self.payload_capacity
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

    fn ir_frame(fill: u8) -> Frame {
        Frame::new(
            FrameMeta {
                camera_id: CameraId::Night,
                width: 8,
                height: 2,
                stride: 8,
                pixel_format: PixelFormat::Gray8,
                ..Default::default()
            },
            vec![fill; 16],
        )
    }

    #[test]
    fn test_unselected_until_first_switch() {
        let dir = tempfile::tempdir().unwrap();
        let active = ActiveFrameBuffer::create(&dir.path().join("active"), 64).unwrap();

        assert_eq!(active.generation(), 0);
        assert_eq!(active.selected_camera(), None);
        let mut out = Frame::default();
        assert_eq!(active.read(&mut out), ReadOutcome::NoData);
    }

    #[test]
    fn test_switch_publishes_before_announcing() {
        let dir = tempfile::tempdir().unwrap();
        let active = ActiveFrameBuffer::create(&dir.path().join("active"), 64).unwrap();

        let gen = active.switch_to(CameraId::Night, &ir_frame(5)).unwrap();
        assert_eq!(gen, 1);
        assert_eq!(active.selected_camera(), Some(CameraId::Night));

        let mut out = Frame::default();
        assert_eq!(active.read(&mut out), ReadOutcome::Fresh);
        assert_eq!(out.meta.camera_id, CameraId::Night);
        assert_eq!(out.payload, vec![5; 16]);
    }

    #[test]
    fn test_republish_leaves_generation_alone() {
        let dir = tempfile::tempdir().unwrap();
        let active = ActiveFrameBuffer::create(&dir.path().join("active"), 64).unwrap();

        active.switch_to(CameraId::Day, &ir_frame(1)).unwrap();
        active.republish(&ir_frame(2)).unwrap();
        active.republish(&ir_frame(3)).unwrap();

        assert_eq!(active.generation(), 1);
        let mut out = Frame::default();
        assert_eq!(active.read(&mut out), ReadOutcome::Fresh);
        assert_eq!(out.payload, vec![3; 16]);
    }

    #[test]
    fn test_generation_counts_switches() {
        let dir = tempfile::tempdir().unwrap();
        let active = ActiveFrameBuffer::create(&dir.path().join("active"), 64).unwrap();

        active.switch_to(CameraId::Day, &ir_frame(1)).unwrap();
        active.switch_to(CameraId::Night, &ir_frame(2)).unwrap();
        let gen = active.switch_to(CameraId::Day, &ir_frame(3)).unwrap();

        assert_eq!(gen, 3);
        assert_eq!(active.selected_camera(), Some(CameraId::Day));
    }
}
