//! Fixed `#[repr(C)]` shared-memory layouts
//!
//! Every record is written and read through raw pointers into the mapped
//! segment, so field order and size are part of the cross-process contract.

use std::sync::atomic::{AtomicU32, AtomicU64};

/// Header size for every segment kind (one cache line on most systems).
pub(crate) const HEADER_SIZE: usize = 64;

/// Fixed portion of a frame slot preceding the pixel payload.
pub(crate) const SLOT_RECORD_SIZE: usize = 56;

pub(crate) const RING_MAGIC: u32 = 0x4443_4652; // "DCFR"
pub(crate) const ACTIVE_MAGIC: u32 = 0x4443_4146; // "DCAF"

/// Ring segment header: capacity, slot geometry, and the monotonically
/// increasing write index. `write_index == 0` doubles as the never-written
/// sentinel.
#[repr(C)]
pub(crate) struct RingHeader {
    pub magic: u32,
    pub capacity: u32,
    pub slot_size: u32,
    pub pixel_format: u8,
    pub _pad: [u8; 3],
    pub write_index: AtomicU32,
    pub _reserved: [u8; 44],
}

const _: () = assert!(
    std::mem::size_of::<RingHeader>() == HEADER_SIZE,
    "RingHeader must fill exactly one header block"
);

/// Active-frame segment header: selected camera plus the switch-generation
/// counter. The generation advances only after the slot copy completes
/// (publish-before-announce); generation 0 means no camera was ever
/// selected.
#[repr(C)]
pub(crate) struct ActiveHeader {
    pub magic: u32,
    pub slot_size: u32,
    pub selected_camera: AtomicU32,
    pub generation: AtomicU32,
    pub _reserved: [u8; 48],
}

const _: () = assert!(
    std::mem::size_of::<ActiveHeader>() == HEADER_SIZE,
    "ActiveHeader must fill exactly one header block"
);

/// Fixed frame-slot record. The pixel payload follows immediately after,
/// up to the segment's configured payload capacity.
///
/// `stamp` is the per-slot seqlock: odd while the writer is mid-copy,
/// bumped to even once the slot is consistent. Readers load it before and
/// after copying and retry on mismatch.
#[repr(C)]
pub(crate) struct SlotRecord {
    pub stamp: AtomicU64,
    pub sequence: u64,
    pub timestamp_sec: u64,
    pub timestamp_nsec: u32,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub brightness_avg: f32,
    pub brightness_lux: u32,
    pub payload_len: u32,
    pub camera_id: u8,
    pub pixel_format: u8,
    pub brightness_zone: u8,
    pub correction_applied: u8,
}

const _: () = assert!(
    std::mem::size_of::<SlotRecord>() == SLOT_RECORD_SIZE,
    "SlotRecord layout drifted from the shared contract"
);

/// Slot stride for a given payload capacity, kept 8-byte aligned so the
/// next slot's atomics stay aligned.
pub(crate) fn slot_size(payload_capacity: u32) -> u32 {
    let raw = SLOT_RECORD_SIZE as u32 + payload_capacity;
    (raw + 7) & !7
}

/// Payload capacity implied by a stored slot size.
pub(crate) fn payload_capacity(slot_size: u32) -> u32 {
    slot_size.saturating_sub(SLOT_RECORD_SIZE as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_size_is_aligned() {
        for cap in [0u32, 1, 7, 8, 640 * 480, 1280 * 720 * 3] {
            assert_eq!(slot_size(cap) % 8, 0);
            assert!(payload_capacity(slot_size(cap)) >= cap);
        }
    }
}
