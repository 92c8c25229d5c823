//! Format-aware mean-luma sampling

use frame_shm::{Frame, PixelFormat};

/// Grid step for coarse sampling; every 8th pixel in both dimensions keeps
/// the estimate cheap enough for the 10 Hz sampling cadence.
const SAMPLE_STEP: u32 = 8;

/// Mean luma of a frame's pixels on the 0..255 scale.
///
/// Best effort by contract: out-of-bounds indices (undersized payloads,
/// inconsistent stride) are skipped, and a frame with no reachable samples
/// reads as 0.0.
pub fn mean_luma(frame: &Frame) -> f32 {
    let meta = &frame.meta;
    if meta.width == 0 || meta.height == 0 {
        return 0.0;
    }

    let mut sum = 0.0f64;
    let mut count = 0u32;

    for y in (0..meta.height).step_by(SAMPLE_STEP as usize) {
        for x in (0..meta.width).step_by(SAMPLE_STEP as usize) {
            if let Some(value) = sample_luma(frame, x, y) {
                sum += value as f64;
                count += 1;
            }
        }
    }

    if count == 0 {
        0.0
    } else {
        (sum / count as f64) as f32
    }
}

fn sample_luma(frame: &Frame, x: u32, y: u32) -> Option<f32> {
    let stride = frame.meta.stride as usize;
    let payload = &frame.payload;

    match frame.meta.pixel_format {
        // Gray8 and NV12 both lead with a full luma plane.
        PixelFormat::Gray8 | PixelFormat::Nv12 => {
            let idx = y as usize * stride + x as usize;
            payload.get(idx).map(|&b| b as f32)
        }
        // Packed Y0 U Y1 V: luma lives at even byte offsets.
        PixelFormat::Yuyv => {
            let idx = y as usize * stride + 2 * x as usize;
            payload.get(idx).map(|&b| b as f32)
        }
        // Rec.601 luma from packed RGB.
        PixelFormat::Rgb24 => {
            let idx = y as usize * stride + 3 * x as usize;
            let r = *payload.get(idx)? as f32;
            let g = *payload.get(idx + 1)? as f32;
            let b = *payload.get(idx + 2)? as f32;
            Some(0.299 * r + 0.587 * g + 0.114 * b)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frame_shm::FrameMeta;

    fn meta(width: u32, height: u32, stride: u32, fmt: PixelFormat) -> FrameMeta {
        FrameMeta {
            width,
            height,
            stride,
            pixel_format: fmt,
            ..Default::default()
        }
    }

    #[test]
    fn test_gray8_mean() {
        let frame = Frame::new(meta(16, 16, 16, PixelFormat::Gray8), vec![120; 256]);
        assert!((mean_luma(&frame) - 120.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_nv12_samples_luma_plane_only() {
        // Luma plane all 200, chroma plane all 0; chroma must not bleed in.
        let mut payload = vec![200u8; 16 * 16];
        payload.extend(vec![0u8; 16 * 8]);
        let frame = Frame::new(meta(16, 16, 16, PixelFormat::Nv12), payload);
        assert!((mean_luma(&frame) - 200.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_yuyv_skips_chroma_bytes() {
        // Y = 100 at even offsets, chroma 255 at odd offsets.
        let mut payload = vec![0u8; 16 * 32];
        for (i, b) in payload.iter_mut().enumerate() {
            *b = if i % 2 == 0 { 100 } else { 255 };
        }
        let frame = Frame::new(meta(16, 16, 32, PixelFormat::Yuyv), payload);
        assert!((mean_luma(&frame) - 100.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_rgb24_rec601() {
        // Pure green: luma = 0.587 * 255.
        let payload: Vec<u8> = (0..16 * 16).flat_map(|_| [0u8, 255, 0]).collect();
        let frame = Frame::new(meta(16, 16, 48, PixelFormat::Rgb24), payload);
        assert!((mean_luma(&frame) - 0.587 * 255.0).abs() < 0.5);
    }

    #[test]
    fn test_undersized_payload_is_skipped_not_panicking() {
        let frame = Frame::new(meta(64, 64, 64, PixelFormat::Gray8), vec![50; 8]);
        // Only in-bounds samples contribute.
        assert!((mean_luma(&frame) - 50.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_zero_dimensions() {
        let frame = Frame::new(meta(0, 0, 0, PixelFormat::Gray8), Vec::new());
        assert_eq!(mean_luma(&frame), 0.0);
    }
}
