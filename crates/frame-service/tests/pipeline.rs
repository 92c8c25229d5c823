//! End-to-end pipeline wiring: capture, selection, and the consumer facade.

use std::time::{Duration, Instant};

use tokio::sync::watch;

use detection_store::{BoundingBox, Detection, DetectionRecord, DetectionStore};
use frame_service::{PipelineContext, SelectorService, ServiceConfig};
use frame_shm::{CameraId, Frame, FrameMeta, FrameRing, PixelFormat, ReadOutcome, Timestamp};

fn test_config(dir: &tempfile::TempDir) -> ServiceConfig {
    let mut cfg = ServiceConfig::default();
    cfg.shm_dir = dir.path().to_path_buf();
    cfg.day.capacity = 8;
    cfg.day.payload_capacity = 256;
    cfg.day.pixel_format = PixelFormat::Gray8;
    cfg.night.capacity = 8;
    cfg.night.payload_capacity = 256;
    cfg.night.pixel_format = PixelFormat::Gray8;
    cfg
}

fn gray(camera: CameraId, fill: u8) -> Frame {
    Frame::new(
        FrameMeta {
            camera_id: camera,
            timestamp: Timestamp::now(),
            width: 16,
            height: 16,
            stride: 16,
            pixel_format: PixelFormat::Gray8,
            ..Default::default()
        },
        vec![fill; 256],
    )
}

#[test]
fn facade_serves_frames_and_detections() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(&dir);
    let ctx = PipelineContext::create(&cfg).unwrap();

    // Cold start: nothing selected, no frames, version-0 detections.
    assert_eq!(ctx.current_active_camera(), None);
    let mut out = Frame::default();
    assert_eq!(ctx.read_latest_frame(&mut out), ReadOutcome::NoData);
    let snap = ctx.read_detection().snapshot().unwrap();
    assert_eq!(snap.version, 0);

    // The capture collaborator attaches and publishes daylight frames.
    let capture = FrameRing::open(&cfg.day_ring_path()).unwrap();
    capture.publish(&gray(CameraId::Day, 120)).unwrap();

    // One selector tick adopts the day camera and republishes.
    let mut selector = ctx.build_selector(&cfg).unwrap();
    selector.tick(Instant::now());

    assert_eq!(ctx.current_active_camera(), Some(CameraId::Day));
    assert_eq!(ctx.read_latest_frame(&mut out), ReadOutcome::Fresh);
    assert_eq!(out.meta.camera_id, CameraId::Day);
    assert_eq!(out.payload, vec![120; 256]);

    // The inference collaborator attaches and publishes a result.
    let inference = DetectionStore::open(&cfg.detections_path()).unwrap();
    inference.write(&DetectionRecord {
        frame_number: out.meta.sequence,
        timestamp: Timestamp::now(),
        detections: vec![Detection {
            label: "cat".into(),
            bbox: BoundingBox {
                x: 153.0,
                y: 225.0,
                w: 73.0,
                h: 135.0,
            },
            confidence: 0.93,
        }],
    });

    let snap = ctx.read_detection().snapshot().unwrap();
    assert_eq!(snap.version, 1);
    assert_eq!(snap.record.detections[0].label, "cat");
}

#[test]
fn teardown_removes_segment_files() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(&dir);
    let ctx = PipelineContext::create(&cfg).unwrap();

    assert!(cfg.day_ring_path().exists());
    ctx.destroy().unwrap();
    assert!(!cfg.day_ring_path().exists());
    assert!(!cfg.detections_path().exists());
}

#[tokio::test(start_paused = true)]
async fn selector_service_adopts_and_shuts_down_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(&dir);
    let ctx = PipelineContext::create(&cfg).unwrap();

    // Seed the day ring before the task starts.
    let capture = FrameRing::open(&cfg.day_ring_path()).unwrap();
    capture.publish(&gray(CameraId::Day, 150)).unwrap();

    let selector = ctx.build_selector(&cfg).unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(SelectorService::new(selector, shutdown_rx).run());

    // Paused virtual time: the probe interval elapses without real sleep.
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(ctx.current_active_camera(), Some(CameraId::Day));
    assert!(ctx.active.generation() >= 1);

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();

    // The last-published frame survives task shutdown.
    let mut out = Frame::default();
    assert_eq!(ctx.read_latest_frame(&mut out), ReadOutcome::Fresh);
    assert_eq!(out.payload, vec![150; 256]);
}
