//! Cross-thread version/payload atomicity of the detection store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use detection_store::{BoundingBox, Detection, DetectionRecord, DetectionStore};
use frame_shm::Timestamp;

/// Payload derived entirely from the write number, so a reader can verify
/// that an observed version implies exactly that write's payload.
fn record_for(write_number: u64) -> DetectionRecord {
    DetectionRecord {
        frame_number: write_number * 3,
        timestamp: Timestamp {
            sec: write_number,
            nsec: 0,
        },
        detections: vec![Detection {
            label: format!("v{write_number}"),
            bbox: BoundingBox {
                x: write_number as f32,
                y: write_number as f32 + 1.0,
                w: 10.0,
                h: 20.0,
            },
            confidence: 0.5,
        }],
    }
}

#[test]
fn version_always_matches_payload() {
    let dir = tempfile::tempdir().unwrap();
    let writer = DetectionStore::create(&dir.path().join("det")).unwrap();
    let path = writer.path().to_path_buf();

    let done = Arc::new(AtomicBool::new(false));
    let done_w = done.clone();

    let writer_thread = thread::spawn(move || {
        for n in 1..=20_000u64 {
            let version = writer.write(&record_for(n));
            assert_eq!(version as u64, n);
        }
        done_w.store(true, Ordering::Release);
    });

    let readers: Vec<_> = (0..2)
        .map(|offset| {
            let reader = DetectionStore::open(&path).unwrap();
            let done = done.clone();
            thread::spawn(move || {
                // Stagger the two consumers' polling phases.
                thread::sleep(std::time::Duration::from_micros(50 * offset));
                let mut last_version = 0u32;
                let mut fresh = 0u64;
                while !done.load(Ordering::Acquire) {
                    if let Some(snap) = reader.read().snapshot() {
                        assert!(
                            snap.version >= last_version,
                            "version regressed: {} after {last_version}",
                            snap.version
                        );
                        last_version = snap.version;
                        if snap.version > 0 {
                            fresh += 1;
                            assert_eq!(snap.record, record_for(snap.version as u64));
                        }
                    }
                }
                (fresh, last_version)
            })
        })
        .collect();

    writer_thread.join().unwrap();
    for handle in readers {
        let (fresh, last_version) = handle.join().unwrap();
        assert!(fresh > 0, "reader observed no consistent snapshots");
        assert!(last_version > 0);
    }
}

#[test]
fn two_consumers_converge_on_the_same_final_payload() {
    let dir = tempfile::tempdir().unwrap();
    let writer = DetectionStore::create(&dir.path().join("det")).unwrap();

    let record = DetectionRecord {
        frame_number: 99,
        timestamp: Timestamp { sec: 5, nsec: 0 },
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
    };
    writer.write(&record);

    let a = DetectionStore::open(writer.path()).unwrap();
    let b = DetectionStore::open(writer.path()).unwrap();

    let snap_a = a.read().snapshot().unwrap();
    let snap_b = b.read().snapshot().unwrap();
    assert_eq!(snap_a.version, 1);
    assert_eq!(snap_a, snap_b);
    assert_eq!(snap_a.record, record);
}
