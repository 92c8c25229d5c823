//! Memory-mapped segment handles
//!
//! A `Segment` is an explicit handle to one shared-memory file (typically
//! under /dev/shm). Segments are created once at process initialization and
//! passed into the components that use them; dropping unmaps, `destroy`
//! additionally unlinks the backing file.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};
use tracing::debug;

use crate::ShmError;

/// A mapped shared-memory segment.
#[derive(Debug)]
pub struct Segment {
    // Kept alive for the lifetime of `ptr`; never read through directly.
    _mmap: MmapMut,
    ptr: *mut u8,
    len: usize,
    path: PathBuf,
}

// SAFETY: the raw pointer targets the segment's own mapping, which lives as
// long as the handle. All concurrent access goes through atomics plus the
// seqlock protocol implemented by the callers.
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

impl Segment {
    /// Create (or re-create) a segment file of exactly `len` bytes and map
    /// it. The new mapping is zero-filled.
    pub fn create(path: &Path, len: usize) -> Result<Self, ShmError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ShmError::Create {
                path: path.to_path_buf(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|source| ShmError::Create {
                path: path.to_path_buf(),
                source,
            })?;

        file.set_len(len as u64).map_err(|source| ShmError::Create {
            path: path.to_path_buf(),
            source,
        })?;

        // SAFETY: the file was just created with the requested length.
        let mut mmap = unsafe {
            MmapOptions::new()
                .map_mut(&file)
                .map_err(|source| ShmError::Map {
                    path: path.to_path_buf(),
                    source,
                })?
        };

        let ptr = mmap.as_mut_ptr();
        debug!(path = %path.display(), len, "created shared-memory segment");

        Ok(Self {
            _mmap: mmap,
            ptr,
            len,
            path: path.to_path_buf(),
        })
    }

    /// Map an existing segment file created by another process.
    pub fn open(path: &Path) -> Result<Self, ShmError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| ShmError::OpenSegment {
                path: path.to_path_buf(),
                source,
            })?;

        let len = file
            .metadata()
            .map_err(|source| ShmError::OpenSegment {
                path: path.to_path_buf(),
                source,
            })?
            .len() as usize;

        // SAFETY: mapping an existing file; length taken from its metadata.
        let mut mmap = unsafe {
            MmapOptions::new()
                .map_mut(&file)
                .map_err(|source| ShmError::Map {
                    path: path.to_path_buf(),
                    source,
                })?
        };

        let ptr = mmap.as_mut_ptr();

        Ok(Self {
            _mmap: mmap,
            ptr,
            len,
            path: path.to_path_buf(),
        })
    }

    /// Base pointer of the mapping, for fixed-layout records built on top
    /// of a segment. Callers own the layout and synchronization discipline
    /// for whatever they store behind it.
    pub fn base(&self) -> *mut u8 {
        self.ptr
    }

    /// Mapped length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True for a zero-length mapping (never the case for valid segments).
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unmap and unlink the backing file.
    pub fn destroy(self) -> Result<(), ShmError> {
        let path = self.path.clone();
        drop(self);
        debug!(path = %path.display(), "destroying shared-memory segment");
        std::fs::remove_file(&path).map_err(|source| ShmError::Create { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_open_destroy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg");

        let seg = Segment::create(&path, 4096).unwrap();
        assert_eq!(seg.len(), 4096);
        drop(seg);

        let seg = Segment::open(&path).unwrap();
        assert_eq!(seg.len(), 4096);
        seg.destroy().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_open_missing_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Segment::open(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, ShmError::OpenSegment { .. }));
    }

    #[test]
    fn test_create_zero_fills() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg");
        let seg = Segment::create(&path, 64).unwrap();
        let bytes = unsafe { std::slice::from_raw_parts(seg.base(), seg.len()) };
        assert!(bytes.iter().all(|&b| b == 0));
    }
}
