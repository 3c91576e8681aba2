//! Named shared memory segments for cross-process pixel transfer.
//!
//! A segment is a file under `/dev/shm` (or the temp dir where that does not
//! exist) mapped into both processes with `memmap2`. The orchestrator owns
//! the segment and unlinks it when the [`SharedBuffer`] is dropped; workers
//! [`attach`](SharedBuffer::attach) by name and never unlink.
//!
//! Pixel data is RGBA `f32`, so a `W x H` frame needs `W * H * 16` bytes.

use crate::error::{BakeError, Result};
use memmap2::MmapMut;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// Bytes per RGBA float pixel.
pub const BYTES_PER_PIXEL: usize = 4 * std::mem::size_of::<f32>();

/// Prefix of every segment name.
pub const NAME_PREFIX: &str = "texbake_";

/// Segment size for a frame.
pub fn buffer_size(width: u32, height: u32) -> usize {
    width as usize * height as usize * BYTES_PER_PIXEL
}

/// Directory segments live in.
pub fn segment_dir() -> PathBuf {
    let shm = Path::new("/dev/shm");
    if shm.is_dir() {
        shm.to_path_buf()
    } else {
        std::env::temp_dir()
    }
}

/// Allocates uniquely named segments in one directory.
#[derive(Debug, Clone)]
pub struct SharedBufferPool {
    dir: PathBuf,
}

impl Default for SharedBufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedBufferPool {
    pub fn new() -> Self {
        Self { dir: segment_dir() }
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create a zero-filled segment of `len` bytes.
    pub fn allocate(&self, len: usize) -> Result<SharedBuffer> {
        if len == 0 {
            return Err(BakeError::SharedBuffer(
                "cannot allocate an empty segment".to_string(),
            ));
        }
        let name = format!("{}{}", NAME_PREFIX, uuid::Uuid::new_v4().simple());
        let path = self.dir.join(&name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| BakeError::SharedBuffer(format!("create {:?}: {}", path, e)))?;
        file.set_len(len as u64)?;

        // SAFETY: the file was just created with a unique name and is only
        // resized by this process.
        let mmap = unsafe { MmapMut::map_mut(&file) }
            .map_err(|e| BakeError::SharedBuffer(format!("map {:?}: {}", path, e)))?;

        tracing::debug!("Allocated shared buffer {} ({} bytes)", name, len);
        Ok(SharedBuffer {
            name,
            path,
            mmap,
            owner: true,
        })
    }

    /// Release a segment, reporting unlink failures.
    pub fn release(&self, buffer: SharedBuffer) -> Result<()> {
        buffer.release()
    }

    /// Attach to a segment of this pool by name.
    pub fn attach(&self, name: &str) -> Result<SharedBuffer> {
        SharedBuffer::attach_in(&self.dir, name)
    }
}

/// A mapped segment. Unlinked on drop when owned.
#[derive(Debug)]
pub struct SharedBuffer {
    name: String,
    path: PathBuf,
    mmap: MmapMut,
    owner: bool,
}

impl SharedBuffer {
    /// Worker side: map an existing segment from the default directory.
    pub fn attach(name: &str) -> Result<Self> {
        Self::attach_in(&segment_dir(), name)
    }

    pub fn attach_in(dir: &Path, name: &str) -> Result<Self> {
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(BakeError::SharedBuffer(format!("invalid segment name {:?}", name)));
        }
        let path = dir.join(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| BakeError::SharedBuffer(format!("attach {}: {}", name, e)))?;

        // SAFETY: the owning process keeps the segment at a fixed size
        // until it is unlinked.
        let mmap = unsafe { MmapMut::map_mut(&file) }
            .map_err(|e| BakeError::SharedBuffer(format!("map {}: {}", name, e)))?;

        Ok(SharedBuffer {
            name: name.to_string(),
            path,
            mmap,
            owner: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Number of `f32` values the segment holds.
    pub fn float_len(&self) -> usize {
        self.len() / std::mem::size_of::<f32>()
    }

    /// Overwrite the segment from the start with `pixels`.
    pub fn write_pixels(&mut self, pixels: &[f32]) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(pixels);
        if bytes.len() > self.mmap.len() {
            return Err(BakeError::SharedBuffer(format!(
                "{} bytes do not fit segment {} ({} bytes)",
                bytes.len(),
                self.name,
                self.mmap.len()
            )));
        }
        self.mmap[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Copy the whole segment out as floats.
    pub fn read_pixels(&self) -> Vec<f32> {
        let mut pixels = vec![0.0f32; self.float_len()];
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut pixels);
        let n = bytes.len();
        bytes.copy_from_slice(&self.mmap[..n]);
        pixels
    }

    pub fn zero(&mut self) {
        self.mmap.fill(0);
    }

    pub fn flush(&self) -> Result<()> {
        self.mmap
            .flush()
            .map_err(|e| BakeError::SharedBuffer(format!("flush {}: {}", self.name, e)))
    }

    /// Unmap and, when owned, unlink the segment.
    pub fn release(mut self) -> Result<()> {
        let owned = std::mem::replace(&mut self.owner, false);
        if owned {
            std::fs::remove_file(&self.path)
                .map_err(|e| BakeError::SharedBuffer(format!("unlink {}: {}", self.name, e)))?;
            tracing::debug!("Released shared buffer {}", self.name);
        }
        Ok(())
    }
}

impl Drop for SharedBuffer {
    fn drop(&mut self) {
        if self.owner {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!("Failed to unlink shared buffer {}: {}", self.name, e);
            } else {
                tracing::debug!("Released shared buffer {}", self.name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> (tempfile::TempDir, SharedBufferPool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = SharedBufferPool::in_dir(dir.path());
        (dir, pool)
    }

    #[test]
    fn test_size_matches_resolution() {
        let (_dir, pool) = pool();
        let buffer = pool.allocate(buffer_size(64, 32)).unwrap();
        assert_eq!(buffer.len(), 64 * 32 * 16);
        assert!(buffer.name().starts_with(NAME_PREFIX));
        assert!(buffer.read_pixels().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_pixels_round_trip_through_attach() {
        let (_dir, pool) = pool();
        let mut owner = pool.allocate(buffer_size(4, 4)).unwrap();
        let pixels: Vec<f32> = (0..owner.float_len()).map(|i| i as f32 * 0.25).collect();

        let mut worker = pool.attach(owner.name()).unwrap();
        worker.write_pixels(&pixels).unwrap();
        worker.flush().unwrap();
        drop(worker);

        assert_eq!(owner.read_pixels(), pixels);
        owner.zero();
        assert!(owner.read_pixels().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_oversized_write_rejected() {
        let (_dir, pool) = pool();
        let mut buffer = pool.allocate(16).unwrap();
        assert!(buffer.write_pixels(&[0.0; 5]).is_err());
    }

    #[test]
    fn test_drop_unlinks_owned_only() {
        let (_dir, pool) = pool();
        let buffer = pool.allocate(64).unwrap();
        let path = buffer.path().to_path_buf();

        drop(pool.attach(buffer.name()).unwrap());
        assert!(path.exists());

        drop(buffer);
        assert!(!path.exists());
    }

    #[test]
    fn test_explicit_release() {
        let (_dir, pool) = pool();
        let buffer = pool.allocate(64).unwrap();
        let path = buffer.path().to_path_buf();
        pool.release(buffer).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_attach_rejects_paths() {
        assert!(SharedBuffer::attach("../etc/passwd").is_err());
        assert!(SharedBuffer::attach("").is_err());
    }
}
