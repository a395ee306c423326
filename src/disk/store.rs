// CLASSIFICATION: COMMUNITY
// Filename: store.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! Memory-mapped sector store for one virtual floppy.
//!
//! Writes land in the shared mapping and mark the image dirty. The mapping is
//! pushed to stable storage with a non-blocking flush once the flush interval
//! has elapsed, and synchronously when the store is closed.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, error, warn};
use memmap2::MmapMut;
use remotefs_wire::{sector_offset, DISK_SIZE, SECTOR_SIZE};

use crate::error::{Error, Result};

/// Default minimum gap between flushes of a dirty image.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(2);

struct Region {
    map: Option<MmapMut>,
    dirty: bool,
    last_flush: Instant,
}

/// One disk image of exactly [`DISK_SIZE`] bytes.
pub struct SectorStore {
    path: PathBuf,
    flush_interval: Duration,
    region: Mutex<Region>,
}

impl SectorStore {
    /// Open (creating if needed) and map the image at `path`.
    ///
    /// An image of the wrong length is zero-extended or truncated to
    /// [`DISK_SIZE`] first.
    #[allow(unsafe_code)]
    pub fn open(path: impl AsRef<Path>, flush_interval: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| Error::storage(&path, e))?;
        let len = file.metadata().map_err(|e| Error::storage(&path, e))?.len();
        if len != DISK_SIZE as u64 {
            warn!(
                "resizing {} from {} to {} bytes",
                path.display(),
                len,
                DISK_SIZE
            );
            file.set_len(DISK_SIZE as u64)
                .map_err(|e| Error::storage(&path, e))?;
        }
        // SAFETY: the image files live in a directory owned by this server and
        // every mutation goes through `region`'s lock. Another process
        // truncating the file underneath the mapping is outside our contract.
        let map = unsafe { MmapMut::map_mut(&file) }.map_err(|e| Error::storage(&path, e))?;
        debug!("mapped disk image {}", path.display());
        Ok(Self {
            path,
            flush_interval,
            region: Mutex::new(Region {
                map: Some(map),
                dirty: false,
                last_flush: Instant::now(),
            }),
        })
    }

    /// Backing file of this store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Region> {
        match self.region.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Read one sector. Out-of-range addresses read as zeros.
    ///
    /// Returns `None` once the store has been closed.
    pub fn read(&self, track: usize, sector: usize) -> Option<[u8; SECTOR_SIZE]> {
        let mut out = [0u8; SECTOR_SIZE];
        let Some(offset) = sector_offset(track, sector) else {
            warn!("invalid sector address: track={track}, sector={sector}");
            return Some(out);
        };
        let region = self.lock();
        let Some(map) = region.map.as_ref() else {
            error!("read from closed disk image {}", self.path.display());
            return None;
        };
        out.copy_from_slice(&map[offset..offset + SECTOR_SIZE]);
        Some(out)
    }

    /// Overwrite one sector. Returns `false` without touching the image for
    /// out-of-range addresses, payloads that are not [`SECTOR_SIZE`] bytes,
    /// or a closed store.
    pub fn write(&self, track: usize, sector: usize, data: &[u8]) -> bool {
        let Some(offset) = sector_offset(track, sector) else {
            warn!("invalid sector address: track={track}, sector={sector}");
            return false;
        };
        if data.len() != SECTOR_SIZE {
            warn!("invalid sector data size: {}", data.len());
            return false;
        }
        let mut region = self.lock();
        let Some(map) = region.map.as_mut() else {
            error!("write to closed disk image {}", self.path.display());
            return false;
        };
        map[offset..offset + SECTOR_SIZE].copy_from_slice(data);
        region.dirty = true;
        self.flush_due_locked(&mut region);
        true
    }

    /// Start a non-blocking flush if the image is dirty and the interval has
    /// elapsed. Returns whether a flush was issued.
    pub fn flush_if_due(&self) -> bool {
        let mut region = self.lock();
        self.flush_due_locked(&mut region)
    }

    fn flush_due_locked(&self, region: &mut Region) -> bool {
        if !region.dirty || region.last_flush.elapsed() < self.flush_interval {
            return false;
        }
        let Some(map) = region.map.as_ref() else {
            return false;
        };
        if let Err(e) = map.flush_async() {
            error!("async flush of {} failed: {e}", self.path.display());
            return false;
        }
        region.dirty = false;
        region.last_flush = Instant::now();
        true
    }

    /// Flush the whole image synchronously.
    pub fn flush(&self) -> Result<()> {
        let mut region = self.lock();
        if let Some(map) = region.map.as_ref() {
            map.flush().map_err(|e| Error::storage(&self.path, e))?;
        }
        region.dirty = false;
        region.last_flush = Instant::now();
        Ok(())
    }

    /// Whether writes have happened since the last flush.
    pub fn is_dirty(&self) -> bool {
        self.lock().dirty
    }

    /// Flush synchronously and release the mapping. Later reads return
    /// zeros and later writes fail.
    pub fn close(&self) -> Result<()> {
        let mut region = self.lock();
        if let Some(map) = region.map.take() {
            map.flush().map_err(|e| Error::storage(&self.path, e))?;
            debug!("closed disk image {}", self.path.display());
        }
        region.dirty = false;
        Ok(())
    }
}

impl std::fmt::Debug for SectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectorStore")
            .field("path", &self.path)
            .field("dirty", &self.is_dirty())
            .finish()
    }
}
