// CLASSIFICATION: COMMUNITY
// Filename: service.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! Stateless chunk service shared by every file-transfer session.
//!
//! Each request names its path and absolute offset, so the handle cache is
//! only a performance layer: a miss reopens the file and produces the same
//! bytes a hit would.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, error, info, warn};
use remotefs_wire::{ChunkResponse, CHUNK_SIZE};

use crate::transfer::cache::{Clock, FileHandleCache, SystemClock};
use crate::transfer::path::{self, PathRejection};

/// Open file shared between the cache and the sessions reading it.
pub type SharedFile = Arc<Mutex<File>>;

/// Read the chunk at the reader's current position.
///
/// Returns the bytes read (at most [`CHUNK_SIZE`]) and whether more bytes
/// follow, peeking one byte past the chunk. The lookahead byte is not
/// consumed.
pub fn read_chunk<R: Read + Seek>(reader: &mut R) -> io::Result<(Vec<u8>, bool)> {
    let mut buf = Vec::with_capacity(CHUNK_SIZE + 1);
    reader.by_ref().take(CHUNK_SIZE as u64 + 1).read_to_end(&mut buf)?;
    let more = buf.len() > CHUNK_SIZE;
    if more {
        buf.truncate(CHUNK_SIZE);
        reader.seek(SeekFrom::Current(-1))?;
    }
    Ok((buf, more))
}

/// Served-files root plus the handle cache.
pub struct FileService<C: Clock = SystemClock> {
    root: PathBuf,
    cache: FileHandleCache<SharedFile, C>,
}

impl FileService<SystemClock> {
    /// Serve `root` with a cache of `capacity` handles living `ttl` each.
    pub fn new(root: impl Into<PathBuf>, capacity: usize, ttl: Duration) -> Self {
        Self::with_cache(root, FileHandleCache::new(capacity, ttl))
    }
}

impl<C: Clock> FileService<C> {
    /// Serve `root` through an existing cache.
    pub fn with_cache(root: impl Into<PathBuf>, cache: FileHandleCache<SharedFile, C>) -> Self {
        Self {
            root: root.into(),
            cache,
        }
    }

    /// Served-files root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The handle cache.
    pub fn cache(&self) -> &FileHandleCache<SharedFile, C> {
        &self.cache
    }

    /// Normalise `raw` and resolve it to an existing regular file.
    ///
    /// Returns the cache key and the on-disk path.
    pub fn lookup(&self, raw: &str) -> Result<(String, PathBuf), LookupError> {
        let key = path::normalize(raw).map_err(LookupError::Rejected)?;
        let full = path::resolve(&self.root, &key);
        if !full.is_file() {
            return Err(LookupError::NotFound(full));
        }
        Ok((key, full))
    }

    /// Serve the chunk at `offset` of `raw`.
    ///
    /// Missing files, rejected paths, offsets at or past the end and I/O
    /// failures all answer `FF 00`.
    pub fn get_chunk(&self, offset: u32, raw: &str) -> ChunkResponse {
        let (key, full) = match self.lookup(raw) {
            Ok(found) => found,
            Err(e) => {
                warn!("chunk request for {raw:?}: {e}");
                return ChunkResponse::error();
            }
        };
        let handle = match self.handle_for(&key, &full) {
            Ok(handle) => handle,
            Err(e) => {
                error!("error opening {}: {e}", full.display());
                return ChunkResponse::error();
            }
        };
        let result = {
            let mut file = match handle.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            file.seek(SeekFrom::Start(u64::from(offset)))
                .and_then(|_| read_chunk(&mut *file))
        };
        match result {
            Ok((data, _)) if data.is_empty() => {
                debug!("chunk request past end of {key} (offset {offset})");
                ChunkResponse::error()
            }
            Ok((data, more)) => {
                debug!(
                    "sent chunk of {key}: offset={offset}, {} bytes, status={}",
                    data.len(),
                    if more { "OK" } else { "EOF" }
                );
                ChunkResponse::chunk(data, !more)
            }
            Err(e) => {
                error!("error reading chunk of {key}: {e}");
                self.cache.remove(&key);
                ChunkResponse::error()
            }
        }
    }

    fn handle_for(&self, key: &str, full: &Path) -> io::Result<SharedFile> {
        if let Some(handle) = self.cache.get(key) {
            return Ok(handle);
        }
        let handle = Arc::new(Mutex::new(File::open(full)?));
        self.cache.put(key, Arc::clone(&handle));
        Ok(handle)
    }

    /// Open `raw` for the legacy sequential stream.
    pub fn open_legacy(&self, raw: &str) -> Result<(String, File), LookupError> {
        let (key, full) = self.lookup(raw)?;
        let file = File::open(&full).map_err(|e| LookupError::Io(full, e))?;
        info!("opened {key} for sequential transfer");
        Ok((key, file))
    }

    /// Forget any cached handle for `raw`.
    pub fn close(&self, raw: &str) {
        if let Ok(key) = path::normalize(raw) {
            if self.cache.remove(&key) {
                debug!("closed cached handle for {key}");
            }
        }
    }

    /// Drop every cached handle.
    pub fn shutdown(&self) {
        self.cache.clear();
    }
}

/// Why a path could not be resolved.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// The path used an unsupported scheme.
    #[error("unsupported path scheme")]
    Rejected(PathRejection),
    /// No regular file exists at the resolved location.
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// The file exists but could not be opened.
    #[error("cannot open {}: {1}", .0.display())]
    Io(PathBuf, #[source] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use remotefs_wire::Status;
    use std::fs;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn read_chunk_peeks_without_consuming() {
        let mut cur = Cursor::new(pattern(300));
        let (first, more) = read_chunk(&mut cur).unwrap();
        assert_eq!(first.len(), 256);
        assert!(more);
        assert_eq!(cur.position(), 256);
        let (second, more) = read_chunk(&mut cur).unwrap();
        assert_eq!(second.len(), 44);
        assert!(!more);
    }

    #[test]
    fn exact_multiple_flags_last_full_chunk_eof() {
        let mut cur = Cursor::new(pattern(512));
        assert!(read_chunk(&mut cur).unwrap().1);
        let (data, more) = read_chunk(&mut cur).unwrap();
        assert_eq!(data.len(), 256);
        assert!(!more);
    }

    #[test]
    fn three_hundred_byte_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("f.bin"), pattern(300)).unwrap();
        let svc = FileService::new(dir.path(), 4, Duration::from_secs(60));

        let first = svc.get_chunk(0, "f.bin");
        assert_eq!(first.status(), Status::Ok);
        assert_eq!(first.encode()[1], 0);
        assert_eq!(first.data(), &pattern(300)[..256]);

        let second = svc.get_chunk(256, "/f.bin");
        assert_eq!(second.status(), Status::Eof);
        assert_eq!(second.encode()[1], 44);
        assert_eq!(second.data(), &pattern(300)[256..]);
    }

    #[test]
    fn missing_or_past_end_is_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("f.bin"), pattern(10)).unwrap();
        let svc = FileService::new(dir.path(), 4, Duration::from_secs(60));
        for offset in [0, 256, u32::MAX] {
            assert_eq!(svc.get_chunk(offset, "nope.bin").encode(), vec![0xFF, 0x00]);
        }
        assert_eq!(svc.get_chunk(10, "f.bin").encode(), vec![0xFF, 0x00]);
        assert_eq!(svc.get_chunk(1000, "f.bin").encode(), vec![0xFF, 0x00]);
        assert_eq!(svc.get_chunk(0, "http://x/f.bin").encode(), vec![0xFF, 0x00]);
    }

    #[test]
    fn directories_are_not_files() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let svc = FileService::new(dir.path(), 4, Duration::from_secs(60));
        assert_eq!(svc.get_chunk(0, "sub").status(), Status::Error);
        assert_eq!(svc.get_chunk(0, "").status(), Status::Error);
    }

    #[test]
    fn traversal_is_confined() {
        let outer = tempdir().unwrap();
        let root = outer.path().join("files");
        fs::create_dir(&root).unwrap();
        fs::write(outer.path().join("secret"), b"top").unwrap();
        fs::write(root.join("secret"), b"served").unwrap();
        let svc = FileService::new(&root, 4, Duration::from_secs(60));
        let resp = svc.get_chunk(0, "../secret");
        assert_eq!(resp.data(), b"served");
    }

    #[test]
    fn cache_is_invisible_to_clients() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a"), pattern(700)).unwrap();
        fs::write(dir.path().join("b"), pattern(90)).unwrap();
        let cached = FileService::new(dir.path(), 8, Duration::from_secs(60));
        let cold = FileService::new(dir.path(), 1, Duration::ZERO);
        let script: [(u32, &str); 8] = [
            (0, "a"),
            (0, "b"),
            (256, "a"),
            (512, "a"),
            (90, "b"),
            (256, "a"),
            (768, "a"),
            (0, "missing"),
        ];
        for (offset, name) in script {
            assert_eq!(
                cached.get_chunk(offset, name),
                cold.get_chunk(offset, name),
                "diverged at {name}@{offset}"
            );
        }
    }

    #[test]
    fn close_evicts_normalised_key() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a"), pattern(5)).unwrap();
        let svc = FileService::new(dir.path(), 4, Duration::from_secs(60));
        svc.get_chunk(0, "file:///a");
        assert_eq!(svc.cache().len(), 1);
        svc.close("/a");
        assert!(svc.cache().is_empty());
    }

    #[test]
    fn equivalent_spellings_share_one_handle() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();
        fs::write(dir.path().join("a/b"), pattern(5)).unwrap();
        let svc = FileService::new(dir.path(), 4, Duration::from_secs(60));
        for raw in ["a/b", "a//b", "./a/b"] {
            assert_eq!(svc.get_chunk(0, raw).status(), Status::Eof);
        }
        assert_eq!(svc.cache().len(), 1);
        svc.close("a//b");
        assert!(svc.cache().is_empty());
    }
}
