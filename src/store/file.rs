//! File-backed block storage.
//!
//! A [`BlockStore`] owns every open file and one shared [`FrameCache`].
//! Opening a file yields a [`FileHandle`]; reading a block through the
//! handle pins a cache frame and returns a [`BlockGuard`] that releases
//! the pin on drop. All mutation goes through guards, so the store alone
//! decides when dirty frames reach disk.

use crate::error::{Error, Result};
use crate::store::cache::{Frame, FrameCache, FrameKey};
use crate::store::{BlockId, CacheStats, BLOCK_SIZE};
use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One open file: its OS handle, identity, and allocated length in blocks.
#[derive(Debug)]
struct OpenFile {
    file: File,
    path: PathBuf,
    blocks: u64,
    /// Number of outstanding opens sharing this entry.
    refs: u32,
}

/// Everything the store mutex protects.
#[derive(Debug)]
struct StoreState {
    files: HashMap<u64, OpenFile>,
    next_file_id: u64,
    cache: FrameCache,
}

#[derive(Debug)]
struct StoreShared {
    state: Mutex<StoreState>,
    sync_on_close: bool,
}

/// Block-level storage over ordinary files with a shared buffer cache.
///
/// # Thread Safety
///
/// The store is thread-safe; clone [`FileHandle`]s freely across threads.
/// A single mutex guards the file table and cache bookkeeping, while block
/// data is accessed through per-frame locks so guards never hold the store
/// mutex.
#[derive(Debug)]
pub struct BlockStore {
    shared: Arc<StoreShared>,
}

impl BlockStore {
    /// Create a store whose cache holds at most `cache_frames` blocks.
    ///
    /// When `sync_on_close` is set, closing a file fsyncs it after the
    /// dirty frames are written back.
    pub fn new(cache_frames: usize, sync_on_close: bool) -> Self {
        Self {
            shared: Arc::new(StoreShared {
                state: Mutex::new(StoreState {
                    files: HashMap::new(),
                    next_file_id: 0,
                    cache: FrameCache::new(cache_frames),
                }),
                sync_on_close,
            }),
        }
    }

    /// Create a new, empty block file.
    ///
    /// Fails with [`Error::AlreadyExists`] when the path is taken.
    pub fn create_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(_) => {
                debug!("created block file {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(Error::AlreadyExists(
                format!("file {} already exists", path.display()),
            )),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Open an existing block file.
    ///
    /// Opening a path that is already open returns a handle sharing the
    /// first open's cache frames, so every handle sees the same bytes.
    pub fn open_file<P: AsRef<Path>>(&self, path: P) -> Result<FileHandle> {
        let canonical = std::fs::canonicalize(path).map_err(|e| Error::Io(e))?;
        let mut state = self.shared.state.lock();

        if let Some((&id, entry)) = state.files.iter_mut().find(|(_, f)| f.path == canonical) {
            entry.refs += 1;
            debug!("reopened {} as file {}", canonical.display(), id);
            return Ok(FileHandle {
                shared: Arc::clone(&self.shared),
                id,
                path: canonical,
            });
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&canonical)
            .map_err(|e| Error::Io(e))?;
        let len = file.metadata().map_err(|e| Error::Io(e))?.len();
        if len % BLOCK_SIZE as u64 != 0 {
            return Err(Error::corruption(format!(
                "file {} length {} is not a multiple of the block size",
                canonical.display(),
                len
            )));
        }

        let id = state.next_file_id;
        state.next_file_id += 1;
        let blocks = len / BLOCK_SIZE as u64;
        state.files.insert(
            id,
            OpenFile {
                file,
                path: canonical.clone(),
                blocks,
                refs: 1,
            },
        );
        debug!(
            "opened {} as file {} ({} blocks)",
            canonical.display(),
            id,
            blocks
        );
        Ok(FileHandle {
            shared: Arc::clone(&self.shared),
            id,
            path: canonical,
        })
    }

    /// Close one open of a file.
    ///
    /// The last close writes every dirty frame back and drops the file's
    /// frames from the cache. Fails with [`Error::InvalidState`] when the
    /// handle was already closed or a [`BlockGuard`] for the file is still
    /// alive.
    pub fn close_file(&self, handle: FileHandle) -> Result<()> {
        let mut state = self.shared.state.lock();
        let entry = state.files.get_mut(&handle.id).ok_or_else(|| {
            Error::invalid_state(format!("file {} is not open", handle.path.display()))
        })?;
        if entry.refs > 1 {
            entry.refs -= 1;
            debug!("released {}, other opens remain", handle.path.display());
            return Ok(());
        }

        if state.cache.pinned_in_file(handle.id) > 0 {
            return Err(Error::invalid_state(format!(
                "file {} still has pinned blocks",
                handle.path.display()
            )));
        }

        let frames = state.cache.remove_file(handle.id);
        let mut entry = state.files.remove(&handle.id).ok_or_else(|| {
            Error::invalid_state(format!("file {} is not open", handle.path.display()))
        })?;

        let mut written = 0;
        for (key, frame) in frames {
            if frame.take_dirty() {
                write_block(&mut entry.file, key.block, &frame.data()[..])?;
                state.cache.record_write_back();
                written += 1;
            }
        }
        if self.shared.sync_on_close {
            entry.file.sync_all().map_err(|e| Error::Io(e))?;
        }
        debug!(
            "closed {}, wrote back {} dirty blocks",
            handle.path.display(),
            written
        );
        Ok(())
    }

    /// Number of files currently open.
    pub fn open_files(&self) -> usize {
        self.shared.state.lock().files.len()
    }

    /// Snapshot of the shared cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.shared.state.lock().cache.stats()
    }
}

/// One open of a block file.
///
/// Handles are cheap to clone; clones share the underlying open and do not
/// count as further opens. Dropping a handle does not close the file, the
/// store's [`close_file`](BlockStore::close_file) does.
#[derive(Debug, Clone)]
pub struct FileHandle {
    shared: Arc<StoreShared>,
    id: u64,
    path: PathBuf,
}

impl FileHandle {
    /// The canonical path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one zero-filled block to the file, returning its id.
    pub fn allocate_block(&self) -> Result<BlockId> {
        let mut state = self.shared.state.lock();
        let entry = state.files.get_mut(&self.id).ok_or_else(|| {
            Error::invalid_state(format!("file {} is not open", self.path.display()))
        })?;
        let id = BlockId::try_from(entry.blocks).map_err(|_| {
            Error::resource_exhausted(format!(
                "file {} is at the block limit",
                self.path.display()
            ))
        })?;
        let blocks = entry.blocks + 1;
        entry
            .file
            .set_len(blocks * BLOCK_SIZE as u64)
            .map_err(|e| Error::Io(e))?;
        entry.blocks = blocks;
        Ok(id)
    }

    /// Number of blocks allocated in the file.
    pub fn block_count(&self) -> Result<u64> {
        let state = self.shared.state.lock();
        let entry = state.files.get(&self.id).ok_or_else(|| {
            Error::invalid_state(format!("file {} is not open", self.path.display()))
        })?;
        Ok(entry.blocks)
    }

    /// Pin `block` in the cache and return a guard over its data.
    ///
    /// A cache miss may evict the least recently used unpinned frame,
    /// writing it back first when dirty. Fails with
    /// [`Error::ResourceExhausted`] when every frame is pinned.
    pub fn get_block(&self, block: BlockId) -> Result<BlockGuard> {
        let mut state = self.shared.state.lock();

        let blocks = match state.files.get(&self.id) {
            Some(entry) => entry.blocks,
            None => {
                return Err(Error::invalid_state(format!(
                    "file {} is not open",
                    self.path.display()
                )))
            }
        };
        if u64::from(block) >= blocks {
            return Err(Error::invalid_argument(format!(
                "block {} out of range, file {} has {} blocks",
                block,
                self.path.display(),
                blocks
            )));
        }

        let key = FrameKey::new(self.id, block);
        if let Some(frame) = state.cache.get(&key) {
            frame.pin();
            return Ok(BlockGuard { frame });
        }

        // Make room for the incoming frame, writing the victim back first
        // when its data never reached disk.
        if state.cache.is_full() {
            match state.cache.evict_victim() {
                Some((victim_key, victim)) => {
                    if victim.take_dirty() {
                        let entry = state.files.get_mut(&victim_key.file).ok_or_else(|| {
                            Error::invalid_state(format!(
                                "cached block {} belongs to a closed file",
                                victim_key.block
                            ))
                        })?;
                        write_block(&mut entry.file, victim_key.block, &victim.data()[..])?;
                        state.cache.record_write_back();
                    }
                }
                None => {
                    return Err(Error::resource_exhausted(
                        "every cache frame is pinned".to_string(),
                    ))
                }
            }
        }

        let frame = Arc::new(Frame::new());
        {
            let mut data = frame.data_mut();
            let entry = state.files.get_mut(&self.id).ok_or_else(|| {
                Error::invalid_state(format!("file {} is not open", self.path.display()))
            })?;
            let offset = u64::from(block) * BLOCK_SIZE as u64;
            entry
                .file
                .seek(SeekFrom::Start(offset))
                .map_err(|e| Error::Io(e))?;
            entry.file.read_exact(&mut data[..]).map_err(|e| Error::Io(e))?;
        }
        frame.pin();
        state.cache.insert(key, Arc::clone(&frame));
        Ok(BlockGuard { frame })
    }
}

/// A pinned view of one block.
///
/// The underlying frame cannot be evicted while the guard is alive, and
/// the file cannot be closed. Dropping the guard releases the pin; any
/// writes stay cached until eviction or close writes them back.
#[derive(Debug)]
pub struct BlockGuard {
    frame: Arc<Frame>,
}

impl BlockGuard {
    /// Run `f` over the block's bytes.
    pub fn with_data<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.frame.data()[..])
    }

    /// Run `f` over the block's bytes mutably, marking the frame dirty.
    pub fn with_data_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut data = self.frame.data_mut();
        self.frame.mark_dirty();
        f(&mut data[..])
    }
}

impl Drop for BlockGuard {
    fn drop(&mut self) {
        self.frame.unpin();
    }
}

fn write_block(file: &mut File, block: BlockId, data: &[u8]) -> Result<()> {
    file.seek(SeekFrom::Start(u64::from(block) * BLOCK_SIZE as u64))
        .map_err(|e| Error::Io(e))?;
    file.write_all(data).map_err(|e| Error::Io(e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> BlockStore {
        BlockStore::new(16, true)
    }

    #[test]
    fn test_create_and_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blocks.db");
        let store = store();

        store.create_file(&path).unwrap();
        let handle = store.open_file(&path).unwrap();
        assert_eq!(handle.block_count().unwrap(), 0);
        assert_eq!(store.open_files(), 1);

        store.close_file(handle).unwrap();
        assert_eq!(store.open_files(), 0);
    }

    #[test]
    fn test_create_existing_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blocks.db");
        let store = store();

        store.create_file(&path).unwrap();
        let err = store.create_file(&path).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[test]
    fn test_open_missing_fails() {
        let dir = TempDir::new().unwrap();
        let err = store().open_file(dir.path().join("absent.db")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_open_rejects_partial_block() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ragged.db");
        std::fs::write(&path, vec![0u8; BLOCK_SIZE + 100]).unwrap();

        let err = store().open_file(&path).unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
    }

    #[test]
    fn test_allocate_extends_with_zeros() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blocks.db");
        let store = store();
        store.create_file(&path).unwrap();
        let handle = store.open_file(&path).unwrap();

        assert_eq!(handle.allocate_block().unwrap(), 0);
        assert_eq!(handle.allocate_block().unwrap(), 1);
        assert_eq!(handle.block_count().unwrap(), 2);

        let guard = handle.get_block(1).unwrap();
        guard.with_data(|data| {
            assert_eq!(data.len(), BLOCK_SIZE);
            assert!(data.iter().all(|&b| b == 0));
        });
        drop(guard);
        store.close_file(handle).unwrap();
    }

    #[test]
    fn test_get_block_out_of_range() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blocks.db");
        let store = store();
        store.create_file(&path).unwrap();
        let handle = store.open_file(&path).unwrap();
        handle.allocate_block().unwrap();

        let err = handle.get_block(5).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        store.close_file(handle).unwrap();
    }

    #[test]
    fn test_writes_survive_close_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blocks.db");
        let store = store();
        store.create_file(&path).unwrap();

        let handle = store.open_file(&path).unwrap();
        handle.allocate_block().unwrap();
        handle.allocate_block().unwrap();
        {
            let guard = handle.get_block(1).unwrap();
            guard.with_data_mut(|data| data[..4].copy_from_slice(&[0xde, 0xad, 0xbe, 0xef]));
        }
        store.close_file(handle).unwrap();

        let handle = store.open_file(&path).unwrap();
        let guard = handle.get_block(1).unwrap();
        guard.with_data(|data| assert_eq!(&data[..4], &[0xde, 0xad, 0xbe, 0xef]));
        drop(guard);
        store.close_file(handle).unwrap();
    }

    #[test]
    fn test_eviction_writes_dirty_frames_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blocks.db");
        // Two frames only, so the third distinct block evicts one.
        let store = BlockStore::new(2, true);
        store.create_file(&path).unwrap();
        let handle = store.open_file(&path).unwrap();
        for _ in 0..3 {
            handle.allocate_block().unwrap();
        }

        {
            let guard = handle.get_block(0).unwrap();
            guard.with_data_mut(|data| data[0] = 42);
        }
        drop(handle.get_block(1).unwrap());
        drop(handle.get_block(2).unwrap());

        let stats = store.cache_stats();
        assert!(stats.evictions >= 1);
        assert!(stats.write_backs >= 1);

        // The evicted block reloads from disk with the write intact.
        let guard = handle.get_block(0).unwrap();
        guard.with_data(|data| assert_eq!(data[0], 42));
        drop(guard);
        store.close_file(handle).unwrap();
    }

    #[test]
    fn test_pinned_frames_are_not_evicted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blocks.db");
        let store = BlockStore::new(2, true);
        store.create_file(&path).unwrap();
        let handle = store.open_file(&path).unwrap();
        for _ in 0..3 {
            handle.allocate_block().unwrap();
        }

        let g0 = handle.get_block(0).unwrap();
        let g1 = handle.get_block(1).unwrap();

        let err = handle.get_block(2).unwrap_err();
        assert!(matches!(err, Error::ResourceExhausted(_)));

        drop(g0);
        let g2 = handle.get_block(2).unwrap();
        drop(g2);
        drop(g1);
        store.close_file(handle).unwrap();
    }

    #[test]
    fn test_close_with_pinned_block_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blocks.db");
        let store = store();
        store.create_file(&path).unwrap();
        let handle = store.open_file(&path).unwrap();
        handle.allocate_block().unwrap();

        let guard = handle.get_block(0).unwrap();
        let err = store.close_file(handle.clone()).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));

        drop(guard);
        store.close_file(handle).unwrap();
    }

    #[test]
    fn test_double_close_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blocks.db");
        let store = store();
        store.create_file(&path).unwrap();
        let handle = store.open_file(&path).unwrap();

        store.close_file(handle.clone()).unwrap();
        let err = store.close_file(handle.clone()).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));

        let err = handle.allocate_block().unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        let err = handle.block_count().unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_second_open_shares_frames() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blocks.db");
        let store = store();
        store.create_file(&path).unwrap();

        let first = store.open_file(&path).unwrap();
        first.allocate_block().unwrap();
        let second = store.open_file(&path).unwrap();
        assert_eq!(store.open_files(), 1);

        // A cached write through one handle is visible through the other
        // before anything reaches disk.
        {
            let guard = first.get_block(0).unwrap();
            guard.with_data_mut(|data| data[7] = 9);
        }
        let guard = second.get_block(0).unwrap();
        guard.with_data(|data| assert_eq!(data[7], 9));
        drop(guard);

        store.close_file(first).unwrap();
        assert_eq!(store.open_files(), 1);
        let guard = second.get_block(0).unwrap();
        guard.with_data(|data| assert_eq!(data[7], 9));
        drop(guard);
        store.close_file(second).unwrap();
        assert_eq!(store.open_files(), 0);
    }

    #[test]
    fn test_cache_hit_statistics() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blocks.db");
        let store = store();
        store.create_file(&path).unwrap();
        let handle = store.open_file(&path).unwrap();
        handle.allocate_block().unwrap();

        drop(handle.get_block(0).unwrap());
        drop(handle.get_block(0).unwrap());

        let stats = store.cache_stats();
        assert_eq!(stats.lookups, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.insertions, 1);
        store.close_file(handle).unwrap();
    }
}
