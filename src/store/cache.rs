//! Frame cache: in-memory block frames with pin counts and LRU eviction.
//!
//! The cache itself is not synchronized. [`BlockStore`](super::BlockStore)
//! keeps it behind its own mutex and is the only caller; frames carry their
//! own locks so block data stays accessible after that mutex is released.

use crate::store::{BlockId, BLOCK_SIZE};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// A unique identifier for a cached frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct FrameKey {
    /// Store-assigned id of the open file.
    pub(crate) file: u64,
    /// Block position within that file.
    pub(crate) block: BlockId,
}

impl FrameKey {
    /// Create a new frame key.
    pub(crate) fn new(file: u64, block: BlockId) -> Self {
        Self { file, block }
    }
}

/// One in-memory copy of a block.
///
/// The pin count tracks outstanding guards; a pinned frame must not be
/// evicted because those guards still read and write its data. The dirty
/// flag marks data that differs from the file and needs writing back.
#[derive(Debug)]
pub(crate) struct Frame {
    data: RwLock<Box<[u8; BLOCK_SIZE]>>,
    pin_count: AtomicU32,
    dirty: AtomicBool,
}

impl Frame {
    /// Create a zero-filled, unpinned, clean frame.
    pub(crate) fn new() -> Self {
        Self {
            data: RwLock::new(Box::new([0u8; BLOCK_SIZE])),
            pin_count: AtomicU32::new(0),
            dirty: AtomicBool::new(false),
        }
    }

    /// Take one pin on the frame.
    pub(crate) fn pin(&self) {
        self.pin_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Release one pin.
    pub(crate) fn unpin(&self) {
        let previous = self.pin_count.fetch_sub(1, Ordering::Release);
        debug_assert!(previous > 0);
    }

    /// Whether any guard still holds this frame.
    pub(crate) fn is_pinned(&self) -> bool {
        self.pin_count.load(Ordering::Acquire) > 0
    }

    /// Mark the frame data as differing from the file.
    pub(crate) fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Clear the dirty flag, returning whether it was set.
    pub(crate) fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Whether the frame needs writing back.
    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Shared access to the block data.
    pub(crate) fn data(&self) -> RwLockReadGuard<'_, Box<[u8; BLOCK_SIZE]>> {
        self.data.read()
    }

    /// Exclusive access to the block data.
    pub(crate) fn data_mut(&self) -> RwLockWriteGuard<'_, Box<[u8; BLOCK_SIZE]>> {
        self.data.write()
    }
}

/// Statistics for cache performance monitoring.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Total number of cache lookups
    pub lookups: u64,
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of frames loaded into the cache
    pub insertions: u64,
    /// Number of frames evicted to make room
    pub evictions: u64,
    /// Number of dirty frames written back to disk
    pub write_backs: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits as f64 / self.lookups as f64
        }
    }

    /// Reset all statistics to zero
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Fixed-capacity frame cache with LRU replacement.
///
/// Uses a HashMap for O(1) lookups and a VecDeque for LRU order, most
/// recently used at the back. Eviction walks the queue from the front and
/// skips pinned frames.
#[derive(Debug)]
pub(crate) struct FrameCache {
    /// Maximum number of resident frames
    capacity: usize,
    /// Resident frames by key
    frames: HashMap<FrameKey, Arc<Frame>>,
    /// LRU queue (most recently used at the back)
    lru_queue: VecDeque<FrameKey>,
    /// Cache statistics
    stats: CacheStats,
}

impl FrameCache {
    /// Create a cache holding at most `capacity` frames.
    pub(crate) fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        Self {
            capacity,
            frames: HashMap::with_capacity(capacity),
            lru_queue: VecDeque::with_capacity(capacity),
            stats: CacheStats::default(),
        }
    }

    /// Look up a frame, refreshing its LRU position on a hit.
    pub(crate) fn get(&mut self, key: &FrameKey) -> Option<Arc<Frame>> {
        self.stats.lookups += 1;
        if let Some(frame) = self.frames.get(key) {
            let frame = Arc::clone(frame);
            self.stats.hits += 1;
            self.touch(key);
            Some(frame)
        } else {
            self.stats.misses += 1;
            None
        }
    }

    /// Insert a freshly loaded frame. The key must not already be resident;
    /// callers check with [`get`](Self::get) first.
    pub(crate) fn insert(&mut self, key: FrameKey, frame: Arc<Frame>) {
        debug_assert!(!self.frames.contains_key(&key));
        self.frames.insert(key, frame);
        self.lru_queue.push_back(key);
        self.stats.insertions += 1;
    }

    /// Whether inserting another frame requires an eviction first.
    pub(crate) fn is_full(&self) -> bool {
        self.frames.len() >= self.capacity
    }

    /// Remove and return the least recently used unpinned frame.
    ///
    /// Returns `None` when every resident frame is pinned. The caller owns
    /// the write-back of the returned frame if it is dirty.
    pub(crate) fn evict_victim(&mut self) -> Option<(FrameKey, Arc<Frame>)> {
        let position = self
            .lru_queue
            .iter()
            .position(|key| !self.frames[key].is_pinned())?;
        let key = self.lru_queue.remove(position)?;
        let frame = self.frames.remove(&key)?;
        self.stats.evictions += 1;
        Some((key, frame))
    }

    /// Remove every frame belonging to `file`, returning them for write-back.
    pub(crate) fn remove_file(&mut self, file: u64) -> Vec<(FrameKey, Arc<Frame>)> {
        self.lru_queue.retain(|key| key.file != file);
        let keys: Vec<FrameKey> = self
            .frames
            .keys()
            .filter(|key| key.file == file)
            .copied()
            .collect();
        keys.into_iter()
            .filter_map(|key| self.frames.remove(&key).map(|frame| (key, frame)))
            .collect()
    }

    /// Number of pinned frames belonging to `file`.
    pub(crate) fn pinned_in_file(&self, file: u64) -> usize {
        self.frames
            .iter()
            .filter(|(key, frame)| key.file == file && frame.is_pinned())
            .count()
    }

    /// Count one dirty frame written back to disk.
    pub(crate) fn record_write_back(&mut self) {
        self.stats.write_backs += 1;
    }

    /// Current statistics snapshot.
    pub(crate) fn stats(&self) -> CacheStats {
        self.stats.clone()
    }

    /// Number of resident frames.
    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }

    /// Move a key to the most recently used position.
    ///
    /// O(n) in the number of resident frames, which is fine at the frame
    /// counts this store runs with.
    fn touch(&mut self, key: &FrameKey) {
        if let Some(position) = self.lru_queue.iter().position(|k| k == key) {
            self.lru_queue.remove(position);
        }
        self.lru_queue.push_back(*key);
    }
}
