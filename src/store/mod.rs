//! Block-oriented file storage with a pinned LRU buffer cache.
//!
//! Every index file is an array of fixed-size blocks. The store hands out
//! blocks through a shared frame cache: reading a block pins its frame in
//! memory, and the pin is released when the returned [`BlockGuard`] drops.
//! Pinned frames are never evicted, so a guard's view of a block stays
//! valid for as long as it is held. Dirty frames are written back to the
//! file when they are evicted and when the file is closed.
//!
//! ```text
//! +--------------+     get_block      +-----------------+
//! |  BlockStore  | -----------------> |   FrameCache    |
//! |  (files,     |   pin frame        |  (LRU, skips    |
//! |   cache)     | <----------------- |   pinned)       |
//! +--------------+     BlockGuard     +-----------------+
//!        |                                    |
//!        | read / write back                  | evict unpinned
//!        v                                    v
//!   index files on disk  <-------------  dirty frames
//! ```

mod cache;
mod file;

pub use cache::CacheStats;
pub use file::{BlockGuard, BlockStore, FileHandle};

/// Size of every block in bytes.
pub const BLOCK_SIZE: usize = 512;

/// A block's position within its file, counted from zero.
pub type BlockId = u32;
