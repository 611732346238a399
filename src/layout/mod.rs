//! On-disk layout of an index file.
//!
//! An index file is a sequence of fixed-size blocks (see [`crate::store`]):
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Block 0: header        global_depth: u32, rest unused       │
//! │ Block 1: directory     size: u32, then `size` slots of      │
//! │                        { hash_value: u32, block: u32 }      │
//! │ Block 2..: buckets     local_depth: u32, size: u32, then    │
//! │                        up to BUCKET_CAPACITY records        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. Every codec zero-fills the unused tail
//! of its block and validates bounds on decode, so a malformed block is
//! reported as [`crate::Error::Corruption`] instead of being interpreted.
//!
//! The whole directory lives in block 1, which caps the global depth: at
//! most [`DIRECTORY_CAPACITY`] slots fit, so depth never exceeds
//! [`MAX_GLOBAL_DEPTH`]. Directory doubling checks this ceiling before
//! touching the file.

mod bucket;
mod directory;
mod header;
mod record;

pub use bucket::Bucket;
pub use directory::{Directory, DirectorySlot};
pub use header::IndexHeader;
pub use record::Record;

use crate::store::{BlockId, BLOCK_SIZE};

/// Fixed width of the record `name` field, including its NUL terminator.
pub const NAME_LEN: usize = 15;

/// Fixed width of the record `surname` field, including its NUL terminator.
pub const SURNAME_LEN: usize = 20;

/// Fixed width of the record `city` field, including its NUL terminator.
pub const CITY_LEN: usize = 20;

/// Encoded size of one record: a 4-byte id plus the three string fields.
pub const RECORD_SIZE: usize = 4 + NAME_LEN + SURNAME_LEN + CITY_LEN;

/// Bucket block header: `local_depth: u32` followed by `size: u32`.
pub const BUCKET_HEADER_SIZE: usize = 8;

/// Records per bucket block.
pub const BUCKET_CAPACITY: usize = (BLOCK_SIZE - BUCKET_HEADER_SIZE) / RECORD_SIZE;

/// Directory block header: `size: u32`.
pub const DIRECTORY_HEADER_SIZE: usize = 4;

/// Encoded size of one directory slot: `hash_value: u32` + `block: u32`.
pub const DIRECTORY_SLOT_SIZE: usize = 8;

/// Directory slots that fit in one block, a hard ceiling on `2^depth`.
pub const DIRECTORY_CAPACITY: usize =
    (BLOCK_SIZE - DIRECTORY_HEADER_SIZE) / DIRECTORY_SLOT_SIZE;

/// Largest global depth whose directory still fits in block 1.
pub const MAX_GLOBAL_DEPTH: u32 = DIRECTORY_CAPACITY.ilog2();

/// Block number of the header block.
pub const HEADER_BLOCK: BlockId = 0;

/// Block number of the directory block.
pub const DIRECTORY_BLOCK: BlockId = 1;

/// First block number a bucket can occupy.
pub const FIRST_BUCKET_BLOCK: BlockId = 2;
