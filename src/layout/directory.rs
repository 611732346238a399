//! The hash directory, stored in block 1.
//!
//! The directory is a dense array of `2^global_depth` slots. Slot `i` maps
//! the hash prefix `i` to the bucket block holding records with that prefix.
//! Several slots alias one bucket whenever the bucket's local depth is below
//! the global depth, and those aliases always form one contiguous run.

use crate::error::{Error, Result};
use crate::layout::{DIRECTORY_BLOCK, DIRECTORY_CAPACITY, HEADER_BLOCK};
use crate::store::BlockId;
use bytes::{Buf, BufMut};

/// One directory entry: a hash prefix and the bucket block it routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectorySlot {
    /// The hash prefix this slot serves. Always equals the slot's position.
    pub hash_value: u32,
    /// The bucket block records with this prefix live in.
    pub block: BlockId,
}

/// The in-memory form of the directory block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    slots: Vec<DirectorySlot>,
}

impl Directory {
    /// Builds a directory routing prefix `i` to `buckets[i]`.
    pub fn from_buckets(buckets: &[BlockId]) -> Self {
        let slots = buckets
            .iter()
            .enumerate()
            .map(|(i, &block)| DirectorySlot {
                hash_value: i as u32,
                block,
            })
            .collect();
        Self { slots }
    }

    /// Number of slots, always `2^global_depth`.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the directory has no slots. Never true for a valid directory.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The slot array.
    pub fn slots(&self) -> &[DirectorySlot] {
        &self.slots
    }

    /// Finds the slot serving `hash_value`.
    pub fn locate(&self, hash_value: u32) -> Result<usize> {
        self.slots
            .iter()
            .position(|slot| slot.hash_value == hash_value)
            .ok_or_else(|| {
                Error::corruption(format!("directory has no slot for hash value {}", hash_value))
            })
    }

    /// Points slot `index` at `block`.
    pub fn set_block(&mut self, index: usize, block: BlockId) {
        self.slots[index].block = block;
    }

    /// The doubled directory: each old slot becomes two adjacent slots
    /// routing to the same bucket, renumbered for the deeper prefix.
    pub fn double(&self) -> Self {
        let slots = (0..self.slots.len() * 2)
            .map(|i| DirectorySlot {
                hash_value: i as u32,
                block: self.slots[i >> 1].block,
            })
            .collect();
        Self { slots }
    }

    /// The contiguous run of slots routing to `block`, as inclusive
    /// `(first, last)` indexes. `None` when no slot points there.
    pub fn buddy_range(&self, block: BlockId) -> Option<(usize, usize)> {
        let first = self.slots.iter().position(|slot| slot.block == block)?;
        let mut last = first;
        while last + 1 < self.slots.len() && self.slots[last + 1].block == block {
            last += 1;
        }
        Some((first, last))
    }

    /// Appends the encoded directory to `buf`.
    pub fn encode_into(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.slots.len() as u32);
        for slot in &self.slots {
            buf.put_u32_le(slot.hash_value);
            buf.put_u32_le(slot.block);
        }
    }

    /// Decodes and validates the directory from the front of `data`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::corruption(format!(
                "directory truncated: {} bytes",
                data.len()
            )));
        }
        let mut buf = data;
        let size = buf.get_u32_le() as usize;
        if size == 0 || size > DIRECTORY_CAPACITY {
            return Err(Error::corruption(format!(
                "directory size {} outside 1..={}",
                size, DIRECTORY_CAPACITY
            )));
        }
        if !size.is_power_of_two() {
            return Err(Error::corruption(format!(
                "directory size {} is not a power of two",
                size
            )));
        }
        if buf.remaining() < size * 8 {
            return Err(Error::corruption(format!(
                "directory truncated: {} slots do not fit in {} bytes",
                size,
                buf.remaining()
            )));
        }

        let mut slots = Vec::with_capacity(size);
        for i in 0..size {
            let hash_value = buf.get_u32_le();
            let block = buf.get_u32_le();
            if hash_value != i as u32 {
                return Err(Error::corruption(format!(
                    "directory slot {} carries hash value {}",
                    i, hash_value
                )));
            }
            if block == HEADER_BLOCK || block == DIRECTORY_BLOCK {
                return Err(Error::corruption(format!(
                    "directory slot {} routes to reserved block {}",
                    i, block
                )));
            }
            slots.push(DirectorySlot { hash_value, block });
        }
        Ok(Self { slots })
    }
}
