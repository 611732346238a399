//! The index header, stored in block 0.

use crate::error::{Error, Result};
use crate::layout::MAX_GLOBAL_DEPTH;
use bytes::{Buf, BufMut};

/// Header block contents. The global depth is the only mutable piece of
/// index-wide state; everything else lives in the directory and buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    /// Number of hash bits the directory currently distinguishes.
    pub global_depth: u32,
}

impl IndexHeader {
    /// Appends the encoded header to `buf`.
    pub fn encode_into(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.global_depth);
    }

    /// Decodes the header from the front of `data`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::corruption(format!(
                "header truncated: {} bytes",
                data.len()
            )));
        }
        let mut buf = data;
        let global_depth = buf.get_u32_le();
        if global_depth > MAX_GLOBAL_DEPTH {
            return Err(Error::corruption(format!(
                "header global depth {} exceeds maximum {}",
                global_depth, MAX_GLOBAL_DEPTH
            )));
        }
        Ok(Self { global_depth })
    }
}
