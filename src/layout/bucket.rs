//! Bucket blocks: fixed-capacity record arrays with a local depth.

use crate::error::{Error, Result};
use crate::hash::prefix_hash;
use crate::layout::{Record, BUCKET_CAPACITY, MAX_GLOBAL_DEPTH, RECORD_SIZE};
use bytes::{Buf, BufMut};

/// The in-memory form of one bucket block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    /// Number of hash bits shared by every record in this bucket.
    pub local_depth: u32,
    records: Vec<Record>,
}

impl Bucket {
    /// A bucket with no records at the given local depth.
    pub fn empty(local_depth: u32) -> Self {
        Self {
            local_depth,
            records: Vec::with_capacity(BUCKET_CAPACITY),
        }
    }

    /// Number of records stored.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the bucket holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether another record would overflow the block.
    pub fn is_full(&self) -> bool {
        self.records.len() >= BUCKET_CAPACITY
    }

    /// The stored records, in insertion order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Appends a record, failing when the bucket is full.
    pub fn push(&mut self, record: Record) -> Result<()> {
        if self.is_full() {
            return Err(Error::resource_exhausted(format!(
                "bucket full at {} records",
                BUCKET_CAPACITY
            )));
        }
        self.records.push(record);
        Ok(())
    }

    /// Splits a full bucket into two deeper ones.
    ///
    /// Existing records plus `incoming` are partitioned by their hash prefix
    /// at `global_depth`: prefixes up to `half` stay in the retained bucket,
    /// the rest move to the new one. `incoming` is placed after the existing
    /// records on whichever side it falls. Fails without producing anything
    /// when the partition leaves more records on one side than a block holds,
    /// which happens when every key shares the deeper prefix.
    pub fn split_with(
        &self,
        incoming: Record,
        global_depth: u32,
        half: u32,
    ) -> Result<(Bucket, Bucket)> {
        debug_assert!(self.local_depth < global_depth);

        let mut retained = Bucket::empty(self.local_depth + 1);
        let mut moved = Bucket::empty(self.local_depth + 1);
        for record in self.records.iter().cloned().chain(std::iter::once(incoming)) {
            let side = if prefix_hash(record.id, global_depth) <= half {
                &mut retained.records
            } else {
                &mut moved.records
            };
            if side.len() >= BUCKET_CAPACITY {
                return Err(Error::resource_exhausted(format!(
                    "split leaves more than {} records on one side",
                    BUCKET_CAPACITY
                )));
            }
            side.push(record);
        }
        Ok((retained, moved))
    }

    /// Appends the encoded bucket to `buf`.
    pub fn encode_into(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.local_depth);
        buf.put_u32_le(self.records.len() as u32);
        for record in &self.records {
            record.encode_into(buf);
        }
    }

    /// Decodes and validates one bucket from the front of `data`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(Error::corruption(format!(
                "bucket truncated: {} bytes",
                data.len()
            )));
        }
        let mut buf = data;
        let local_depth = buf.get_u32_le();
        if local_depth > MAX_GLOBAL_DEPTH {
            return Err(Error::corruption(format!(
                "bucket local depth {} exceeds maximum {}",
                local_depth, MAX_GLOBAL_DEPTH
            )));
        }
        let size = buf.get_u32_le() as usize;
        if size > BUCKET_CAPACITY {
            return Err(Error::corruption(format!(
                "bucket claims {} records, capacity is {}",
                size, BUCKET_CAPACITY
            )));
        }
        if buf.remaining() < size * RECORD_SIZE {
            return Err(Error::corruption(format!(
                "bucket truncated: {} records do not fit in {} bytes",
                size,
                buf.remaining()
            )));
        }

        let mut records = Vec::with_capacity(size);
        for _ in 0..size {
            records.push(Record::decode(buf)?);
            buf.advance(RECORD_SIZE);
        }
        Ok(Self {
            local_depth,
            records,
        })
    }
}
