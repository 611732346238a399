//! # exhash - An Extendible Hashing Disk Index
//!
//! exhash is a persistent hash index over fixed-size records. It implements
//! extendible hashing: a dynamic directory of hash-prefix slots routes every
//! key to a bucket block, buckets split as they fill, and the directory
//! doubles when a split needs one more bit of the hash.
//!
//! ## Architecture
//!
//! The index consists of several key components:
//!
//! - **Record**: one fixed-size tuple (`i32` id plus three bounded strings)
//! - **Directory**: the hash-prefix routing table, stored in one block
//! - **Bucket**: a fixed-capacity record array with its own local depth
//! - **Block store**: paged files behind a shared, pinned LRU buffer cache
//! - **Catalog**: a bounded table of open-index descriptors
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use exhash::{HashIndex, Options, Record};
//!
//! # fn main() -> Result<(), exhash::Error> {
//! let index = HashIndex::new(Options::default())?;
//!
//! // Create an index file with four initial buckets, then open it
//! index.create_index("people.db", 2)?;
//! let people = index.open_index("people.db")?;
//!
//! index.insert(people, Record::new(1, "Sofia", "Koronis", "Athens")?)?;
//!
//! // Point lookup by id
//! for record in index.lookup(people, Some(1))? {
//!     println!("{}", record);
//! }
//!
//! index.close_index(people)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod catalog;
pub mod config;
pub mod error;
pub mod hash;
pub mod layout;
pub mod store;

// Re-exports
pub use catalog::IndexDescriptor;
pub use config::Options;
pub use error::{Error, Result};
pub use layout::Record;
pub use store::CacheStats;

use catalog::Catalog;
use hash::prefix_hash;
use layout::{
    Bucket, Directory, IndexHeader, DIRECTORY_BLOCK, FIRST_BUCKET_BLOCK, HEADER_BLOCK,
    MAX_GLOBAL_DEPTH,
};
use log::{debug, info};
use parking_lot::Mutex;
use std::path::Path;
use store::{BlockId, BlockStore, FileHandle};

/// Occupancy statistics for one index file.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexStats {
    /// Total blocks in the file, header and directory included.
    pub blocks: u64,
    /// Number of distinct buckets.
    pub buckets: usize,
    /// Record count of the fullest bucket.
    pub max_records: u32,
    /// Record count of the emptiest bucket.
    pub min_records: u32,
    /// Mean records per distinct bucket.
    pub mean_records: f64,
}

/// The main index engine handle.
///
/// One engine owns a block store with its shared buffer cache and a bounded
/// catalog of open indexes. Any number of index files can be created and
/// served through the same engine.
///
/// # Thread Safety
///
/// `HashIndex` is thread-safe; share it across threads with `Arc<HashIndex>`.
/// Individual operations are atomic with respect to the catalog and the
/// block cache, but concurrent writers to one index file are not
/// coordinated beyond that.
pub struct HashIndex {
    /// Configuration options
    options: Options,

    /// Block storage shared by every index this engine touches
    store: BlockStore,

    /// Table of open index descriptors
    catalog: Mutex<Catalog>,
}

impl HashIndex {
    /// Creates an engine with the given options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when the options fail validation.
    pub fn new(options: Options) -> Result<Self> {
        options.validate()?;
        let store = BlockStore::new(options.cache_frames, options.sync_on_close);
        let catalog = Mutex::new(Catalog::new(options.max_open_indexes));
        Ok(Self {
            options,
            store,
            catalog,
        })
    }

    /// Creates a new index file.
    ///
    /// The file is laid out with a header block carrying `global_depth`,
    /// a directory block, and `2^global_depth` empty buckets whose local
    /// depth equals the global depth. The file is opened through the
    /// catalog for initialization and closed again before returning.
    ///
    /// # Arguments
    ///
    /// * `path` - Filesystem path of the new index file
    /// * `global_depth` - Initial number of hash bits the directory uses
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The path is empty or `global_depth` exceeds the directory's
    ///   maximum depth ([`Error::InvalidArgument`])
    /// - A file already exists at the path ([`Error::AlreadyExists`])
    /// - The catalog has no free slot ([`Error::ResourceExhausted`])
    pub fn create_index<P: AsRef<Path>>(&self, path: P, global_depth: u32) -> Result<()> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::invalid_argument("index filename is empty"));
        }
        if global_depth > MAX_GLOBAL_DEPTH {
            return Err(Error::invalid_argument(format!(
                "global depth {} exceeds maximum {}",
                global_depth, MAX_GLOBAL_DEPTH
            )));
        }

        self.store.create_file(path)?;

        // Bind a descriptor for the initialization writes.
        let desc = {
            let mut catalog = self.catalog.lock();
            if !catalog.has_room() {
                return Err(Error::resource_exhausted(format!(
                    "open index limit of {} reached",
                    self.options.max_open_indexes
                )));
            }
            let handle = self.store.open_file(path)?;
            catalog.bind(handle)?
        };

        let result = self.initialize_index(desc, global_depth);
        let close_result = self.close_index(desc);
        result?;
        close_result?;

        info!(
            "created index {} with global depth {}",
            path.display(),
            global_depth
        );
        Ok(())
    }

    /// Opens an existing index file, returning its descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The catalog has no free slot ([`Error::ResourceExhausted`])
    /// - The file cannot be opened ([`Error::Io`])
    /// - The file is not an index: too few blocks or an unreadable header
    ///   ([`Error::Corruption`])
    pub fn open_index<P: AsRef<Path>>(&self, path: P) -> Result<IndexDescriptor> {
        let path = path.as_ref();
        let mut catalog = self.catalog.lock();
        if !catalog.has_room() {
            return Err(Error::resource_exhausted(format!(
                "open index limit of {} reached",
                self.options.max_open_indexes
            )));
        }

        let handle = self.store.open_file(path)?;
        if let Err(e) = self.validate_index_file(&handle) {
            let _ = self.store.close_file(handle);
            return Err(e);
        }

        let desc = catalog.bind(handle)?;
        debug!("opened index {}", path.display());
        Ok(desc)
    }

    /// Closes an open index.
    ///
    /// Dirty cached blocks are written back and the descriptor becomes
    /// invalid. Closing twice fails with [`Error::InvalidState`].
    pub fn close_index(&self, desc: IndexDescriptor) -> Result<()> {
        let handle = self.catalog.lock().unbind(desc)?;
        debug!("closing index {}", handle.path().display());
        self.store.close_file(handle)
    }

    /// Inserts a record into an open index.
    ///
    /// Duplicate ids are permitted and accumulate. When the target bucket
    /// is full it is split once; if no spare hash bit distinguishes the two
    /// halves, the directory doubles first. Every call re-reads the header
    /// and directory, so the descriptor always observes the file's current
    /// shape.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The descriptor is not open ([`Error::InvalidState`])
    /// - The directory is at its maximum depth and must double, or every
    ///   key in a splitting bucket shares the deeper hash prefix
    ///   ([`Error::ResourceExhausted`])
    /// - A block fails its integrity checks ([`Error::Corruption`])
    pub fn insert(&self, desc: IndexDescriptor, record: Record) -> Result<()> {
        let handle = self.handle_for(desc)?;
        let (mut header, mut directory) = self.read_index_state(&handle)?;

        // Step 1: Route the key to its bucket.
        let hash = prefix_hash(record.id, header.global_depth);
        let slot = directory.locate(hash)?;
        let bucket_block = directory.slots()[slot].block;
        let mut bucket = self.read_bucket(&handle, bucket_block)?;
        if bucket.local_depth > header.global_depth {
            return Err(Error::corruption(format!(
                "bucket {} local depth {} exceeds global depth {}",
                bucket_block, bucket.local_depth, header.global_depth
            )));
        }

        // Step 2: Plain append while there is room.
        if !bucket.is_full() {
            bucket.push(record)?;
            return self.write_bucket(&handle, bucket_block, &bucket);
        }

        // Step 3: A full bucket at the global depth has no spare hash bit
        // to split on, so the directory doubles first.
        if bucket.local_depth == header.global_depth {
            if header.global_depth == MAX_GLOBAL_DEPTH {
                return Err(Error::resource_exhausted(format!(
                    "directory of {} is at its maximum depth {}",
                    handle.path().display(),
                    MAX_GLOBAL_DEPTH
                )));
            }
            directory = directory.double();
            header.global_depth += 1;
            self.write_directory(&handle, &directory)?;
            self.write_header(&handle, &header)?;
            info!(
                "doubled directory of {} to depth {}",
                handle.path().display(),
                header.global_depth
            );
        }

        // Step 4: Partition the bucket and the incoming record across the
        // bucket's buddy range. Nothing has been written yet if this fails.
        let (first, last) = directory.buddy_range(bucket_block).ok_or_else(|| {
            Error::corruption(format!(
                "no directory slot routes to bucket {}",
                bucket_block
            ))
        })?;
        let span = last - first + 1;
        let half = (first + span / 2 - 1) as u32;
        let record_id = record.id;
        let (retained, moved) = bucket.split_with(record, header.global_depth, half)?;

        // Step 5: Persist the directory, then both buckets, as independent
        // writes.
        let new_block = handle.allocate_block()?;
        for slot in (first + span / 2)..=last {
            directory.set_block(slot, new_block);
        }
        self.write_directory(&handle, &directory)?;
        self.write_bucket(&handle, bucket_block, &retained)?;
        self.write_bucket(&handle, new_block, &moved)?;
        info!(
            "split bucket {} of {} into {}+{} records inserting id {}",
            bucket_block,
            handle.path().display(),
            retained.len(),
            moved.len(),
            record_id
        );
        Ok(())
    }

    /// Looks up records in an open index.
    ///
    /// With `Some(id)` this reads the one bucket the id hashes to and
    /// returns every record with that id, in insertion order; an absent id
    /// yields an empty vector. With `None` it returns every record in the
    /// file, visiting each distinct bucket once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] for a closed descriptor and
    /// [`Error::Corruption`] when a block fails its integrity checks.
    pub fn lookup(&self, desc: IndexDescriptor, id: Option<i32>) -> Result<Vec<Record>> {
        let handle = self.handle_for(desc)?;
        let (header, directory) = self.read_index_state(&handle)?;

        match id {
            Some(id) => {
                let hash = prefix_hash(id, header.global_depth);
                let slot = directory.locate(hash)?;
                let bucket = self.read_bucket(&handle, directory.slots()[slot].block)?;
                Ok(bucket
                    .records()
                    .iter()
                    .filter(|record| record.id == id)
                    .cloned()
                    .collect())
            }
            None => {
                let mut records = Vec::new();
                self.walk_buckets(&handle, &header, &directory, |bucket| {
                    records.extend_from_slice(bucket.records());
                })?;
                Ok(records)
            }
        }
    }

    /// Computes occupancy statistics for an index file by name.
    ///
    /// The file is opened through the catalog for the duration of the call
    /// and closed again on success and error paths alike, so it counts
    /// against the open-index limit while running.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`open_index`](Self::open_index), plus
    /// [`Error::Corruption`] when the directory yields no buckets.
    pub fn statistics<P: AsRef<Path>>(&self, path: P) -> Result<IndexStats> {
        let desc = self.open_index(path)?;
        let result = self.compute_statistics(desc);
        let close_result = self.close_index(desc);
        let stats = result?;
        close_result?;
        Ok(stats)
    }

    /// Number of indexes currently open through the catalog.
    pub fn open_indexes(&self) -> usize {
        self.catalog.lock().open_count()
    }

    /// Snapshot of the shared block-cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.store.cache_stats()
    }

    /// Lay the empty index structure out in a freshly created file.
    fn initialize_index(&self, desc: IndexDescriptor, global_depth: u32) -> Result<()> {
        let handle = self.handle_for(desc)?;

        let header_block = handle.allocate_block()?;
        debug_assert_eq!(header_block, HEADER_BLOCK);
        let directory_block = handle.allocate_block()?;
        debug_assert_eq!(directory_block, DIRECTORY_BLOCK);

        self.write_header(&handle, &IndexHeader { global_depth })?;

        let mut buckets = Vec::with_capacity(1 << global_depth);
        for _ in 0..(1u32 << global_depth) {
            let block = handle.allocate_block()?;
            self.write_bucket(&handle, block, &Bucket::empty(global_depth))?;
            buckets.push(block);
        }
        self.write_directory(&handle, &Directory::from_buckets(&buckets))
    }

    /// Cheap sanity check that an opened file is an index.
    fn validate_index_file(&self, handle: &FileHandle) -> Result<()> {
        let blocks = handle.block_count()?;
        if blocks <= u64::from(FIRST_BUCKET_BLOCK) {
            return Err(Error::corruption(format!(
                "file {} has {} blocks, too few for an index",
                handle.path().display(),
                blocks
            )));
        }
        self.read_header(handle)?;
        Ok(())
    }

    fn compute_statistics(&self, desc: IndexDescriptor) -> Result<IndexStats> {
        let handle = self.handle_for(desc)?;
        let blocks = handle.block_count()?;
        let (header, directory) = self.read_index_state(&handle)?;

        let mut buckets = 0usize;
        let mut total = 0u64;
        let mut max_records = 0u32;
        let mut min_records = u32::MAX;
        self.walk_buckets(&handle, &header, &directory, |bucket| {
            let len = bucket.len() as u32;
            buckets += 1;
            total += u64::from(len);
            max_records = max_records.max(len);
            min_records = min_records.min(len);
        })?;
        if buckets == 0 {
            return Err(Error::corruption(format!(
                "directory of {} yields no buckets",
                handle.path().display()
            )));
        }

        Ok(IndexStats {
            blocks,
            buckets,
            max_records,
            min_records,
            mean_records: total as f64 / buckets as f64,
        })
    }

    /// Visit every distinct bucket once, in directory order.
    ///
    /// A bucket with local depth `l` is aliased by `2^(global - l)`
    /// consecutive slots; the walk lands on the first of each run and
    /// steps over the rest.
    fn walk_buckets(
        &self,
        handle: &FileHandle,
        header: &IndexHeader,
        directory: &Directory,
        mut visit: impl FnMut(&Bucket),
    ) -> Result<()> {
        let mut slot = 0usize;
        while slot < directory.len() {
            let block = directory.slots()[slot].block;
            let bucket = self.read_bucket(handle, block)?;
            if bucket.local_depth > header.global_depth {
                return Err(Error::corruption(format!(
                    "bucket {} local depth {} exceeds global depth {}",
                    block, bucket.local_depth, header.global_depth
                )));
            }
            visit(&bucket);
            slot += 1usize << (header.global_depth - bucket.local_depth);
        }
        Ok(())
    }

    fn handle_for(&self, desc: IndexDescriptor) -> Result<FileHandle> {
        self.catalog.lock().get(desc)
    }

    fn read_header(&self, handle: &FileHandle) -> Result<IndexHeader> {
        let guard = handle.get_block(HEADER_BLOCK)?;
        guard.with_data(IndexHeader::decode)
    }

    fn write_header(&self, handle: &FileHandle, header: &IndexHeader) -> Result<()> {
        let guard = handle.get_block(HEADER_BLOCK)?;
        guard.with_data_mut(|data| {
            data.fill(0);
            let mut buf = &mut data[..];
            header.encode_into(&mut buf);
        });
        Ok(())
    }

    fn read_directory(&self, handle: &FileHandle) -> Result<Directory> {
        let guard = handle.get_block(DIRECTORY_BLOCK)?;
        guard.with_data(Directory::decode)
    }

    fn write_directory(&self, handle: &FileHandle, directory: &Directory) -> Result<()> {
        let guard = handle.get_block(DIRECTORY_BLOCK)?;
        guard.with_data_mut(|data| {
            data.fill(0);
            let mut buf = &mut data[..];
            directory.encode_into(&mut buf);
        });
        Ok(())
    }

    /// Read header and directory together, cross-checking that the
    /// directory size matches the global depth.
    fn read_index_state(&self, handle: &FileHandle) -> Result<(IndexHeader, Directory)> {
        let header = self.read_header(handle)?;
        let directory = self.read_directory(handle)?;
        if directory.len() != 1usize << header.global_depth {
            return Err(Error::corruption(format!(
                "directory has {} slots, global depth {} requires {}",
                directory.len(),
                header.global_depth,
                1usize << header.global_depth
            )));
        }
        Ok((header, directory))
    }

    fn read_bucket(&self, handle: &FileHandle, block: BlockId) -> Result<Bucket> {
        let guard = handle.get_block(block)?;
        guard.with_data(Bucket::decode)
    }

    fn write_bucket(&self, handle: &FileHandle, block: BlockId, bucket: &Bucket) -> Result<()> {
        let guard = handle.get_block(block)?;
        guard.with_data_mut(|data| {
            data.fill(0);
            let mut buf = &mut data[..];
            bucket.encode_into(&mut buf);
        });
        Ok(())
    }
}
