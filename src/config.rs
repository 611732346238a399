//! Configuration options for the exhash index engine.

use crate::error::{Error, Result};

/// Configuration options for an index engine instance.
#[derive(Debug, Clone)]
pub struct Options {
    /// Maximum number of simultaneously open index descriptors.
    /// Default: 20
    pub max_open_indexes: usize,

    /// Block cache capacity, in frames of one block each.
    /// Default: 128
    pub cache_frames: usize,

    /// Fsync an index file when it is closed.
    /// Disabling trades durability for faster close.
    /// Default: true
    pub sync_on_close: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_open_indexes: 20,
            cache_frames: 128,
            sync_on_close: true,
        }
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of open descriptors.
    pub fn max_open_indexes(mut self, count: usize) -> Self {
        self.max_open_indexes = count;
        self
    }

    /// Sets the block cache capacity in frames.
    pub fn cache_frames(mut self, frames: usize) -> Self {
        self.cache_frames = frames;
        self
    }

    /// Enables or disables fsync on close.
    pub fn sync_on_close(mut self, value: bool) -> Self {
        self.sync_on_close = value;
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.max_open_indexes == 0 {
            return Err(Error::invalid_argument("max_open_indexes must be > 0"));
        }
        if self.cache_frames == 0 {
            return Err(Error::invalid_argument("cache_frames must be > 0"));
        }
        Ok(())
    }
}
