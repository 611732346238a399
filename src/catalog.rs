//! Descriptor table for open indexes.
//!
//! Callers refer to open indexes through small copyable descriptors rather
//! than file handles. The catalog maps descriptors to handles and caps how
//! many indexes may be open at once; closed slots are reused.

use crate::error::{Error, Result};
use crate::store::FileHandle;

/// An opaque ticket for one open index.
///
/// Descriptors stay valid until the index is closed. Using a descriptor
/// after closing it fails with [`Error::InvalidState`], it never touches
/// another index even if the slot has been reused for a different file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexDescriptor {
    slot: usize,
    generation: u64,
}

/// Fixed-capacity table of open index handles.
#[derive(Debug)]
pub(crate) struct Catalog {
    slots: Vec<Option<(u64, FileHandle)>>,
    next_generation: u64,
}

impl Catalog {
    /// Create a catalog with room for `capacity` open indexes.
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            next_generation: 0,
        }
    }

    /// Register an open handle, returning its descriptor.
    pub(crate) fn bind(&mut self, handle: FileHandle) -> Result<IndexDescriptor> {
        let slot = self
            .slots
            .iter()
            .position(|entry| entry.is_none())
            .ok_or_else(|| {
                Error::resource_exhausted(format!(
                    "open index limit of {} reached",
                    self.slots.len()
                ))
            })?;
        let generation = self.next_generation;
        self.next_generation += 1;
        self.slots[slot] = Some((generation, handle));
        Ok(IndexDescriptor { slot, generation })
    }

    /// Look up the handle behind a descriptor.
    pub(crate) fn get(&self, desc: IndexDescriptor) -> Result<FileHandle> {
        match self.slots.get(desc.slot) {
            Some(Some((generation, handle))) if *generation == desc.generation => {
                Ok(handle.clone())
            }
            _ => Err(Error::invalid_state("index descriptor is not open")),
        }
    }

    /// Remove a descriptor, returning its handle for closing.
    pub(crate) fn unbind(&mut self, desc: IndexDescriptor) -> Result<FileHandle> {
        let slot = self
            .slots
            .get_mut(desc.slot)
            .ok_or_else(|| Error::invalid_state("index descriptor is not open"))?;
        match slot.take() {
            Some((generation, handle)) if generation == desc.generation => Ok(handle),
            other => {
                // A different generation lives here; leave it in place.
                *slot = other;
                Err(Error::invalid_state("index descriptor is not open"))
            }
        }
    }

    /// Whether another descriptor can be bound.
    pub(crate) fn has_room(&self) -> bool {
        self.slots.iter().any(|entry| entry.is_none())
    }

    /// Number of descriptors currently bound.
    pub(crate) fn open_count(&self) -> usize {
        self.slots.iter().filter(|entry| entry.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::BlockStore;
    use tempfile::TempDir;

    fn handle(store: &BlockStore, dir: &TempDir, name: &str) -> FileHandle {
        let path = dir.path().join(name);
        store.create_file(&path).unwrap();
        store.open_file(&path).unwrap()
    }

    #[test]
    fn test_bind_and_get() {
        let dir = TempDir::new().unwrap();
        let store = BlockStore::new(8, true);
        let mut catalog = Catalog::new(4);

        let desc = catalog.bind(handle(&store, &dir, "a.db")).unwrap();
        assert_eq!(catalog.open_count(), 1);
        let got = catalog.get(desc).unwrap();
        assert!(got.path().ends_with("a.db"));
    }

    #[test]
    fn test_capacity_limit() {
        let dir = TempDir::new().unwrap();
        let store = BlockStore::new(8, true);
        let mut catalog = Catalog::new(2);

        assert!(catalog.has_room());
        catalog.bind(handle(&store, &dir, "a.db")).unwrap();
        let second = catalog.bind(handle(&store, &dir, "b.db")).unwrap();
        assert!(!catalog.has_room());
        let err = catalog.bind(handle(&store, &dir, "c.db")).unwrap_err();
        assert!(matches!(err, Error::ResourceExhausted(_)));

        // Freeing a slot makes room again.
        catalog.unbind(second).unwrap();
        assert!(catalog.has_room());
        catalog.bind(handle(&store, &dir, "d.db")).unwrap();
    }

    #[test]
    fn test_stale_descriptor_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = BlockStore::new(8, true);
        let mut catalog = Catalog::new(2);

        let desc = catalog.bind(handle(&store, &dir, "a.db")).unwrap();
        catalog.unbind(desc).unwrap();

        assert!(matches!(
            catalog.get(desc).unwrap_err(),
            Error::InvalidState(_)
        ));
        assert!(matches!(
            catalog.unbind(desc).unwrap_err(),
            Error::InvalidState(_)
        ));

        // The slot is reused but the old descriptor still misses.
        let replacement = catalog.bind(handle(&store, &dir, "b.db")).unwrap();
        assert!(matches!(
            catalog.get(desc).unwrap_err(),
            Error::InvalidState(_)
        ));
        assert!(catalog.get(replacement).is_ok());
    }
}
