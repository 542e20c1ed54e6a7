//! File-backed slot arena.

use std::path::{Path, PathBuf};

use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::storage::{MemStore, SlotId, SlotStore};

/// A [`SlotStore`] persisted to a single file.
///
/// The whole arena is loaded at open and written back on [`FileStore::flush`]
/// (and on drop, best-effort). Suitable for the index's working-set sizes;
/// incremental persistence belongs to the surrounding storage engine, not to
/// this component.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    mem: MemStore,
}

impl FileStore {
    /// Opens the arena at `path`, creating an empty one if the file does not
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or its contents cannot be
    /// decoded.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mem = if path.exists() {
            let bytes = std::fs::read(&path)?;
            postcard::from_bytes(&bytes).map_err(|e| Error::Codec(e.to_string()))?
        } else {
            MemStore::new()
        };
        debug!(path = %path.display(), "slot arena opened");
        Ok(Self { path, mem })
    }

    /// Writes the arena back to its file.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the write fails.
    pub fn flush(&mut self) -> Result<()> {
        let bytes = postcard::to_allocvec(&self.mem).map_err(|e| Error::Codec(e.to_string()))?;
        std::fs::write(&self.path, bytes)?;
        Ok(())
    }
}

impl SlotStore for FileStore {
    fn alloc(&mut self, len: usize) -> Result<SlotId> {
        self.mem.alloc(len)
    }

    fn release(&mut self, slot: SlotId) -> Result<()> {
        self.mem.release(slot)
    }

    fn contains(&self, slot: SlotId) -> bool {
        self.mem.contains(slot)
    }

    fn len(&self, slot: SlotId) -> Result<usize> {
        self.mem.len(slot)
    }

    fn grow(&mut self, slot: SlotId, new_len: usize) -> Result<()> {
        self.mem.grow(slot, new_len)
    }

    fn read(&self, slot: SlotId, offset: usize, buf: &mut [u8]) -> Result<()> {
        self.mem.read(slot, offset, buf)
    }

    fn write(&mut self, slot: SlotId, offset: usize, bytes: &[u8]) -> Result<()> {
        self.mem.write(slot, offset, bytes)
    }
}

// Durability on graceful shutdown; failures are logged, not panicked.
impl Drop for FileStore {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            error!(?e, path = %self.path.display(), "failed to flush slot arena in FileStore::drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arena.bin");

        let slot = {
            let mut store = FileStore::open(&path).unwrap();
            let slot = store.alloc(4).unwrap();
            store.write(slot, 0, &[1, 2, 3, 4]).unwrap();
            store.flush().unwrap();
            slot
        };

        let store = FileStore::open(&path).unwrap();
        assert!(store.contains(slot));
        assert_eq!(store.read_vec(slot, 0, 4).unwrap(), [1, 2, 3, 4]);
    }

    #[test]
    fn test_drop_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arena.bin");

        {
            let mut store = FileStore::open(&path).unwrap();
            let slot = store.alloc(2).unwrap();
            store.write(slot, 0, &[7, 8]).unwrap();
            // No explicit flush: Drop takes care of it.
        }

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.read_vec(0, 0, 2).unwrap(), [7, 8]);
    }

    #[test]
    fn test_free_list_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arena.bin");

        {
            let mut store = FileStore::open(&path).unwrap();
            let a = store.alloc(1).unwrap();
            let _b = store.alloc(1).unwrap();
            store.release(a).unwrap();
            store.flush().unwrap();
        }

        let mut store = FileStore::open(&path).unwrap();
        // The released slot id is reused after reload.
        assert_eq!(store.alloc(1).unwrap(), 0);
    }
}
