//! In-memory slot arena.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::{SlotId, SlotStore};

/// In-memory [`SlotStore`] backed by a vector of byte buffers.
///
/// Released slot ids go to a free list and are reused by later allocations,
/// so id churn does not grow the arena. This is the reference backend for
/// tests and for embeddings that do not need durability; [`FileStore`]
/// snapshots one of these to disk.
///
/// [`FileStore`]: crate::storage::FileStore
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MemStore {
    slots: Vec<Option<Vec<u8>>>,
    free: Vec<SlotId>,
}

impl MemStore {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live (allocated) slots.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    fn buf(&self, slot: SlotId) -> Result<&Vec<u8>> {
        self.slots
            .get(slot as usize)
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::no_such_slot(slot))
    }

    fn buf_mut(&mut self, slot: SlotId) -> Result<&mut Vec<u8>> {
        self.slots
            .get_mut(slot as usize)
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::no_such_slot(slot))
    }
}

impl SlotStore for MemStore {
    fn alloc(&mut self, len: usize) -> Result<SlotId> {
        if let Some(slot) = self.free.pop() {
            self.slots[slot as usize] = Some(vec![0u8; len]);
            return Ok(slot);
        }
        let slot = u32::try_from(self.slots.len())
            .map_err(|_| Error::Storage("slot arena exhausted".into()))?;
        self.slots.push(Some(vec![0u8; len]));
        Ok(slot)
    }

    fn release(&mut self, slot: SlotId) -> Result<()> {
        let entry = self
            .slots
            .get_mut(slot as usize)
            .ok_or_else(|| Error::no_such_slot(slot))?;
        if entry.take().is_none() {
            return Err(Error::no_such_slot(slot));
        }
        self.free.push(slot);
        Ok(())
    }

    fn contains(&self, slot: SlotId) -> bool {
        matches!(self.slots.get(slot as usize), Some(Some(_)))
    }

    fn len(&self, slot: SlotId) -> Result<usize> {
        Ok(self.buf(slot)?.len())
    }

    fn grow(&mut self, slot: SlotId, new_len: usize) -> Result<()> {
        let buf = self.buf_mut(slot)?;
        if new_len > buf.len() {
            buf.resize(new_len, 0);
        }
        Ok(())
    }

    fn read(&self, slot: SlotId, offset: usize, out: &mut [u8]) -> Result<()> {
        let buf = self.buf(slot)?;
        let end = offset + out.len();
        if end > buf.len() {
            return Err(Error::slot_bounds(slot, offset, out.len(), buf.len()));
        }
        out.copy_from_slice(&buf[offset..end]);
        Ok(())
    }

    fn write(&mut self, slot: SlotId, offset: usize, bytes: &[u8]) -> Result<()> {
        let buf = self.buf_mut(slot)?;
        let end = offset + bytes.len();
        if end > buf.len() {
            return Err(Error::slot_bounds(slot, offset, bytes.len(), buf.len()));
        }
        buf[offset..end].copy_from_slice(bytes);
        Ok(())
    }
}
