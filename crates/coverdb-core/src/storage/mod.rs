//! Slot-addressed storage backends and typed views over them.
//!
//! All index state lives in opaque byte "slots" addressed by [`SlotId`];
//! every structural relationship is an index into a slot, never a native
//! pointer. The index itself allocates no raw memory — it only manipulates
//! offsets through the [`SlotStore`] primitives.

mod array;
mod file;
mod free_set;
mod mem;

pub use file::FileStore;
pub use mem::MemStore;

pub(crate) use array::{DynArray, Record};
pub(crate) use free_set::FreeSet;

use crate::error::Result;

/// Identifier of one storage slot.
pub type SlotId = u32;

/// A growable arena of byte slots.
///
/// Backends only provide byte-range reads/writes and slot lifecycle; all
/// typed layout is built on top (see `DynArray`). Single writer, no internal
/// locking: the surrounding transaction system is responsible for
/// serializing access.
pub trait SlotStore {
    /// Allocates a zero-filled slot of `len` bytes and returns its id.
    fn alloc(&mut self, len: usize) -> Result<SlotId>;

    /// Releases a slot; the id may be handed out again by a later `alloc`.
    fn release(&mut self, slot: SlotId) -> Result<()>;

    /// Returns whether `slot` is currently allocated.
    fn contains(&self, slot: SlotId) -> bool;

    /// Returns the byte capacity of `slot`.
    fn len(&self, slot: SlotId) -> Result<usize>;

    /// Grows `slot` to `new_len` bytes (zero-filled); smaller values are a
    /// no-op.
    fn grow(&mut self, slot: SlotId, new_len: usize) -> Result<()>;

    /// Reads `buf.len()` bytes starting at `offset`.
    fn read(&self, slot: SlotId, offset: usize, buf: &mut [u8]) -> Result<()>;

    /// Writes `bytes` starting at `offset`; the range must be in capacity.
    fn write(&mut self, slot: SlotId, offset: usize, bytes: &[u8]) -> Result<()>;

    /// Reads `len` bytes starting at `offset` into a fresh buffer.
    fn read_vec(&self, slot: SlotId, offset: usize, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read(slot, offset, &mut buf)?;
        Ok(buf)
    }
}

// Lets an index borrow a store instead of owning it.
impl<T: SlotStore + ?Sized> SlotStore for &mut T {
    fn alloc(&mut self, len: usize) -> Result<SlotId> {
        (**self).alloc(len)
    }

    fn release(&mut self, slot: SlotId) -> Result<()> {
        (**self).release(slot)
    }

    fn contains(&self, slot: SlotId) -> bool {
        (**self).contains(slot)
    }

    fn len(&self, slot: SlotId) -> Result<usize> {
        (**self).len(slot)
    }

    fn grow(&mut self, slot: SlotId, new_len: usize) -> Result<()> {
        (**self).grow(slot, new_len)
    }

    fn read(&self, slot: SlotId, offset: usize, buf: &mut [u8]) -> Result<()> {
        (**self).read(slot, offset, buf)
    }

    fn write(&mut self, slot: SlotId, offset: usize, bytes: &[u8]) -> Result<()> {
        (**self).write(slot, offset, bytes)
    }
}
