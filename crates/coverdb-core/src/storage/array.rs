//! Typed, length-prefixed record arrays over storage slots.

use std::marker::PhantomData;

use crate::error::{Error, Result};
use crate::storage::{SlotId, SlotStore};

/// A fixed-size record that can live inside a slot.
///
/// `SIZE` must be the exact encoded length; `decode` is handed exactly
/// `SIZE` bytes.
pub(crate) trait Record: Sized {
    /// Encoded byte length.
    const SIZE: usize;

    /// Writes the record into `out` (`SIZE` bytes).
    fn encode(&self, out: &mut [u8]);

    /// Reads a record from `buf` (`SIZE` bytes).
    fn decode(buf: &[u8]) -> Self;
}

impl Record for u32 {
    const SIZE: usize = 4;

    fn encode(&self, out: &mut [u8]) {
        out.copy_from_slice(&self.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        Self::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
    }
}

impl<const N: usize> Record for [f32; N] {
    const SIZE: usize = N * 4;

    fn encode(&self, out: &mut [u8]) {
        for (chunk, v) in out.chunks_exact_mut(4).zip(self.iter()) {
            chunk.copy_from_slice(&v.to_le_bytes());
        }
    }

    fn decode(buf: &[u8]) -> Self {
        let mut out = [0.0f32; N];
        for (chunk, v) in buf.chunks_exact(4).zip(out.iter_mut()) {
            *v = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        out
    }
}

/// Growable array of fixed-size records inside a single slot.
///
/// Layout: `[len: u32 le][record 0][record 1]...`. The struct itself is a
/// cheap typed view (slot id plus a marker); the length lives in storage so
/// reopened views stay consistent. Capacity grows by doubling, so appends
/// are amortized O(1) slot growths.
pub(crate) struct DynArray<R> {
    slot: SlotId,
    _marker: PhantomData<fn() -> R>,
}

impl<R> Clone for DynArray<R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for DynArray<R> {}

const LEN_PREFIX: usize = 4;

/// Record capacity allocated for a fresh array.
const INITIAL_RECORDS: usize = 8;

impl<R: Record> DynArray<R> {
    /// Allocates a new, empty array in `store`.
    pub(crate) fn create<S: SlotStore>(store: &mut S) -> Result<Self> {
        let slot = store.alloc(LEN_PREFIX + INITIAL_RECORDS * R::SIZE)?;
        // Fresh slots are zero-filled, so len starts at 0.
        Ok(Self {
            slot,
            _marker: PhantomData,
        })
    }

    /// Reattaches a view to an existing array slot.
    pub(crate) fn open(slot: SlotId) -> Self {
        Self {
            slot,
            _marker: PhantomData,
        }
    }

    /// Slot holding this array.
    pub(crate) fn slot(&self) -> SlotId {
        self.slot
    }

    /// Number of records.
    pub(crate) fn len<S: SlotStore>(&self, store: &S) -> Result<u32> {
        let buf = store.read_vec(self.slot, 0, LEN_PREFIX)?;
        Ok(u32::decode(&buf))
    }

    fn set_len<S: SlotStore>(&self, store: &mut S, len: u32) -> Result<()> {
        let mut buf = [0u8; LEN_PREFIX];
        len.encode(&mut buf);
        store.write(self.slot, 0, &buf)
    }

    fn offset(index: u32) -> usize {
        LEN_PREFIX + index as usize * R::SIZE
    }

    fn check_bounds<S: SlotStore>(&self, store: &S, index: u32) -> Result<u32> {
        let len = self.len(store)?;
        if index >= len {
            return Err(Error::Storage(format!(
                "array in slot {}: index {index} out of bounds (len {len})",
                self.slot
            )));
        }
        Ok(len)
    }

    /// Reads the record at `index`.
    pub(crate) fn get<S: SlotStore>(&self, store: &S, index: u32) -> Result<R> {
        self.check_bounds(store, index)?;
        let buf = store.read_vec(self.slot, Self::offset(index), R::SIZE)?;
        Ok(R::decode(&buf))
    }

    /// Overwrites the record at `index`.
    pub(crate) fn set<S: SlotStore>(&self, store: &mut S, index: u32, value: &R) -> Result<()> {
        self.check_bounds(store, index)?;
        let mut buf = vec![0u8; R::SIZE];
        value.encode(&mut buf);
        store.write(self.slot, Self::offset(index), &buf)
    }

    /// Appends a record, growing the slot if needed; returns its index.
    pub(crate) fn push<S: SlotStore>(&self, store: &mut S, value: &R) -> Result<u32> {
        let len = self.len(store)?;
        self.ensure_capacity(store, len + 1)?;
        let mut buf = vec![0u8; R::SIZE];
        value.encode(&mut buf);
        store.write(self.slot, Self::offset(len), &buf)?;
        self.set_len(store, len + 1)?;
        Ok(len)
    }

    /// Inserts a record at `index`, shifting later records right.
    pub(crate) fn insert_at<S: SlotStore>(
        &self,
        store: &mut S,
        index: u32,
        value: &R,
    ) -> Result<()> {
        let len = self.len(store)?;
        if index > len {
            return Err(Error::Storage(format!(
                "array in slot {}: insert index {index} out of bounds (len {len})",
                self.slot
            )));
        }
        self.ensure_capacity(store, len + 1)?;
        if index < len {
            let tail = store.read_vec(
                self.slot,
                Self::offset(index),
                (len - index) as usize * R::SIZE,
            )?;
            store.write(self.slot, Self::offset(index + 1), &tail)?;
        }
        let mut buf = vec![0u8; R::SIZE];
        value.encode(&mut buf);
        store.write(self.slot, Self::offset(index), &buf)?;
        self.set_len(store, len + 1)
    }

    /// Removes the record at `index`, shifting later records left.
    pub(crate) fn remove_at<S: SlotStore>(&self, store: &mut S, index: u32) -> Result<()> {
        let len = self.check_bounds(store, index)?;
        if index + 1 < len {
            let tail = store.read_vec(
                self.slot,
                Self::offset(index + 1),
                (len - index - 1) as usize * R::SIZE,
            )?;
            store.write(self.slot, Self::offset(index), &tail)?;
        }
        self.set_len(store, len - 1)
    }

    /// Drops all records; capacity is kept for reuse.
    pub(crate) fn clear<S: SlotStore>(&self, store: &mut S) -> Result<()> {
        self.set_len(store, 0)
    }

    /// Shortens the array to `new_len` records.
    pub(crate) fn truncate<S: SlotStore>(&self, store: &mut S, new_len: u32) -> Result<()> {
        let len = self.len(store)?;
        if new_len < len {
            self.set_len(store, new_len)?;
        }
        Ok(())
    }

    /// Reads the whole array into memory.
    pub(crate) fn read_all<S: SlotStore>(&self, store: &S) -> Result<Vec<R>> {
        let len = self.len(store)?;
        let buf = store.read_vec(self.slot, LEN_PREFIX, len as usize * R::SIZE)?;
        Ok(buf.chunks_exact(R::SIZE).map(R::decode).collect())
    }

    fn ensure_capacity<S: SlotStore>(&self, store: &mut S, records: u32) -> Result<()> {
        let needed = LEN_PREFIX + records as usize * R::SIZE;
        let capacity = store.len(self.slot)?;
        if needed > capacity {
            store.grow(self.slot, needed.max(capacity * 2))?;
        }
        Ok(())
    }
}
