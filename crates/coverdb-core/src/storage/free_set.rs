//! Ordered free-id sets for element and node slot reuse.

use crate::error::{Error, Result};
use crate::storage::{DynArray, SlotId, SlotStore};

/// An ordered set of freed u32 ids stored in a slot.
///
/// Kept sorted ascending; `pop` hands back the largest id first. Every id is
/// either live or present in exactly one free set, never both — the element
/// store and the tree rely on that to decide liveness.
#[derive(Clone, Copy)]
pub(crate) struct FreeSet {
    ids: DynArray<u32>,
}

impl FreeSet {
    /// Allocates an empty set in `store`.
    pub(crate) fn create<S: SlotStore>(store: &mut S) -> Result<Self> {
        Ok(Self {
            ids: DynArray::create(store)?,
        })
    }

    /// Reattaches to an existing set slot.
    pub(crate) fn open(slot: SlotId) -> Self {
        Self {
            ids: DynArray::open(slot),
        }
    }

    /// Slot holding this set.
    pub(crate) fn slot(&self) -> SlotId {
        self.ids.slot()
    }

    /// Number of freed ids.
    pub(crate) fn len<S: SlotStore>(&self, store: &S) -> Result<u32> {
        self.ids.len(store)
    }

    /// Whether `id` is in the set.
    pub(crate) fn contains<S: SlotStore>(&self, store: &S, id: u32) -> Result<bool> {
        Ok(self.ids.read_all(store)?.binary_search(&id).is_ok())
    }

    /// Adds `id` to the set.
    pub(crate) fn insert<S: SlotStore>(&self, store: &mut S, id: u32) -> Result<()> {
        let ids = self.ids.read_all(&*store)?;
        match ids.binary_search(&id) {
            Ok(_) => Err(Error::Storage(format!("id {id} is already free"))),
            Err(pos) => self.ids.insert_at(
                store,
                u32::try_from(pos).map_err(|_| Error::Storage("free set overflow".into()))?,
                &id,
            ),
        }
    }

    /// Removes and returns the largest id, if any.
    pub(crate) fn pop<S: SlotStore>(&self, store: &mut S) -> Result<Option<u32>> {
        let len = self.ids.len(&*store)?;
        if len == 0 {
            return Ok(None);
        }
        let id = self.ids.get(&*store, len - 1)?;
        self.ids.truncate(store, len - 1)?;
        Ok(Some(id))
    }

    /// Reads all freed ids, sorted ascending.
    pub(crate) fn to_vec<S: SlotStore>(&self, store: &S) -> Result<Vec<u32>> {
        self.ids.read_all(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemStore;

    #[test]
    fn test_insert_keeps_sorted_order() {
        let mut store = MemStore::new();
        let set = FreeSet::create(&mut store).unwrap();

        for id in [5, 1, 9, 3] {
            set.insert(&mut store, id).unwrap();
        }
        assert_eq!(set.to_vec(&store).unwrap(), vec![1, 3, 5, 9]);
    }

    #[test]
    fn test_pop_returns_largest() {
        let mut store = MemStore::new();
        let set = FreeSet::create(&mut store).unwrap();
        for id in [2, 7, 4] {
            set.insert(&mut store, id).unwrap();
        }

        assert_eq!(set.pop(&mut store).unwrap(), Some(7));
        assert_eq!(set.pop(&mut store).unwrap(), Some(4));
        assert_eq!(set.pop(&mut store).unwrap(), Some(2));
        assert_eq!(set.pop(&mut store).unwrap(), None);
    }

    #[test]
    fn test_contains() {
        let mut store = MemStore::new();
        let set = FreeSet::create(&mut store).unwrap();
        set.insert(&mut store, 3).unwrap();

        assert!(set.contains(&store, 3).unwrap());
        assert!(!set.contains(&store, 4).unwrap());
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut store = MemStore::new();
        let set = FreeSet::create(&mut store).unwrap();
        set.insert(&mut store, 8).unwrap();
        assert!(set.insert(&mut store, 8).is_err());
    }
}
