//! Element storage: (key vector, value) pairs addressed by stable ids.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::storage::{DynArray, FreeSet, SlotId, SlotStore};

/// Parallel key/value arrays plus a free-id set.
///
/// An element id is its position in the arrays. Ids stay stable while the
/// element is live; removal pushes the id to the free set, and the next
/// insert reuses it with the old key and value fully replaced. Values are
/// variable-size, so each one lives behind an indirection: the values array
/// stores the id of a per-value slot holding its `postcard` bytes.
pub(crate) struct ElementStore<const DIM: usize> {
    keys: DynArray<[f32; DIM]>,
    values: DynArray<SlotId>,
    free_ids: FreeSet,
}

impl<const DIM: usize> ElementStore<DIM> {
    pub(crate) fn create<S: SlotStore>(store: &mut S) -> Result<Self> {
        Ok(Self {
            keys: DynArray::create(store)?,
            values: DynArray::create(store)?,
            free_ids: FreeSet::create(store)?,
        })
    }

    pub(crate) fn open(keys_slot: SlotId, values_slot: SlotId, free_slot: SlotId) -> Self {
        Self {
            keys: DynArray::open(keys_slot),
            values: DynArray::open(values_slot),
            free_ids: FreeSet::open(free_slot),
        }
    }

    pub(crate) fn keys_slot(&self) -> SlotId {
        self.keys.slot()
    }

    pub(crate) fn values_slot(&self) -> SlotId {
        self.values.slot()
    }

    pub(crate) fn free_slot(&self) -> SlotId {
        self.free_ids.slot()
    }

    /// Number of live elements.
    pub(crate) fn len<S: SlotStore>(&self, store: &S) -> Result<usize> {
        let total = self.keys.len(store)? as usize;
        let free = self.free_ids.len(store)? as usize;
        Ok(total - free)
    }

    /// Number of allocated element slots, live or freed.
    pub(crate) fn slot_count<S: SlotStore>(&self, store: &S) -> Result<u32> {
        self.keys.len(store)
    }

    /// Whether `id` refers to no live element.
    pub(crate) fn is_free<S: SlotStore>(&self, store: &S, id: u32) -> Result<bool> {
        if id >= self.keys.len(store)? {
            return Ok(true);
        }
        self.free_ids.contains(store, id)
    }

    /// Stores a key/value pair, reusing a freed id when one is available.
    ///
    /// Does not register the element in the tree; the aggregate does that.
    pub(crate) fn insert<S: SlotStore, V: Serialize>(
        &self,
        store: &mut S,
        key: &[f32; DIM],
        value: &V,
    ) -> Result<u32> {
        let value_slot = write_value(store, value)?;
        if let Some(id) = self.free_ids.pop(store)? {
            self.keys.set(store, id, key)?;
            self.values.set(store, id, &value_slot)?;
            Ok(id)
        } else {
            let id = self.keys.push(store, key)?;
            self.values.push(store, &value_slot)?;
            Ok(id)
        }
    }

    /// Reads the key of a live element.
    pub(crate) fn key<S: SlotStore>(&self, store: &S, id: u32) -> Result<[f32; DIM]> {
        if self.is_free(store, id)? {
            return Err(Error::NotFound(id));
        }
        self.keys.get(store, id)
    }

    /// Decodes the value of a live element.
    pub(crate) fn value<S: SlotStore, V: DeserializeOwned>(
        &self,
        store: &S,
        id: u32,
    ) -> Result<V> {
        if self.is_free(store, id)? {
            return Err(Error::NotFound(id));
        }
        let slot = self.values.get(store, id)?;
        let bytes = store.read_vec(slot, 0, store.len(slot)?)?;
        postcard::from_bytes(&bytes).map_err(|e| Error::Codec(e.to_string()))
    }

    /// Replaces the value of a live element in place.
    pub(crate) fn set_value<S: SlotStore, V: Serialize>(
        &self,
        store: &mut S,
        id: u32,
        value: &V,
    ) -> Result<()> {
        if self.is_free(&*store, id)? {
            return Err(Error::NotFound(id));
        }
        let old_slot = self.values.get(&*store, id)?;
        store.release(old_slot)?;
        let new_slot = write_value(store, value)?;
        self.values.set(store, id, &new_slot)
    }

    /// Frees a live element's id and its value slot.
    pub(crate) fn free<S: SlotStore>(&self, store: &mut S, id: u32) -> Result<()> {
        if self.is_free(&*store, id)? {
            return Err(Error::NotFound(id));
        }
        let value_slot = self.values.get(&*store, id)?;
        store.release(value_slot)?;
        self.free_ids.insert(store, id)
    }
}

fn write_value<S: SlotStore, V: Serialize>(store: &mut S, value: &V) -> Result<SlotId> {
    let bytes = postcard::to_allocvec(value).map_err(|e| Error::Codec(e.to_string()))?;
    let slot = store.alloc(bytes.len())?;
    store.write(slot, 0, &bytes)?;
    Ok(slot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemStore;

    fn setup() -> (MemStore, ElementStore<3>) {
        let mut store = MemStore::new();
        let elements = ElementStore::create(&mut store).unwrap();
        (store, elements)
    }

    #[test]
    fn test_insert_and_read_back() {
        let (mut store, elements) = setup();
        let id = elements
            .insert(&mut store, &[1.0, 2.0, 3.0], &"hello".to_string())
            .unwrap();

        assert_eq!(elements.key(&store, id).unwrap(), [1.0, 2.0, 3.0]);
        let value: String = elements.value(&store, id).unwrap();
        assert_eq!(value, "hello");
        assert_eq!(elements.len(&store).unwrap(), 1);
    }

    #[test]
    fn test_freed_id_answers_not_found() {
        let (mut store, elements) = setup();
        let id = elements
            .insert(&mut store, &[0.0; 3], &"x".to_string())
            .unwrap();
        elements.free(&mut store, id).unwrap();

        assert!(matches!(
            elements.key(&store, id),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            elements.value::<_, String>(&store, id),
            Err(Error::NotFound(_))
        ));
        assert_eq!(elements.len(&store).unwrap(), 0);
    }

    #[test]
    fn test_id_reuse_replaces_old_contents() {
        let (mut store, elements) = setup();
        let first = elements
            .insert(&mut store, &[1.0, 1.0, 1.0], &"old".to_string())
            .unwrap();
        elements.free(&mut store, first).unwrap();

        let second = elements
            .insert(&mut store, &[9.0, 9.0, 9.0], &"new".to_string())
            .unwrap();
        assert_eq!(second, first);
        assert_eq!(elements.key(&store, second).unwrap(), [9.0, 9.0, 9.0]);
        let value: String = elements.value(&store, second).unwrap();
        assert_eq!(value, "new");
    }

    #[test]
    fn test_set_value_in_place() {
        let (mut store, elements) = setup();
        let id = elements
            .insert(&mut store, &[0.0; 3], &"short".to_string())
            .unwrap();

        // Longer payload forces a new indirection slot.
        elements
            .set_value(&mut store, id, &"a considerably longer value".to_string())
            .unwrap();
        let value: String = elements.value(&store, id).unwrap();
        assert_eq!(value, "a considerably longer value");
    }

    #[test]
    fn test_double_free_rejected() {
        let (mut store, elements) = setup();
        let id = elements
            .insert(&mut store, &[0.0; 3], &1u32)
            .unwrap();
        elements.free(&mut store, id).unwrap();
        assert!(elements.free(&mut store, id).is_err());
    }

    #[test]
    fn test_out_of_range_id_is_free() {
        let (store, elements) = setup();
        assert!(elements.is_free(&store, 1000).unwrap());
    }
}
