//! Borrowed handles to stored elements.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::db::VecDb;
use crate::distance::Distance;
use crate::error::Result;
use crate::storage::SlotStore;

/// Read-only handle to one live element.
///
/// Handles returned by [`VecDb::knn`] carry the distance from the query
/// point; handles from lookups and iteration do not.
pub struct Element<'a, V, D, S, const DIM: usize> {
    db: &'a VecDb<V, D, S, DIM>,
    id: u32,
    distance: Option<f32>,
}

impl<'a, V, D, S, const DIM: usize> Element<'a, V, D, S, DIM>
where
    D: Distance,
    S: SlotStore,
{
    pub(crate) fn new(db: &'a VecDb<V, D, S, DIM>, id: u32, distance: Option<f32>) -> Self {
        Self { db, id, distance }
    }

    /// Stable id of this element.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Distance from the query point, when this handle came from a query.
    #[must_use]
    pub fn distance(&self) -> Option<f32> {
        self.distance
    }

    /// Reads the element's key vector.
    pub fn key(&self) -> Result<[f32; DIM]> {
        self.db.read_key(self.id)
    }

    /// Decodes the element's value.
    pub fn value(&self) -> Result<V>
    where
        V: DeserializeOwned,
    {
        self.db.read_value(self.id)
    }
}

/// Mutable handle to one live element.
pub struct ElementMut<'a, V, D, S, const DIM: usize> {
    db: &'a mut VecDb<V, D, S, DIM>,
    id: u32,
}

impl<'a, V, D, S, const DIM: usize> ElementMut<'a, V, D, S, DIM>
where
    D: Distance,
    S: SlotStore,
{
    pub(crate) fn new(db: &'a mut VecDb<V, D, S, DIM>, id: u32) -> Self {
        Self { db, id }
    }

    /// Stable id of this element.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Reads the element's key vector.
    pub fn key(&self) -> Result<[f32; DIM]> {
        self.db.read_key(self.id)
    }

    /// Decodes the element's value.
    pub fn value(&self) -> Result<V>
    where
        V: DeserializeOwned,
    {
        self.db.read_value(self.id)
    }

    /// Replaces the element's value.
    pub fn set_value(&mut self, value: &V) -> Result<()>
    where
        V: Serialize,
    {
        self.db.set_value(self.id, value)
    }

    /// Removes the element from the index, consuming the handle.
    ///
    /// Taking `self` by value makes removing through a stale handle a
    /// compile error rather than a free-list corruption.
    pub fn remove(self) -> Result<()> {
        self.db.remove(self.id)
    }
}
