//! Query result iterators.

use crate::db::VecDb;
use crate::distance::Distance;
use crate::element::Element;
use crate::storage::SlotStore;

/// Nearest-neighbor results, closest first.
///
/// Produced by [`VecDb::knn`]; each yielded [`Element`] carries its distance
/// from the query point.
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Knn<'a, V, D, S, const DIM: usize> {
    db: &'a VecDb<V, D, S, DIM>,
    hits: std::vec::IntoIter<(f32, u32)>,
}

impl<'a, V, D, S, const DIM: usize> Knn<'a, V, D, S, DIM> {
    pub(crate) fn new(db: &'a VecDb<V, D, S, DIM>, hits: Vec<(f32, u32)>) -> Self {
        Self {
            db,
            hits: hits.into_iter(),
        }
    }
}

impl<'a, V, D, S, const DIM: usize> Iterator for Knn<'a, V, D, S, DIM>
where
    D: Distance,
    S: SlotStore,
{
    type Item = Element<'a, V, D, S, DIM>;

    fn next(&mut self) -> Option<Self::Item> {
        let (distance, id) = self.hits.next()?;
        Some(Element::new(self.db, id, Some(distance)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.hits.size_hint()
    }
}

impl<V, D, S, const DIM: usize> ExactSizeIterator for Knn<'_, V, D, S, DIM>
where
    D: Distance,
    S: SlotStore,
{
}

/// Iterator over all live elements in id order.
///
/// Produced by [`VecDb::iter`].
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct ElementIter<'a, V, D, S, const DIM: usize> {
    db: &'a VecDb<V, D, S, DIM>,
    ids: std::vec::IntoIter<u32>,
}

impl<'a, V, D, S, const DIM: usize> ElementIter<'a, V, D, S, DIM> {
    pub(crate) fn new(db: &'a VecDb<V, D, S, DIM>, ids: Vec<u32>) -> Self {
        Self {
            db,
            ids: ids.into_iter(),
        }
    }
}

impl<'a, V, D, S, const DIM: usize> Iterator for ElementIter<'a, V, D, S, DIM>
where
    D: Distance,
    S: SlotStore,
{
    type Item = Element<'a, V, D, S, DIM>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.ids.next()?;
        Some(Element::new(self.db, id, None))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ids.size_hint()
    }
}

impl<V, D, S, const DIM: usize> ExactSizeIterator for ElementIter<'_, V, D, S, DIM>
where
    D: Distance,
    S: SlotStore,
{
}
