//! The vector index aggregate tying storage, elements, and the tree together.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::distance::Distance;
use crate::element::{Element, ElementMut};
use crate::elements::ElementStore;
use crate::error::{Error, Result};
use crate::params::TreeParams;
use crate::query::{ElementIter, Knn};
use crate::storage::{Record, SlotId, SlotStore};
use crate::tree::{CoverTree, NodeSnapshot};

/// Slot reserved for the index header. The store must be dedicated to one
/// index; the first allocation is assumed to yield this slot.
const HEADER_SLOT: SlotId = 0;

/// `"CVDB"` in little-endian byte order.
const MAGIC: u32 = 0x4244_5643;

/// Fixed-size header persisted in slot 0.
///
/// Carries the tree's scalar state plus the slots of the five structural
/// arrays, so a reopened index can reattach without scanning.
#[derive(Debug, Clone, Copy)]
struct HeaderRecord {
    magic: u32,
    dim: u32,
    root_idx: u32,
    max_level: u32,
    base: f64,
    keys_slot: SlotId,
    values_slot: SlotId,
    free_ids_slot: SlotId,
    nodes_slot: SlotId,
    free_nodes_slot: SlotId,
}

impl Record for HeaderRecord {
    const SIZE: usize = 44;

    fn encode(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.magic.to_le_bytes());
        out[4..8].copy_from_slice(&self.dim.to_le_bytes());
        out[8..12].copy_from_slice(&self.root_idx.to_le_bytes());
        out[12..16].copy_from_slice(&self.max_level.to_le_bytes());
        out[16..24].copy_from_slice(&self.base.to_le_bytes());
        out[24..28].copy_from_slice(&self.keys_slot.to_le_bytes());
        out[28..32].copy_from_slice(&self.values_slot.to_le_bytes());
        out[32..36].copy_from_slice(&self.free_ids_slot.to_le_bytes());
        out[36..40].copy_from_slice(&self.nodes_slot.to_le_bytes());
        out[40..44].copy_from_slice(&self.free_nodes_slot.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            magic: u32::decode(&buf[0..4]),
            dim: u32::decode(&buf[4..8]),
            root_idx: u32::decode(&buf[8..12]),
            max_level: u32::decode(&buf[12..16]),
            base: f64::from_le_bytes([
                buf[16], buf[17], buf[18], buf[19], buf[20], buf[21], buf[22], buf[23],
            ]),
            keys_slot: u32::decode(&buf[24..28]),
            values_slot: u32::decode(&buf[28..32]),
            free_ids_slot: u32::decode(&buf[32..36]),
            nodes_slot: u32::decode(&buf[36..40]),
            free_nodes_slot: u32::decode(&buf[40..44]),
        }
    }
}

/// Structural state, created lazily on first mutation.
struct Structures<const DIM: usize> {
    elements: ElementStore<DIM>,
    tree: CoverTree,
}

/// A persistent nearest-neighbor vector index.
///
/// Stores `(key, value)` pairs where the key is a fixed-dimension `f32`
/// vector and the value is any `serde`-encodable payload. Keys are indexed
/// in a cover tree for metric queries; every pair is addressable by a stable
/// `u32` id. All state lives in a [`SlotStore`], so an index over a
/// [`FileStore`] survives process restarts.
///
/// Ids are reused: removing an element frees its id for the next insert.
/// Vector keys may repeat; ids never do while live.
///
/// ```
/// use coverdb_core::{EuclideanSquared, MemStore, VecDb};
///
/// let mut db: VecDb<String, EuclideanSquared, MemStore, 3> =
///     VecDb::open(MemStore::new())?;
/// db.insert(&[0.0, 0.0, 0.0], &"origin".to_string())?;
/// db.insert(&[1.0, 0.0, 0.0], &"x".to_string())?;
///
/// let nearest: Vec<String> = db
///     .knn(&[0.1, 0.0, 0.0], 1)?
///     .map(|e| e.value())
///     .collect::<coverdb_core::Result<_>>()?;
/// assert_eq!(nearest, ["origin"]);
/// # Ok::<(), coverdb_core::Error>(())
/// ```
///
/// [`FileStore`]: crate::storage::FileStore
pub struct VecDb<V, D, S, const DIM: usize> {
    store: S,
    dist: D,
    params: TreeParams,
    inner: Option<Structures<DIM>>,
    _marker: PhantomData<fn() -> V>,
}

impl<V, D, S, const DIM: usize> VecDb<V, D, S, DIM>
where
    D: Distance,
    S: SlotStore,
{
    /// Opens an index over `store` with default parameters.
    ///
    /// A store that already holds an index is reattached; an empty store is
    /// initialized lazily on first use. The store must be dedicated to this
    /// index.
    pub fn open(store: S) -> Result<Self>
    where
        D: Default,
    {
        Self::with_params(store, D::default(), TreeParams::default())
    }

    /// Opens an index with an explicit metric and tree parameters.
    ///
    /// When the store already holds an index, the persisted parameters win
    /// over `params`.
    pub fn with_params(store: S, dist: D, params: TreeParams) -> Result<Self> {
        let mut db = Self {
            store,
            dist,
            params,
            inner: None,
            _marker: PhantomData,
        };
        if db.store.contains(HEADER_SLOT) {
            let header = db.read_header()?;
            if header.magic != MAGIC {
                return Err(Error::Codec("store does not hold a vector index".into()));
            }
            let expected = dim_u32::<DIM>()?;
            if header.dim != expected {
                return Err(Error::DimensionMismatch {
                    expected: DIM,
                    got: header.dim as usize,
                });
            }
            db.inner = Some(Structures {
                elements: ElementStore::open(
                    header.keys_slot,
                    header.values_slot,
                    header.free_ids_slot,
                ),
                tree: CoverTree::open(
                    header.nodes_slot,
                    header.free_nodes_slot,
                    header.root_idx,
                    header.max_level,
                    header.base,
                ),
            });
            debug!(dim = DIM, max_level = header.max_level, "index reattached");
        }
        Ok(db)
    }

    /// Number of live elements.
    pub fn len(&self) -> Result<usize> {
        match &self.inner {
            None => Ok(0),
            Some(inner) => inner.elements.len(&self.store),
        }
    }

    /// Whether the index holds no elements.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Tree growth base in effect.
    #[must_use]
    pub fn base(&self) -> f64 {
        match &self.inner {
            None => self.params.base,
            Some(inner) => inner.tree.base(),
        }
    }

    /// Current maximum tree level.
    #[must_use]
    pub fn max_level(&self) -> u32 {
        self.inner.as_ref().map_or(0, |inner| inner.tree.max_level())
    }

    /// Borrows the underlying store, e.g. to flush a file-backed one.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Inserts a `(key, value)` pair and returns its id.
    ///
    /// The key length must equal `DIM`; a mismatch fails before anything is
    /// written. Freed ids are reused before the arrays grow.
    pub fn insert(&mut self, key: &[f32], value: &V) -> Result<u32>
    where
        V: Serialize,
    {
        if key.len() != DIM {
            return Err(Error::DimensionMismatch {
                expected: DIM,
                got: key.len(),
            });
        }
        let mut fixed = [0.0f32; DIM];
        fixed.copy_from_slice(key);

        self.ensure_initialized()?;
        let Self {
            store, dist, inner, ..
        } = self;
        let Some(Structures { elements, tree }) = inner.as_mut() else {
            return Err(Error::Storage("index state missing after init".into()));
        };

        let id = elements.insert(store, &fixed, value)?;

        // Nearest live neighbor by full scan. O(n) distance computations;
        // the insertion level derives from this distance.
        let mut nearest: Option<f32> = None;
        for other in 0..elements.slot_count(store)? {
            if other == id || elements.is_free(store, other)? {
                continue;
            }
            let d = dist.distance(&fixed, &elements.key(store, other)?);
            if d.is_finite() && nearest.map_or(true, |n| d < n) {
                nearest = Some(d);
            }
        }

        let mut dist_fn = |st: &S, a: u32, b: u32| -> Result<f32> {
            Ok(dist.distance(&elements.key(st, a)?, &elements.key(st, b)?))
        };
        tree.insert(store, id, nearest, &mut dist_fn)?;

        self.write_header()?;
        Ok(id)
    }

    /// Looks up a live element by id.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the id was never assigned or has been
    /// removed.
    pub fn get_by_id(&self, id: u32) -> Result<Element<'_, V, D, S, DIM>> {
        match self.get_by_id_or_none(id)? {
            Some(element) => Ok(element),
            None => Err(Error::NotFound(id)),
        }
    }

    /// Looks up an element by id, `None` for freed or unknown ids.
    pub fn get_by_id_or_none(&self, id: u32) -> Result<Option<Element<'_, V, D, S, DIM>>> {
        let Some(inner) = &self.inner else {
            return Ok(None);
        };
        if inner.elements.is_free(&self.store, id)? {
            return Ok(None);
        }
        Ok(Some(Element::new(self, id, None)))
    }

    /// Looks up a live element by id for mutation.
    pub fn get_by_id_mut(&mut self, id: u32) -> Result<ElementMut<'_, V, D, S, DIM>> {
        let Some(inner) = &self.inner else {
            return Err(Error::NotFound(id));
        };
        if inner.elements.is_free(&self.store, id)? {
            return Err(Error::NotFound(id));
        }
        Ok(ElementMut::new(self, id))
    }

    /// Removes the element with `id`, freeing its id for reuse.
    pub fn remove(&mut self, id: u32) -> Result<()> {
        let Self { store, inner, .. } = self;
        let Some(Structures { elements, tree }) = inner.as_mut() else {
            return Err(Error::NotFound(id));
        };
        if elements.is_free(store, id)? {
            return Err(Error::NotFound(id));
        }

        tree.remove(store, id)?;
        elements.free(store, id)?;
        self.write_header()
    }

    /// Replaces the value of a live element.
    pub fn set_value(&mut self, id: u32, value: &V) -> Result<()>
    where
        V: Serialize,
    {
        let Self { store, inner, .. } = self;
        let Some(inner) = inner.as_mut() else {
            return Err(Error::NotFound(id));
        };
        inner.elements.set_value(store, id, value)
    }

    /// Finds the `k` nearest elements to `point`, closest first.
    ///
    /// The whole tree is traversed and sorted by distance; candidates with a
    /// non-finite distance are discarded rather than failing the query.
    /// `k == 0` and an empty index both yield an empty result.
    pub fn knn(&self, point: &[f32], k: usize) -> Result<Knn<'_, V, D, S, DIM>> {
        if point.len() != DIM {
            return Err(Error::DimensionMismatch {
                expected: DIM,
                got: point.len(),
            });
        }
        let Some(inner) = &self.inner else {
            return Ok(Knn::new(self, Vec::new()));
        };
        if k == 0 || inner.tree.is_empty() {
            return Ok(Knn::new(self, Vec::new()));
        }

        let mut candidates = Vec::new();
        for element_id in inner.tree.live_elements(&self.store)? {
            if inner.elements.is_free(&self.store, element_id)? {
                continue;
            }
            let d = self
                .dist
                .distance(&inner.elements.key(&self.store, element_id)?, point);
            if d.is_finite() {
                candidates.push((d, element_id));
            }
        }
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0));
        candidates.truncate(k);
        Ok(Knn::new(self, candidates))
    }

    /// Iterates over all live elements in id order.
    pub fn iter(&self) -> Result<ElementIter<'_, V, D, S, DIM>> {
        let Some(inner) = &self.inner else {
            return Ok(ElementIter::new(self, Vec::new()));
        };
        let mut ids = Vec::new();
        for id in 0..inner.elements.slot_count(&self.store)? {
            if !inner.elements.is_free(&self.store, id)? {
                ids.push(id);
            }
        }
        Ok(ElementIter::new(self, ids))
    }

    /// Structural view of the tree's live nodes, for diagnostics.
    pub fn level_snapshot(&self) -> Result<Vec<NodeSnapshot>> {
        match &self.inner {
            None => Ok(Vec::new()),
            Some(inner) => inner.tree.snapshot(&self.store),
        }
    }

    pub(crate) fn read_key(&self, id: u32) -> Result<[f32; DIM]> {
        let Some(inner) = &self.inner else {
            return Err(Error::NotFound(id));
        };
        inner.elements.key(&self.store, id)
    }

    pub(crate) fn read_value(&self, id: u32) -> Result<V>
    where
        V: DeserializeOwned,
    {
        let Some(inner) = &self.inner else {
            return Err(Error::NotFound(id));
        };
        inner.elements.value(&self.store, id)
    }

    /// Creates the header and structural arrays on first use. Idempotent.
    fn ensure_initialized(&mut self) -> Result<()> {
        if self.inner.is_some() {
            return Ok(());
        }
        let header_slot = self.store.alloc(HeaderRecord::SIZE)?;
        if header_slot != HEADER_SLOT {
            return Err(Error::Storage(format!(
                "store is not empty: header landed in slot {header_slot}"
            )));
        }
        let elements = ElementStore::create(&mut self.store)?;
        let tree = CoverTree::create(&mut self.store, self.params.base)?;
        self.inner = Some(Structures { elements, tree });
        self.write_header()?;
        debug!(dim = DIM, base = self.params.base, "index initialized");
        Ok(())
    }

    fn read_header(&self) -> Result<HeaderRecord> {
        let buf = self.store.read_vec(HEADER_SLOT, 0, HeaderRecord::SIZE)?;
        Ok(HeaderRecord::decode(&buf))
    }

    fn write_header(&mut self) -> Result<()> {
        let Some(inner) = &self.inner else {
            return Ok(());
        };
        let header = HeaderRecord {
            magic: MAGIC,
            dim: dim_u32::<DIM>()?,
            root_idx: inner.tree.root_idx(),
            max_level: inner.tree.max_level(),
            base: inner.tree.base(),
            keys_slot: inner.elements.keys_slot(),
            values_slot: inner.elements.values_slot(),
            free_ids_slot: inner.elements.free_slot(),
            nodes_slot: inner.tree.nodes_slot(),
            free_nodes_slot: inner.tree.free_slot(),
        };
        let mut buf = [0u8; HeaderRecord::SIZE];
        header.encode(&mut buf);
        self.store.write(HEADER_SLOT, 0, &buf)
    }
}

fn dim_u32<const DIM: usize>() -> Result<u32> {
    u32::try_from(DIM).map_err(|_| Error::Storage(format!("dimension {DIM} out of range")))
}
