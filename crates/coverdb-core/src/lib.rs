//! Embeddable cover-tree vector index over slot-addressed storage.
//!
//! `coverdb-core` stores fixed-dimension `f32` vectors with attached values
//! and answers k-nearest-neighbor queries through a cover tree: a leveled
//! metric-space structure where level radii grow by a fixed base. All state
//! — key vectors, encoded values, tree nodes, free lists — lives in a
//! [`SlotStore`] arena, so the same index runs in memory ([`MemStore`]) or
//! persisted to a file ([`FileStore`]) without code changes.
//!
//! # Quick start
//!
//! ```
//! use coverdb_core::{EuclideanSquared, MemStore, VecDb};
//!
//! let mut db: VecDb<String, EuclideanSquared, MemStore, 2> =
//!     VecDb::open(MemStore::new())?;
//!
//! let a = db.insert(&[0.0, 0.0], &"a".to_string())?;
//! db.insert(&[3.0, 4.0], &"b".to_string())?;
//!
//! let nearest = db.knn(&[1.0, 0.0], 1)?.next().unwrap();
//! assert_eq!(nearest.id(), a);
//!
//! db.get_by_id_mut(a)?.remove()?;
//! assert_eq!(db.len()?, 0);
//! # Ok::<(), coverdb_core::Error>(())
//! ```
//!
//! # Design
//!
//! Two id spaces exist side by side: element ids address `(key, value)`
//! pairs in parallel growable arrays, node indices address cover-tree nodes
//! in their own arena. Both are backed by free lists, so removal never
//! shifts survivors and freed ids are reused by later inserts. `NO_PARENT`
//! sentinels replace null pointers throughout.
//!
//! The index is single-writer and does no internal locking; concurrency
//! control belongs to the embedding storage engine.

#![warn(missing_docs)]

pub mod db;
pub mod distance;
pub mod element;
mod elements;
pub mod error;
pub mod params;
pub mod query;
pub mod storage;
mod tree;

pub use db::VecDb;
pub use distance::{Distance, EuclideanSquared};
pub use element::{Element, ElementMut};
pub use error::{Error, Result};
pub use params::{TreeParams, DEFAULT_BASE};
pub use query::{ElementIter, Knn};
pub use storage::{FileStore, MemStore, SlotId, SlotStore};
pub use tree::NodeSnapshot;
