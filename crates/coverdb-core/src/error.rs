//! Error types for the cover-tree index.

use thiserror::Error;

/// Convenience alias for results produced by this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by index and storage operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested element id is freed or was never allocated.
    #[error("no element with id {0}")]
    NotFound(u32),

    /// A key vector did not match the index dimension.
    #[error("key has {got} components, index stores {expected}")]
    DimensionMismatch {
        /// Dimension the index was instantiated with.
        expected: usize,
        /// Dimension of the rejected key.
        got: usize,
    },

    /// The slot store rejected or failed an access.
    #[error("storage: {0}")]
    Storage(String),

    /// Value or header bytes could not be encoded or decoded.
    #[error("codec: {0}")]
    Codec(String),

    /// An I/O failure from a file-backed slot store.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Builds a [`Error::Storage`] for an out-of-bounds slot access.
    pub(crate) fn slot_bounds(slot: u32, offset: usize, len: usize, capacity: usize) -> Self {
        Self::Storage(format!(
            "slot {slot}: access {offset}..{} exceeds capacity {capacity}",
            offset + len
        ))
    }

    /// Builds a [`Error::Storage`] for an unknown slot id.
    pub(crate) fn no_such_slot(slot: u32) -> Self {
        Self::Storage(format!("slot {slot} is not allocated"))
    }
}
