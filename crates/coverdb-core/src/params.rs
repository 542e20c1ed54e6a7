//! Cover-tree tuning parameters.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default growth base for tree levels.
pub const DEFAULT_BASE: f64 = 1.3;

/// Cover-tree parameters.
///
/// The `base` controls how level radii grow: nodes at level `L` are kept at
/// least `base^L` apart, and a node at level `L` is covered by a node at
/// level `L + 1` within `base^(L + 1)`. The base is fixed when the index is
/// first created and persisted with it; parameters passed when reopening an
/// existing index are ignored in favor of the stored value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    /// Growth base for level radii. Must be greater than 1.
    pub base: f64,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self { base: DEFAULT_BASE }
    }
}

impl TreeParams {
    /// Creates parameters with a custom base.
    ///
    /// # Errors
    ///
    /// Returns an error if `base` is not a finite value greater than 1.
    pub fn new(base: f64) -> Result<Self> {
        if !base.is_finite() || base <= 1.0 {
            return Err(Error::Storage(format!(
                "tree base must be finite and > 1, got {base}"
            )));
        }
        Ok(Self { base })
    }
}
