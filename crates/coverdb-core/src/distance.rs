//! Distance computation for cover-tree maintenance and queries.
//!
//! The tree never assumes a specific formula; it only compares distances.
//! Any metric whose pairwise and batch forms agree on ordering can be
//! plugged in without touching tree logic.

/// Trait for pluggable distance functions.
pub trait Distance {
    /// Computes the distance between two vectors.
    fn distance(&self, a: &[f32], b: &[f32]) -> f32;

    /// Batch distance computation (one query vs many candidates).
    ///
    /// Returns distances in the same order as `candidates`. The ordering must
    /// be consistent with [`Distance::distance`]; the default implementation
    /// guarantees this by delegating to it. Used by verification and test
    /// code, not by the tree algorithms.
    fn batch(&self, candidates: &[&[f32]], query: &[f32]) -> Vec<f32> {
        candidates.iter().map(|c| self.distance(c, query)).collect()
    }
}

/// Squared Euclidean distance, the reference metric.
///
/// Skipping the square root preserves ordering and keeps level computation
/// cheap; all persisted level radii are expressed in squared units.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EuclideanSquared;

impl Distance for EuclideanSquared {
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| {
                let d = x - y;
                d * d
            })
            .sum()
    }
}
