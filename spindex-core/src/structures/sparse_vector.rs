//! Sparse vector value type
//!
//! A sparse vector is a sequence of `(dimension, weight)` entries with
//! strictly increasing dimensions and strictly positive finite weights.
//! The ordering invariant is what makes merge-style dot products and
//! posting-list construction linear.

use std::cmp::Ordering;

use crate::DimId;

/// A sparse vector entry: (dimension_id, weight)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SparseEntry {
    pub dim_id: DimId,
    pub weight: f32,
}

/// Reason a vector fails the sparse vector invariants
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VectorViolation {
    #[error("dimensions not strictly increasing at position {position}: {prev} then {dim}")]
    Unordered {
        position: usize,
        prev: DimId,
        dim: DimId,
    },

    #[error("duplicate dimension {0}")]
    Duplicate(DimId),

    #[error("weight for dimension {dim} must be finite and > 0, got {weight}")]
    InvalidWeight { dim: DimId, weight: f32 },

    #[error("{dims} dimensions but {weights} weights")]
    LengthMismatch { dims: usize, weights: usize },
}

/// Sparse vector representation
///
/// Built unchecked through `From<Vec<(u32, f32)>>` (queries are validated by
/// the query engine) or checked through [`SparseVector::try_from_pairs`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    entries: Vec<SparseEntry>,
}

impl SparseVector {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Build from `(dimension, weight)` pairs, rejecting anything that
    /// violates the ordering or weight invariants.
    pub fn try_from_pairs(pairs: Vec<(DimId, f32)>) -> Result<Self, VectorViolation> {
        let vector = Self::from(pairs);
        vector.validate()?;
        Ok(vector)
    }

    /// Build from parallel dimension / weight slices (checked)
    pub fn from_entries(dim_ids: &[DimId], weights: &[f32]) -> Result<Self, VectorViolation> {
        if dim_ids.len() != weights.len() {
            return Err(VectorViolation::LengthMismatch {
                dims: dim_ids.len(),
                weights: weights.len(),
            });
        }
        let entries = dim_ids
            .iter()
            .zip(weights)
            .map(|(&dim_id, &weight)| SparseEntry { dim_id, weight })
            .collect();
        let vector = Self { entries };
        vector.validate()?;
        Ok(vector)
    }

    /// Check the ordering, uniqueness and weight invariants
    pub fn validate(&self) -> Result<(), VectorViolation> {
        for (position, pair) in self.entries.windows(2).enumerate() {
            match pair[0].dim_id.cmp(&pair[1].dim_id) {
                Ordering::Less => {}
                Ordering::Equal => return Err(VectorViolation::Duplicate(pair[1].dim_id)),
                Ordering::Greater => {
                    return Err(VectorViolation::Unordered {
                        position: position + 1,
                        prev: pair[0].dim_id,
                        dim: pair[1].dim_id,
                    });
                }
            }
        }
        if let Some(bad) = self
            .entries
            .iter()
            .find(|e| !(e.weight.is_finite() && e.weight > 0.0))
        {
            return Err(VectorViolation::InvalidWeight {
                dim: bad.dim_id,
                weight: bad.weight,
            });
        }
        Ok(())
    }

    /// Number of non-zero entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SparseEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[SparseEntry] {
        &self.entries
    }

    /// Weight stored for `dim_id`, if present
    pub fn weight(&self, dim_id: DimId) -> Option<f32> {
        self.entries
            .binary_search_by_key(&dim_id, |e| e.dim_id)
            .ok()
            .map(|i| self.entries[i].weight)
    }

    /// Compute dot product with another sparse vector
    pub fn dot(&self, other: &SparseVector) -> f32 {
        self.overlap_dot(other).unwrap_or(0.0)
    }

    /// Dot product, or `None` when the two vectors share no dimension.
    ///
    /// Contributions are accumulated in increasing dimension order, which is
    /// the order every index backend uses too, so scores are bit-identical
    /// across backends.
    pub fn overlap_dot(&self, other: &SparseVector) -> Option<f32> {
        let mut result = 0.0f32;
        let mut matched = false;
        let mut i = 0;
        let mut j = 0;

        while i < self.entries.len() && j < other.entries.len() {
            let a = &self.entries[i];
            let b = &other.entries[j];

            match a.dim_id.cmp(&b.dim_id) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    result += a.weight * b.weight;
                    matched = true;
                    i += 1;
                    j += 1;
                }
            }
        }

        matched.then_some(result)
    }
}

impl From<Vec<(DimId, f32)>> for SparseVector {
    fn from(pairs: Vec<(DimId, f32)>) -> Self {
        Self {
            entries: pairs
                .into_iter()
                .map(|(dim_id, weight)| SparseEntry { dim_id, weight })
                .collect(),
        }
    }
}

impl From<SparseVector> for Vec<(DimId, f32)> {
    fn from(vec: SparseVector) -> Self {
        vec.entries
            .into_iter()
            .map(|e| (e.dim_id, e.weight))
            .collect()
    }
}
