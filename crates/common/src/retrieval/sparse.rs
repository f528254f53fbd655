//! Sparse (keyword-weighted) query vectors
//!
//! Term-frequency vectors over a hashed vocabulary. IDF weighting is left to
//! the store (Qdrant applies it when the sparse vector uses the `idf` modifier).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sparse vector with sorted, unique indices
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Dot product of two sparse vectors
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }
}

/// Trait for sparse text encoders
pub trait SparseEncoder: Send + Sync {
    fn encode(&self, text: &str) -> SparseVector;
}

/// Hashing term-frequency encoder
#[derive(Debug, Clone)]
pub struct HashingSparseEncoder {
    /// Number of hash buckets (vocabulary size)
    buckets: u32,
}

impl Default for HashingSparseEncoder {
    fn default() -> Self {
        Self { buckets: 1 << 20 }
    }
}

impl HashingSparseEncoder {
    pub fn new(buckets: u32) -> Self {
        Self {
            buckets: buckets.max(1),
        }
    }

    /// Lowercase alphanumeric tokens longer than one character
    fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() > 1)
            .map(|w| w.to_lowercase())
    }

    fn bucket(&self, token: &str) -> u32 {
        // FNV-1a
        let hash = token.bytes().fold(0x811c_9dc5_u32, |hash, byte| {
            (hash ^ byte as u32).wrapping_mul(0x0100_0193)
        });
        hash % self.buckets
    }
}

impl SparseEncoder for HashingSparseEncoder {
    fn encode(&self, text: &str) -> SparseVector {
        let mut counts: BTreeMap<u32, u32> = BTreeMap::new();
        for token in Self::tokenize(text) {
            *counts.entry(self.bucket(&token)).or_default() += 1;
        }

        let (indices, values) = counts
            .into_iter()
            .map(|(index, tf)| (index, 1.0 + (tf as f32).ln()))
            .unzip();

        SparseVector { indices, values }
    }
}
