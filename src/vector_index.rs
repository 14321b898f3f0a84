//! # Vector Index (id-mapped L2 nearest-neighbor search)
//!
//! Fixed-dimension dense-vector index built on HNSW (Hierarchical Navigable
//! Small World) graphs from the `hora` crate. The index is **id-mapped**: the
//! ids handed to [`VectorIndex::insert`] are exactly the ids
//! [`VectorIndex::search`] returns, so callers can use document-store row ids
//! directly instead of tracking positional offsets.
//!
//! ## Persistence
//!
//! The index is dumped to its configured path after every insert, which makes
//! a crash lose at most the insert in flight. Opening an existing file
//! reconstructs the whole index without re-embedding anything.
//!
//! ## Search contract
//!
//! `search(query, k)` returns parallel `(distances, ids)` vectors of length
//! `k`. When fewer than `k` neighbors exist, the remaining slots carry the id
//! `-1` and an infinite distance. Distances are raw Euclidean (L2); the
//! vector DB layer converts them to similarities.

use hora::core::ann_index::{ANNIndex, SerializableIndex};
use hora::core::metrics::Metric;
use hora::index::hnsw_idx::HNSWIndex;
use hora::index::hnsw_params::HNSWParams;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::MemoryError;

/// Id-mapped HNSW index with eager file persistence.
pub struct VectorIndex {
    index: HNSWIndex<f32, usize>,
    dimension: usize,
    path: PathBuf,
    /// True until the first insert of a freshly created (not loaded) index.
    /// Searching an HNSW graph with no nodes is undefined, so we answer
    /// empty-handed ourselves.
    empty: bool,
}

impl VectorIndex {
    /// Open the index at `path`, loading a previous dump when one exists.
    ///
    /// # Parameters
    /// - `dimension`: Vector dimensionality; inserts and searches with any
    ///   other length are rejected.
    /// - `path`: Where the index is dumped after each insert.
    ///
    /// # Errors
    /// Fails when an existing dump cannot be deserialized.
    pub fn open(dimension: usize, path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let path = path.as_ref().to_path_buf();
        let path_str = path.to_string_lossy().to_string();

        let (index, empty) = if path.exists() {
            let index = HNSWIndex::<f32, usize>::load(&path_str)
                .map_err(|e| MemoryError::Index(e.to_string()))?;
            debug!(path = %path.display(), "vector index loaded");
            (index, false)
        } else {
            (
                HNSWIndex::<f32, usize>::new(dimension, &HNSWParams::<f32>::default()),
                true,
            )
        };

        Ok(Self {
            index,
            dimension,
            path,
            empty,
        })
    }

    /// Dimensionality this index was opened with.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Insert a vector under a caller-chosen id, rebuild, and persist.
    ///
    /// # Errors
    /// - [`MemoryError::Dimension`] when `vector.len() != dimension`.
    /// - [`MemoryError::Index`] when the HNSW insert or rebuild fails.
    /// - I/O errors from [`VectorIndex::persist`].
    pub fn insert(&mut self, vector: &[f32], internal_id: usize) -> Result<(), MemoryError> {
        if vector.len() != self.dimension {
            return Err(MemoryError::Dimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        self.index
            .add(vector, internal_id)
            .map_err(|e| MemoryError::Index(e.to_string()))?;
        self.index
            .build(Metric::Euclidean)
            .map_err(|e| MemoryError::Index(e.to_string()))?;
        self.empty = false;
        self.persist()?;
        Ok(())
    }

    /// Return up to `k` nearest neighbors of `query` by Euclidean distance.
    ///
    /// Both returned vectors have length `k`; missing slots carry id `-1`
    /// and `f32::INFINITY` distance. Valid entries always form a prefix,
    /// ordered best-first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<(Vec<f32>, Vec<i64>), MemoryError> {
        if query.len() != self.dimension {
            return Err(MemoryError::Dimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut distances = vec![f32::INFINITY; k];
        let mut ids = vec![-1i64; k];
        if k == 0 || self.empty {
            return Ok((distances, ids));
        }

        for (slot, (node, distance)) in self.index.search_nodes(query, k).into_iter().enumerate() {
            if let Some(id) = node.idx() {
                distances[slot] = distance;
                ids[slot] = *id as i64;
            }
        }
        Ok((distances, ids))
    }

    /// Dump the index to its configured path.
    ///
    /// Called by [`VectorIndex::insert`] after every successful insert, so
    /// explicit calls are only needed by callers that batch.
    pub fn persist(&mut self) -> Result<(), MemoryError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let path_str = self.path.to_string_lossy().to_string();
        self.index
            .dump(&path_str)
            .map_err(|e| MemoryError::Index(e.to_string()))?;
        Ok(())
    }
}
