//! # Vector DB (content + metadata + dense-vector retrieval)
//!
//! Composition of the [`DocumentStore`](crate::document_store::DocumentStore)
//! and the [`VectorIndex`](crate::vector_index::VectorIndex) behind one
//! insert/retrieve surface. One `VectorDb` instance backs one partition
//! (facts or summaries).
//!
//! ## Insert
//!
//! `insert(content, metadata, doc_id?)` assigns a UUID `doc_id` when the
//! caller supplies none, embeds the content, writes the record to the
//! document store (obtaining the internal row id), then indexes the vector
//! under that id. If indexing fails the document row is deleted again, so an
//! inconsistent pair never survives the call.
//!
//! ## Retrieve
//!
//! `retrieve(query, k, fetch_k, filters)` searches the index (over-fetching
//! `fetch_k` when a metadata filter will discard neighbors), converts L2
//! distances to similarities with **min-max normalization within the
//! returned batch** followed by `1 - norm`, fetches the surviving records,
//! and returns them in index-ranking order truncated to `k`. A batch whose
//! distances are all equal normalizes to similarity `0.0` across the board.

use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::document_store::{DocumentStore, MetadataFilter};
use crate::embedding::EmbeddingProvider;
use crate::error::MemoryError;
use crate::models::Document;
use crate::vector_index::VectorIndex;

/// One scored retrieval hit.
#[derive(Debug, Clone)]
pub struct Retrieved {
    /// Similarity in `[0, 1]`, higher is more similar.
    pub similarity: f32,
    /// The matching document row.
    pub doc: Document,
}

/// Convert a batch of L2 distances to similarity scores.
///
/// Min-max normalization within the batch, then `1 - norm`, so the nearest
/// neighbor of the batch scores highest. When every distance is equal the
/// whole batch scores `0.0`.
pub fn l2_to_similarity(distances: &[f32]) -> Vec<f32> {
    if distances.is_empty() {
        return Vec::new();
    }
    let min = distances.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = distances.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    if max <= min {
        return vec![0.0; distances.len()];
    }
    distances
        .iter()
        .map(|d| 1.0 - (d - min) / (max - min))
        .collect()
}

/// Vector database over one partition.
pub struct VectorDb {
    documents: DocumentStore,
    index: VectorIndex,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl VectorDb {
    pub fn new(
        documents: DocumentStore,
        index: VectorIndex,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            documents,
            index,
            embedder,
        }
    }

    /// Direct access to the underlying document store.
    ///
    /// The coordinator uses this for doc-id lookups and in-place summary
    /// rewrites that bypass the embedding path.
    pub fn documents(&mut self) -> &mut DocumentStore {
        &mut self.documents
    }

    /// Insert one record, embed it, and index the vector.
    ///
    /// # Parameters
    /// - `content`: Text to store and embed.
    /// - `metadata`: Partition metadata, serialized into the JSON column.
    /// - `doc_id`: External id; a fresh UUID v4 when `None`.
    ///
    /// # Returns
    /// The internal row id the vector was indexed under.
    ///
    /// # Errors
    /// Embedding exhaustion, storage failures, and dimension mismatches all
    /// propagate. When the index insert fails after the document row was
    /// written, the row is deleted before the error is returned.
    pub async fn insert(
        &mut self,
        content: &str,
        metadata: &serde_json::Value,
        doc_id: Option<&str>,
    ) -> Result<i32, MemoryError> {
        let doc_id = doc_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let vector = self.embedder.embed(content).await?;
        let internal_id = self.documents.insert(&doc_id, content, metadata)?;

        if let Err(e) = self.index.insert(&vector, internal_id as usize) {
            // Roll the record back so document and index stay in agreement.
            self.documents.delete_by_internal_id(internal_id)?;
            return Err(e);
        }
        Ok(internal_id)
    }

    /// Retrieve up to `k` records ranked by similarity to `query`.
    ///
    /// With a metadata filter, `fetch_k` neighbors are pulled from the index
    /// before filtering so that discarded neighbors do not starve the result.
    /// Neighbors whose record was deleted or filtered out are dropped; the
    /// index ranking order of the survivors is preserved.
    pub async fn retrieve(
        &mut self,
        query: &str,
        k: usize,
        fetch_k: usize,
        metadata_filters: Option<&MetadataFilter>,
    ) -> Result<Vec<Retrieved>, MemoryError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed(query).await?;

        let has_filters = metadata_filters.map(|f| !f.is_empty()).unwrap_or(false);
        let fetch = if has_filters { fetch_k.max(k) } else { k };
        let (distances, ids) = self.index.search(&vector, fetch)?;

        // Valid neighbors form a prefix; missing slots are -1.
        let valid: Vec<i32> = ids
            .iter()
            .take_while(|id| **id >= 0)
            .map(|id| *id as i32)
            .collect();
        if valid.is_empty() {
            return Ok(Vec::new());
        }
        let similarities = l2_to_similarity(&distances[..valid.len()]);
        debug!(
            neighbors = valid.len(),
            filtered = has_filters,
            "vector retrieval"
        );

        let empty = MetadataFilter::new();
        let filters = metadata_filters.unwrap_or(&empty);
        let fetched = self.documents.get_documents(filters, Some(&valid))?;
        if fetched.is_empty() {
            return Ok(Vec::new());
        }

        let mut by_id: std::collections::HashMap<i32, Document> =
            fetched.into_iter().map(|d| (d.id, d)).collect();

        let mut results = Vec::new();
        for (pos, internal_id) in valid.iter().enumerate() {
            let Some(doc) = by_id.remove(internal_id) else {
                continue;
            };
            results.push(Retrieved {
                similarity: similarities[pos],
                doc,
            });
            if results.len() >= k {
                break;
            }
        }
        Ok(results)
    }

    /// Remove a record by internal id.
    ///
    /// The indexed vector is left behind as a tombstone; retrieval never
    /// surfaces it because the record lookup fails.
    pub fn delete(&mut self, internal_id: i32) -> Result<(), MemoryError> {
        self.documents.delete_by_internal_id(internal_id)?;
        Ok(())
    }
}
