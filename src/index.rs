//! In-memory vector index over document chunks.
//!
//! The index is built once per upload batch and never mutated afterwards;
//! a new batch produces a new index. Search is brute-force cosine
//! similarity over every stored vector, which is plenty for a single SRS.

use tracing::{debug, info};

use crate::embedding::{cosine_similarity, embed_query, Embedder};
use crate::error::{PipelineError, PipelineResult};
use crate::models::{Chunk, ScoredChunk};

struct IndexEntry {
    vector: Vec<f32>,
    chunk: Chunk,
}

/// Immutable nearest-neighbour index of chunk embeddings.
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    dims: usize,
    model: String,
}

impl VectorIndex {
    /// Embeds `chunks` in batches of `batch_size` and builds the index.
    /// When `expected_dims` is set, every vector must have that length.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::NothingToIndex`] for an empty chunk list.
    /// - [`PipelineError::Embedding`] if the service fails, returns the
    ///   wrong number of vectors, or returns empty, mixed-dimension or
    ///   wrongly sized vectors.
    pub async fn build(
        chunks: Vec<Chunk>,
        embedder: &dyn Embedder,
        batch_size: usize,
        expected_dims: Option<usize>,
    ) -> PipelineResult<Self> {
        if chunks.is_empty() {
            return Err(PipelineError::NothingToIndex);
        }

        let batch_size = batch_size.max(1);
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let batch_vectors = embedder
                .embed(&texts)
                .await
                .map_err(PipelineError::embedding)?;
            if batch_vectors.len() != texts.len() {
                return Err(PipelineError::Embedding(format!(
                    "expected {} vectors, got {}",
                    texts.len(),
                    batch_vectors.len()
                )));
            }
            vectors.extend(batch_vectors);
        }

        let dims = vectors.first().map(Vec::len).unwrap_or(0);
        if let Some(expected) = expected_dims {
            if dims != expected {
                return Err(PipelineError::Embedding(format!(
                    "service returned {}-dimensional vectors, embedding.dims is {}",
                    dims, expected
                )));
            }
        }
        if dims == 0 {
            return Err(PipelineError::Embedding(
                "service returned empty vectors".to_string(),
            ));
        }
        if let Some(bad) = vectors.iter().position(|v| v.len() != dims) {
            return Err(PipelineError::Embedding(format!(
                "vector {} has {} dimensions, expected {}",
                bad,
                vectors[bad].len(),
                dims
            )));
        }

        let entries: Vec<IndexEntry> = vectors
            .into_iter()
            .zip(chunks)
            .map(|(vector, chunk)| IndexEntry { vector, chunk })
            .collect();

        info!(
            chunks = entries.len(),
            dims,
            model = embedder.model_name(),
            "vector index built"
        );

        Ok(Self {
            entries,
            dims,
            model: embedder.model_name().to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Top-`k` chunks by cosine similarity, highest first. Ties keep
    /// document order.
    pub fn search(&self, query_vec: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|entry| ScoredChunk {
                chunk: entry.chunk.clone(),
                score: cosine_similarity(query_vec, &entry.vector),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk.index.cmp(&b.chunk.index))
        });
        scored.truncate(k);
        scored
    }

    /// Embeds `query` and returns the top-`k` matching chunks.
    pub async fn retrieve(
        &self,
        query: &str,
        embedder: &dyn Embedder,
        k: usize,
    ) -> PipelineResult<Vec<ScoredChunk>> {
        let query_vec = embed_query(embedder, query)
            .await
            .map_err(PipelineError::embedding)?;
        if query_vec.len() != self.dims {
            return Err(PipelineError::Embedding(format!(
                "query vector has {} dimensions, index has {}",
                query_vec.len(),
                self.dims
            )));
        }
        let hits = self.search(&query_vec, k);
        debug!(
            k,
            hits = hits.len(),
            best = hits.first().map(|h| h.score).unwrap_or(0.0),
            "retrieved context"
        );
        Ok(hits)
    }
}
