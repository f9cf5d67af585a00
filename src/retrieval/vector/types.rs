use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Error types for vector store operations.
#[derive(Debug, thiserror::Error)]
pub enum VectorError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("dimension mismatch: store holds {expected}-dimensional vectors, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Source article metadata carried with every chunk record, denormalized for
/// retrieval-time display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub title: String,
    pub source_url: String,
    /// Hash of the parent article body at indexing time; the reprocessing
    /// trigger compares against it.
    pub content_hash: String,
}

/// A single chunk record to be stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorItem {
    pub id: String,
    pub article_id: String,
    pub position: usize,
    pub text: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// One nearest-neighbor query result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryMatch {
    pub chunk_id: String,
    pub article_id: String,
    pub position: usize,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Cosine similarity against the query vector, in [-1, 1].
    pub score: f32,
}

/// Abstract interface for the persisted chunk store.
///
/// All access to the store goes through this trait — there is no ambient
/// global state. The store enforces chunk id uniqueness via upsert semantics
/// and keeps one fixed vector dimensionality for its lifetime.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert-or-replace records keyed by chunk id. Idempotent: repeated
    /// calls with identical arguments leave the store unchanged.
    async fn upsert(&self, items: Vec<VectorItem>) -> Result<(), VectorError>;

    /// Atomically replace every chunk of an article: old chunks are deleted
    /// and the new set inserted in one transaction, so a concurrent reader
    /// sees either the fully-old or fully-new state, never a mix.
    async fn replace_article(
        &self,
        article_id: &str,
        items: Vec<VectorItem>,
    ) -> Result<(), VectorError>;

    /// Remove all chunks belonging to an article.
    async fn delete_by_article(&self, article_id: &str) -> Result<(), VectorError>;

    /// Top-k nearest neighbors by cosine similarity, descending. Length is
    /// at most `top_k`; an empty store yields an empty sequence. Fails with
    /// `InvalidQuery` for `top_k == 0` and `DimensionMismatch` when the
    /// query vector does not match the store's dimensionality.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<QueryMatch>, VectorError>;

    /// Content hash recorded for an article, if any of its chunks are stored.
    async fn article_content_hash(
        &self,
        article_id: &str,
    ) -> Result<Option<String>, VectorError>;

    /// Number of stored chunk records.
    async fn count(&self) -> Result<u64, VectorError>;

    /// Vector dimensionality the store is committed to, if populated.
    async fn dimension(&self) -> Result<Option<usize>, VectorError>;

    /// Flush and release the underlying resources.
    async fn close(&self);
}

/// Cosine similarity between two equal-length vectors; 0.0 when either has
/// zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.3, -0.5, 0.8];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_opposite_vectors_is_minus_one() {
        assert!((cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_magnitude_yields_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }
}
