//! Embedding provider trait and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that all embedding backends
//! implement, plus pure helper functions for vector serialization and
//! similarity computation.
//!
//! Concrete provider implementations (Ollama, OpenAI, fastembed) live in
//! the `evidence-harness` app crate.

use anyhow::Result;
use async_trait::async_trait;

/// Trait for embedding providers.
///
/// Implementations must return exactly one vector per input text, each of
/// [`dims`](EmbeddingProvider::dims) length. Repeated encodes of the same
/// text should yield near-identical vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"bge-m3"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1024`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Pack a chunk embedding into the bytes stored in the cache's
/// `embedding` column, four little-endian bytes per component.
///
/// ```rust
/// use evidence_harness_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let embedding = [0.25f32, -4.0, 1.5];
/// let column = vec_to_blob(&embedding);
/// assert_eq!(column.len(), 3 * std::mem::size_of::<f32>());
/// assert_eq!(blob_to_vec(&column), embedding);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|component| component.to_le_bytes()).collect()
}

/// Unpack an `embedding` column written by [`vec_to_blob`]. A trailing
/// partial component is dropped.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .filter_map(|word| word.try_into().ok().map(f32::from_le_bytes))
        .collect()
}

/// Cosine of the angle between a query embedding and a cached one.
///
/// Cache search ranks by this score and near-duplicate detection compares
/// it against a threshold. Mismatched lengths, empty input and zero-norm
/// vectors score `0.0` so they never rank or collide. The result is
/// clamped to `[-1.0, 1.0]` to absorb rounding.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (dot, sq_a, sq_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, sq_a, sq_b), (x, y)| {
            (dot + x * y, sq_a + x * x, sq_b + y * y)
        });

    let norms = (sq_a * sq_b).sqrt();
    if norms < f32::EPSILON {
        0.0
    } else {
        (dot / norms).clamp(-1.0, 1.0)
    }
}
