//! Vector-store abstraction for the evidence cache.
//!
//! The [`VectorStore`] trait is the nearest-neighbour store the cache
//! writes page chunks into and reads similarity hits from. Backends:
//! [`memory::InMemoryStore`] here, SQLite and Qdrant in the app crate.
//!
//! Implementations must be `Send + Sync` and tolerate concurrent calls
//! from several in-flight requests; upserts are idempotent per chunk id.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`ensure_collection`](VectorStore::ensure_collection) | Create the collection with a fixed dimensionality |
//! | [`upsert`](VectorStore::upsert) | Insert or overwrite chunks by content address |
//! | [`find_by_url`](VectorStore::find_by_url) | Exact-match lookup by normalized URL |
//! | [`search`](VectorStore::search) | Cosine nearest-neighbour search |
//! | [`count`](VectorStore::count) | Number of stored chunks |

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CacheChunk, ScoredChunk};

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if absent. Fails if it exists with other dims.
    async fn ensure_collection(&self, dims: usize) -> Result<()>;

    /// Write all chunks in one batch, overwriting chunks with the same id.
    async fn upsert(&self, chunks: &[CacheChunk]) -> Result<()>;

    /// Up to `limit` stored chunks whose `url` equals `url`.
    async fn find_by_url(&self, url: &str, limit: usize) -> Result<Vec<CacheChunk>>;

    /// The `limit` chunks most similar to `query_vec`, best first.
    async fn search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<ScoredChunk>>;

    async fn count(&self) -> Result<u64>;
}
