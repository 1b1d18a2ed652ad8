//! In-memory [`VectorStore`] for tests and ephemeral runs.
//!
//! Chunks live in a `HashMap` keyed by content address behind
//! `std::sync::RwLock`. Search is brute-force cosine similarity.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{CacheChunk, ScoredChunk};

use super::VectorStore;

/// In-memory vector store.
pub struct InMemoryStore {
    dims: RwLock<Option<usize>>,
    chunks: RwLock<HashMap<String, CacheChunk>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            dims: RwLock::new(None),
            chunks: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn ensure_collection(&self, dims: usize) -> Result<()> {
        let mut current = self.dims.write().map_err(poisoned)?;
        match *current {
            Some(existing) if existing != dims => {
                bail!("collection has {} dims, requested {}", existing, dims)
            }
            Some(_) => Ok(()),
            None => {
                *current = Some(dims);
                Ok(())
            }
        }
    }

    async fn upsert(&self, chunks: &[CacheChunk]) -> Result<()> {
        let dims = *self.dims.read().map_err(poisoned)?;
        if let Some(dims) = dims {
            if let Some(bad) = chunks.iter().find(|c| c.vector.len() != dims) {
                bail!(
                    "chunk {} has {} dims, collection expects {}",
                    bad.id,
                    bad.vector.len(),
                    dims
                );
            }
        }
        let mut stored = self.chunks.write().map_err(poisoned)?;
        for c in chunks {
            stored.insert(c.id.clone(), c.clone());
        }
        Ok(())
    }

    async fn find_by_url(&self, url: &str, limit: usize) -> Result<Vec<CacheChunk>> {
        let stored = self.chunks.read().map_err(poisoned)?;
        let mut found: Vec<CacheChunk> = stored.values().filter(|c| c.url == url).cloned().collect();
        found.sort_by_key(|c| c.chunk_index);
        found.truncate(limit);
        Ok(found)
    }

    async fn search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<ScoredChunk>> {
        let stored = self.chunks.read().map_err(poisoned)?;
        let mut scored: Vec<ScoredChunk> = stored
            .values()
            .map(|c| ScoredChunk {
                score: cosine_similarity(query_vec, &c.vector) as f64,
                chunk: c.clone(),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.chunks.read().map_err(poisoned)?.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn chunk(id: &str, url: &str, index: usize, vector: Vec<f32>) -> CacheChunk {
        CacheChunk {
            id: id.to_string(),
            vector,
            url: url.to_string(),
            title: "t".into(),
            site: "example.com".into(),
            chunk_index: index,
            start_offset: 0,
            end_offset: 10,
            text: "text".into(),
            fetched_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_overwrites_same_id() {
        let store = InMemoryStore::new();
        store.ensure_collection(2).await.unwrap();
        store
            .upsert(&[chunk("u|0|0|10", "u", 0, vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .upsert(&[chunk("u|0|0|10", "u", 0, vec![0.0, 1.0])])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        let found = store.find_by_url("u", 1).await.unwrap();
        assert_eq!(found[0].vector, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let store = InMemoryStore::new();
        store.ensure_collection(2).await.unwrap();
        store
            .upsert(&[
                chunk("a", "ua", 0, vec![1.0, 0.0]),
                chunk("b", "ub", 0, vec![0.7, 0.7]),
                chunk("c", "uc", 0, vec![0.0, 1.0]),
            ])
            .await
            .unwrap();
        let hits = store.search(&[1.0, 0.1], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.id, "a");
        assert_eq!(hits[1].chunk.id, "b");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let store = InMemoryStore::new();
        store.ensure_collection(3).await.unwrap();
        assert!(store.ensure_collection(4).await.is_err());
        assert!(store
            .upsert(&[chunk("a", "u", 0, vec![1.0])])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_find_by_url_filters_exactly() {
        let store = InMemoryStore::new();
        store
            .upsert(&[
                chunk("x|0", "https://x.com", 0, vec![1.0]),
                chunk("x|1", "https://x.com", 1, vec![1.0]),
                chunk("y|0", "https://x.com/y", 0, vec![1.0]),
            ])
            .await
            .unwrap();
        assert_eq!(store.find_by_url("https://x.com", 10).await.unwrap().len(), 2);
        assert_eq!(store.find_by_url("https://x.com", 1).await.unwrap().len(), 1);
        assert!(store.find_by_url("https://z.com", 1).await.unwrap().is_empty());
    }
}
