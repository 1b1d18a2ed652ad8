//! SQLite-backed [`VectorStore`].
//!
//! Chunks live in `cache_chunks` keyed by `(collection, id)`, with the
//! embedding stored as a little-endian f32 BLOB. Similarity search is
//! brute-force cosine over the collection, which is fine for a local
//! cache of a few thousand pages.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use evidence_harness_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use evidence_harness_core::models::{CacheChunk, ScoredChunk};
use evidence_harness_core::store::VectorStore;

pub struct SqliteStore {
    pool: SqlitePool,
    collection: String,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, collection: impl Into<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_chunk(row: &SqliteRow) -> CacheChunk {
    let blob: Vec<u8> = row.get("embedding");
    let fetched_ms: i64 = row.get("fetched_at");
    let chunk_index: i64 = row.get("chunk_index");
    let start: i64 = row.get("start_offset");
    let end: i64 = row.get("end_offset");
    CacheChunk {
        id: row.get("id"),
        vector: blob_to_vec(&blob),
        url: row.get("url"),
        title: row.get("title"),
        site: row.get("site"),
        chunk_index: chunk_index as usize,
        start_offset: start as usize,
        end_offset: end as usize,
        text: row.get("text"),
        fetched_at: DateTime::<Utc>::from_timestamp_millis(fetched_ms).unwrap_or_default(),
    }
}

const CHUNK_COLUMNS: &str =
    "id, url, title, site, chunk_index, start_offset, end_offset, text, fetched_at, embedding";

#[async_trait]
impl VectorStore for SqliteStore {
    async fn ensure_collection(&self, dims: usize) -> Result<()> {
        let existing: Option<i64> =
            sqlx::query_scalar("SELECT dims FROM cache_collections WHERE name = ?")
                .bind(&self.collection)
                .fetch_optional(&self.pool)
                .await?;

        match existing {
            Some(d) if d as usize != dims => bail!(
                "collection '{}' has {} dims, embedding model produces {}",
                self.collection,
                d,
                dims
            ),
            Some(_) => Ok(()),
            None => {
                sqlx::query(
                    "INSERT INTO cache_collections (name, dims, created_at) VALUES (?, ?, ?)
                     ON CONFLICT(name) DO NOTHING",
                )
                .bind(&self.collection)
                .bind(dims as i64)
                .bind(Utc::now().timestamp())
                .execute(&self.pool)
                .await?;
                tracing::info!(collection = %self.collection, dims, "created cache collection");
                Ok(())
            }
        }
    }

    async fn upsert(&self, chunks: &[CacheChunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let dims: Option<i64> =
            sqlx::query_scalar("SELECT dims FROM cache_collections WHERE name = ?")
                .bind(&self.collection)
                .fetch_optional(&mut *tx)
                .await?;
        if let Some(dims) = dims {
            if let Some(bad) = chunks.iter().find(|c| c.vector.len() as i64 != dims) {
                bail!(
                    "chunk {} has {} dims, collection '{}' expects {}",
                    bad.id,
                    bad.vector.len(),
                    self.collection,
                    dims
                );
            }
        }
        for c in chunks {
            sqlx::query(
                r#"
                INSERT INTO cache_chunks (collection, id, url, title, site, chunk_index,
                                          start_offset, end_offset, text, fetched_at, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    url = excluded.url,
                    title = excluded.title,
                    site = excluded.site,
                    chunk_index = excluded.chunk_index,
                    start_offset = excluded.start_offset,
                    end_offset = excluded.end_offset,
                    text = excluded.text,
                    fetched_at = excluded.fetched_at,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&self.collection)
            .bind(&c.id)
            .bind(&c.url)
            .bind(&c.title)
            .bind(&c.site)
            .bind(c.chunk_index as i64)
            .bind(c.start_offset as i64)
            .bind(c.end_offset as i64)
            .bind(&c.text)
            .bind(c.fetched_at.timestamp_millis())
            .bind(vec_to_blob(&c.vector))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find_by_url(&self, url: &str, limit: usize) -> Result<Vec<CacheChunk>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM cache_chunks WHERE collection = ? AND url = ?
             ORDER BY chunk_index LIMIT ?",
            CHUNK_COLUMNS
        ))
        .bind(&self.collection)
        .bind(url)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_chunk).collect())
    }

    async fn search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<ScoredChunk>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM cache_chunks WHERE collection = ?",
            CHUNK_COLUMNS
        ))
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<ScoredChunk> = rows
            .iter()
            .map(|row| {
                let chunk = row_to_chunk(row);
                ScoredChunk {
                    score: cosine_similarity(query_vec, &chunk.vector) as f64,
                    chunk,
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn count(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cache_chunks WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }
}
