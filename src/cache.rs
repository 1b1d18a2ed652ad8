//! Vector cache: freshness-gated page caching and similarity lookup.
//!
//! [`VectorCache`] ties a [`VectorStore`] to an [`EmbeddingProvider`].
//! Pages are chunked, embedded in batches and upserted under their
//! content address, so re-caching a page with the same chunk boundaries
//! overwrites in place. A page whose newest stored chunk is still within
//! the TTL is skipped entirely.
//!
//! Backend and embedder faults surface as [`RetrievalError::CacheWrite`]
//! or [`RetrievalError::CacheRead`]; the pipeline logs them and carries on.
//! Each embedding call is bounded by [`CacheSettings::embed_timeout`], so a
//! hung embedding server costs a request at most that long per call.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};

use evidence_harness_core::chunk::{chunk_key, chunk_text, ChunkParams};
use evidence_harness_core::freshness::is_within_ttl;
use evidence_harness_core::models::{CacheChunk, ScoredChunk, Source, SourceId, SourceStatus};
use evidence_harness_core::store::memory::InMemoryStore;
use evidence_harness_core::store::VectorStore;
use evidence_harness_core::RetrievalError;

use crate::config::{CacheBackend, CacheConfig, Config};
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::extract::truncate_chars;
use crate::sqlite_store::SqliteStore;
use crate::{db, migrate};

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub ttl_days: i64,
    pub chunk: ChunkParams,
    pub batch_size: usize,
    pub snippet_chars: usize,
    /// Limit per embedding call; `None` waits as long as the provider does.
    pub embed_timeout: Option<Duration>,
}

impl CacheSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ttl_days: config.cache.ttl_days,
            chunk: config.cache.chunk_params(),
            batch_size: config.embedding.batch_size.max(1),
            snippet_chars: config.cache.snippet_chars,
            embed_timeout: Some(Duration::from_millis(config.cache.embed_timeout_ms)),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_days: 7,
            chunk: ChunkParams::default(),
            batch_size: 16,
            snippet_chars: 280,
            embed_timeout: Some(Duration::from_secs(5)),
        }
    }
}

/// What [`VectorCache::cache_page`] did with a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// A chunk for the URL is within the TTL; nothing written.
    Fresh,
    /// This many chunks were embedded and upserted.
    Upserted(usize),
    /// The text produced no chunk long enough to keep.
    NoChunks,
}

#[derive(Clone)]
pub struct VectorCache {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    settings: CacheSettings,
}

impl VectorCache {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            store,
            embedder,
            settings,
        }
    }

    /// Build the configured cache, or `None` when caching or embeddings
    /// are disabled. Creates the collection if needed.
    pub async fn from_config(config: &Config) -> Result<Option<Self>> {
        if !config.cache.enabled {
            return Ok(None);
        }
        let Some(embedder) = create_provider(&config.embedding)? else {
            tracing::info!("embedding provider disabled, vector cache off");
            return Ok(None);
        };
        let store = open_store(&config.cache).await?;
        let cache = Self::new(store, embedder, CacheSettings::from_config(config));
        cache.ensure().await?;
        Ok(Some(cache))
    }

    /// Replace the per-call embedding limit. Batch jobs such as ingest
    /// pass `None`.
    pub fn with_embed_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.settings.embed_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    /// Create the collection with the embedder's dimensionality.
    pub async fn ensure(&self) -> Result<(), RetrievalError> {
        self.store
            .ensure_collection(self.embedder.dims())
            .await
            .map_err(|e| RetrievalError::CacheWrite(format!("{:#}", e)))
    }

    /// True when a stored chunk for `url_norm` is younger than the TTL.
    pub async fn is_fresh(&self, url_norm: &str, now: DateTime<Utc>) -> Result<bool, RetrievalError> {
        let existing = self
            .store
            .find_by_url(url_norm, 1)
            .await
            .map_err(|e| RetrievalError::CacheRead(format!("{:#}", e)))?;
        Ok(existing
            .first()
            .is_some_and(|c| is_within_ttl(c.fetched_at, now, self.settings.ttl_days)))
    }

    /// Chunk, embed and upsert one page unless it is still fresh.
    pub async fn cache_page(
        &self,
        url_norm: &str,
        text: &str,
        title: &str,
        site: &str,
        fetched_at: DateTime<Utc>,
    ) -> Result<CacheOutcome, RetrievalError> {
        if self.is_fresh(url_norm, Utc::now()).await? {
            tracing::debug!(url = %url_norm, "cache fresh, skipping upsert");
            return Ok(CacheOutcome::Fresh);
        }

        let pieces = chunk_text(text, &self.settings.chunk);
        if pieces.is_empty() {
            return Ok(CacheOutcome::NoChunks);
        }

        let texts: Vec<String> = pieces.iter().map(|p| p.text.clone()).collect();
        let vectors = self.embed_batched(&texts).await?;
        if vectors.len() != pieces.len() {
            return Err(RetrievalError::CacheWrite(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                pieces.len()
            )));
        }

        let chunks: Vec<CacheChunk> = pieces
            .into_iter()
            .zip(vectors)
            .map(|(piece, vector)| CacheChunk {
                id: chunk_key(url_norm, piece.chunk_index, piece.start, piece.end),
                vector,
                url: url_norm.to_string(),
                title: title.to_string(),
                site: site.to_string(),
                chunk_index: piece.chunk_index,
                start_offset: piece.start,
                end_offset: piece.end,
                text: piece.text,
                fetched_at,
            })
            .collect();

        self.store
            .upsert(&chunks)
            .await
            .map_err(|e| RetrievalError::CacheWrite(format!("{:#}", e)))?;
        tracing::debug!(url = %url_norm, chunks = chunks.len(), "cached page");
        Ok(CacheOutcome::Upserted(chunks.len()))
    }

    async fn embed_batched(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.settings.batch_size.max(1)) {
            let embedded = self
                .embed_bounded(batch)
                .await
                .map_err(|e| RetrievalError::CacheWrite(format!("embedding failed: {:#}", e)))?;
            vectors.extend(embedded);
        }
        Ok(vectors)
    }

    async fn embed_bounded(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let Some(limit) = self.settings.embed_timeout else {
            return self.embedder.embed(texts).await;
        };
        match tokio::time::timeout(limit, self.embedder.embed(texts)).await {
            Ok(result) => result,
            Err(_) => anyhow::bail!("embedding timed out after {:?}", limit),
        }
    }

    /// Raw nearest-neighbour hits for `query`.
    pub async fn search_chunks(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>, RetrievalError> {
        if k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let query_vec = self
            .embed_bounded(&[query.to_string()])
            .await
            .and_then(|v| v.into_iter().next().ok_or_else(|| anyhow::anyhow!("empty embedding response")))
            .map_err(|e| RetrievalError::CacheRead(format!("embedding failed: {:#}", e)))?;
        self.store
            .search(&query_vec, k)
            .await
            .map_err(|e| RetrievalError::CacheRead(format!("{:#}", e)))
    }

    /// Similarity hits for `query` as cache-sourced [`Source`] records
    /// with ids `V1, V2, ...`.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<Source>, RetrievalError> {
        let hits = self.search_chunks(query, k).await?;
        let mut sources: Vec<Source> = hits.into_iter().map(|hit| self.to_source(hit)).collect();
        number_cached(&mut sources);
        Ok(sources)
    }

    fn to_source(&self, hit: ScoredChunk) -> Source {
        let chunk = hit.chunk;
        Source {
            id: SourceId::Cached(String::new()),
            title: chunk.title,
            snippet: truncate_chars(&chunk.text, self.settings.snippet_chars),
            domain: chunk.site,
            url: chunk.url,
            source_query: None,
            search_engine: None,
            author: None,
            publish_date: None,
            description: None,
            fetch_timestamp: Some(chunk.fetched_at),
            content_type: None,
            word_count: Some(chunk.text.split_whitespace().count()),
            character_count: chunk.text.chars().count(),
            status: SourceStatus::FromVectorCache,
            score: Some(hit.score),
            text: chunk.text,
            vector: Some(chunk.vector),
        }
    }
}

/// Assign `V1, V2, ...` in list order. Called again after filtering so
/// surviving cache hits are numbered without gaps.
pub fn number_cached(sources: &mut [Source]) {
    for (i, source) in sources.iter_mut().enumerate() {
        source.id = SourceId::Cached(format!("V{}", i + 1));
    }
}

/// Open the configured vector store backend.
pub async fn open_store(config: &CacheConfig) -> Result<Arc<dyn VectorStore>> {
    match config.backend {
        CacheBackend::Memory => Ok(Arc::new(InMemoryStore::new())),
        CacheBackend::Sqlite => {
            let pool = db::connect(&config.path).await?;
            migrate::run_migrations(&pool).await?;
            Ok(Arc::new(SqliteStore::new(pool, config.collection.clone())))
        }
        #[cfg(feature = "qdrant")]
        CacheBackend::Qdrant => Ok(Arc::new(crate::qdrant_store::QdrantStore::connect(
            &config.qdrant_url(),
            config.collection.clone(),
        )?)),
        #[cfg(not(feature = "qdrant"))]
        CacheBackend::Qdrant => anyhow::bail!(
            "cache.backend = \"qdrant\" requires the 'qdrant' feature: \
             cargo build --features qdrant"
        ),
    }
}
