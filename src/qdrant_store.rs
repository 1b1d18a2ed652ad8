//! Qdrant-backed [`VectorStore`], enabled with the `qdrant` feature.
//!
//! Each chunk becomes one point. The point id is the v5 UUID of the
//! chunk key (Qdrant only accepts integers or UUIDs); the key itself is
//! kept in the payload under `key` so chunks round-trip with their
//! original id. A keyword index on `url` backs the freshness lookup.

use std::collections::HashMap;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfig;
use qdrant_client::qdrant::vectors_output::VectorsOptions;
use qdrant_client::qdrant::with_payload_selector::SelectorOptions;
use qdrant_client::qdrant::with_vectors_selector::SelectorOptions as VectorsSelectorOptions;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
    Distance, FieldType, Filter, PointStruct, ScrollPointsBuilder, SearchPointsBuilder,
    UpsertPointsBuilder, Value, VectorParamsBuilder, VectorsOutput,
};
use qdrant_client::Qdrant;

use evidence_harness_core::chunk::chunk_point_id;
use evidence_harness_core::models::{CacheChunk, ScoredChunk};
use evidence_harness_core::store::VectorStore;

pub struct QdrantStore {
    client: Qdrant,
    collection: String,
}

impl QdrantStore {
    pub fn connect(url: &str, collection: impl Into<String>) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .build()
            .with_context(|| format!("connecting to Qdrant at {}", url))?;
        tracing::debug!(url = %url, "connected to Qdrant");
        Ok(Self {
            client,
            collection: collection.into(),
        })
    }

    async fn collection_dims(&self) -> Result<Option<u64>> {
        let info = self.client.collection_info(&self.collection).await?;
        let dims = info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config)
            .and_then(|c| match c {
                VectorsConfig::Params(params) => Some(params.size),
                VectorsConfig::ParamsMap(_) => None,
            });
        Ok(dims)
    }
}

fn chunk_payload(chunk: &CacheChunk) -> HashMap<String, Value> {
    let mut payload = HashMap::new();
    payload.insert("key".to_string(), Value::from(chunk.id.clone()));
    payload.insert("url".to_string(), Value::from(chunk.url.clone()));
    payload.insert("title".to_string(), Value::from(chunk.title.clone()));
    payload.insert("site".to_string(), Value::from(chunk.site.clone()));
    payload.insert("chunk_index".to_string(), Value::from(chunk.chunk_index as i64));
    payload.insert("start_offset".to_string(), Value::from(chunk.start_offset as i64));
    payload.insert("end_offset".to_string(), Value::from(chunk.end_offset as i64));
    payload.insert("text".to_string(), Value::from(chunk.text.clone()));
    payload.insert(
        "fetched_at".to_string(),
        Value::from(chunk.fetched_at.to_rfc3339()),
    );
    payload
}

fn payload_str(payload: &HashMap<String, Value>, field: &str) -> String {
    match payload.get(field).and_then(|v| v.kind.as_ref()) {
        Some(Kind::StringValue(s)) => s.clone(),
        _ => String::new(),
    }
}

fn payload_usize(payload: &HashMap<String, Value>, field: &str) -> usize {
    match payload.get(field).and_then(|v| v.kind.as_ref()) {
        Some(Kind::IntegerValue(i)) => (*i).max(0) as usize,
        Some(Kind::DoubleValue(f)) => f.max(0.0) as usize,
        _ => 0,
    }
}

fn extract_vector(vectors: Option<VectorsOutput>) -> Vec<f32> {
    vectors
        .and_then(|v| match v.vectors_options {
            #[allow(deprecated)]
            Some(VectorsOptions::Vector(vec)) => Some(vec.data),
            _ => None,
        })
        .unwrap_or_default()
}

fn point_to_chunk(payload: HashMap<String, Value>, vectors: Option<VectorsOutput>) -> CacheChunk {
    let fetched_at = DateTime::parse_from_rfc3339(&payload_str(&payload, "fetched_at"))
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_default();
    CacheChunk {
        id: payload_str(&payload, "key"),
        vector: extract_vector(vectors),
        url: payload_str(&payload, "url"),
        title: payload_str(&payload, "title"),
        site: payload_str(&payload, "site"),
        chunk_index: payload_usize(&payload, "chunk_index"),
        start_offset: payload_usize(&payload, "start_offset"),
        end_offset: payload_usize(&payload, "end_offset"),
        text: payload_str(&payload, "text"),
        fetched_at,
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self, dims: usize) -> Result<()> {
        if self.client.collection_exists(&self.collection).await? {
            if let Some(existing) = self.collection_dims().await? {
                if existing as usize != dims {
                    bail!(
                        "collection '{}' has {} dims, embedding model produces {}",
                        self.collection,
                        existing,
                        dims
                    );
                }
            }
            return Ok(());
        }

        let vectors_config =
            VectorsConfig::Params(VectorParamsBuilder::new(dims as u64, Distance::Cosine).build());
        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection).vectors_config(vectors_config),
            )
            .await?;
        self.client
            .create_field_index(CreateFieldIndexCollectionBuilder::new(
                &self.collection,
                "url",
                FieldType::Keyword,
            ))
            .await?;

        tracing::info!(collection = %self.collection, dims, "created Qdrant collection");
        Ok(())
    }

    async fn upsert(&self, chunks: &[CacheChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let points: Vec<PointStruct> = chunks
            .iter()
            .map(|c| {
                PointStruct::new(
                    chunk_point_id(&c.id).to_string(),
                    c.vector.clone(),
                    chunk_payload(c),
                )
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await?;
        Ok(())
    }

    async fn find_by_url(&self, url: &str, limit: usize) -> Result<Vec<CacheChunk>> {
        let scroll = ScrollPointsBuilder::new(&self.collection)
            .filter(Filter::must([Condition::matches("url", url.to_string())]))
            .limit(limit as u32)
            .with_payload(SelectorOptions::Enable(true))
            .with_vectors(VectorsSelectorOptions::Enable(true));

        let response = self.client.scroll(scroll).await?;
        let mut chunks: Vec<CacheChunk> = response
            .result
            .into_iter()
            .map(|p| point_to_chunk(p.payload, p.vectors))
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    async fn search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<ScoredChunk>> {
        let search = SearchPointsBuilder::new(&self.collection, query_vec.to_vec(), limit as u64)
            .with_payload(SelectorOptions::Enable(true))
            .with_vectors(VectorsSelectorOptions::Enable(true));

        let response = self.client.search_points(search).await?;
        Ok(response
            .result
            .into_iter()
            .map(|p| ScoredChunk {
                score: p.score as f64,
                chunk: point_to_chunk(p.payload, p.vectors),
            })
            .collect())
    }

    async fn count(&self) -> Result<u64> {
        let response = self
            .client
            .count(CountPointsBuilder::new(&self.collection).exact(true))
            .await?;
        response
            .result
            .map(|r| r.count)
            .ok_or_else(|| anyhow!("Qdrant returned no count for '{}'", self.collection))
    }
}
