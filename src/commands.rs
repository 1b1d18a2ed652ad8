//! CLI command implementations for `evh`.
//!
//! Each command prints one pretty JSON document to stdout; progress and
//! diagnostics go through `tracing` to stderr.

use anyhow::{bail, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::VectorCache;
use crate::config::Config;
use crate::fetch::{HttpFetcher, PageFetcher};
use crate::ingest::ingest_paths;
use crate::metasearch::{SearchBackend, SearxngClient};
use crate::pipeline::RetrievalContext;
use crate::traits::{SearchAndRetrieveTool, Tool, ToolContext};

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn require_cache(config: &Config) -> Result<VectorCache> {
    match VectorCache::from_config(config).await? {
        Some(cache) => Ok(cache),
        None => bail!("vector cache is disabled (cache.enabled = false or embedding.provider = \"disabled\")"),
    }
}

/// Build the tool payload for `evh retrieve`.
pub fn retrieve_payload(prompt: Option<String>, queries: Vec<String>, claim: Option<String>) -> Value {
    let mut payload = serde_json::Map::new();
    if let Some(prompt) = prompt {
        payload.insert("prompt".into(), Value::String(prompt));
    }
    if !queries.is_empty() {
        payload.insert("queries".into(), json!(queries));
    }
    if let Some(claim) = claim {
        payload.insert("claim".into(), Value::String(claim));
    }
    Value::Object(payload)
}

/// `evh init`: create (or verify) the cache collection.
pub async fn run_init(config: &Config) -> Result<()> {
    let cache = require_cache(config).await?;
    let chunks = cache.store().count().await?;
    print_json(&json!({
        "backend": config.cache.backend.to_string(),
        "collection": config.cache.collection,
        "model": cache.model_name(),
        "dims": config.embedding.dims,
        "chunks": chunks,
    }))
}

/// `evh retrieve`: run `search_and_retrieve` once.
pub async fn run_retrieve(config: &Config, payload: Value) -> Result<()> {
    let ctx = ToolContext::new(Arc::new(RetrievalContext::from_config(config).await?));
    let result = SearchAndRetrieveTool.execute(payload, &ctx).await?;
    print_json(&result)
}

/// `evh search`: raw metasearch hits for one query.
pub async fn run_search(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    let client = SearxngClient::new(config.search.clone())?;
    let hits = client
        .search(query, k.unwrap_or(config.retrieval.top_k))
        .await;
    print_json(&json!({ "query": query, "results": hits }))
}

/// `evh fetch`: fetch and extract one page.
pub async fn run_fetch(config: &Config, url: &str) -> Result<()> {
    let fetcher = HttpFetcher::new(&config.fetch, config.retrieval.per_page_chars)?;
    let page = fetcher.fetch(url).await?;
    print_json(&page)
}

/// `evh cache search`: similarity lookup without web traffic.
pub async fn run_cache_search(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    let cache = require_cache(config).await?;
    let limit = limit.unwrap_or_else(|| config.retrieval.cache_hits());
    let results = cache.search(query, limit).await?;
    print_json(&json!({ "query": query, "results": results }))
}

/// `evh cache stats`.
pub async fn run_cache_stats(config: &Config) -> Result<()> {
    let mut stats = json!({
        "enabled": false,
        "backend": config.cache.backend.to_string(),
        "collection": config.cache.collection,
        "ttl_days": config.cache.ttl_days,
    });
    if let Some(cache) = VectorCache::from_config(config).await? {
        stats["enabled"] = json!(true);
        stats["model"] = json!(cache.model_name());
        stats["chunks"] = json!(cache.store().count().await?);
    }
    print_json(&stats)
}

/// `evh ingest`: cache local files.
pub async fn run_ingest(config: &Config, paths: &[PathBuf]) -> Result<()> {
    // batch ingest tolerates a slow embedder; only requests are time-boxed
    let cache = require_cache(config).await?.with_embed_timeout(None);
    let report = ingest_paths(&cache, paths).await?;
    print_json(&report)
}
