//! Retrieval pipeline orchestrator.
//!
//! ```text
//! payload ─▶ normalize ─▶ search ×N (joined) ─▶ collapse duplicate URLs
//!         ─▶ fetch (bounded, completion order)
//!         ─▶ spawn cache upserts ─▶ budget assembly over live sources
//!         ─▶ cache similarity hits ─▶ dedup ─▶ merge & rank ─▶ response
//! ```
//!
//! Cache writes run as their own tasks. The response waits for them at
//! most one embedding timeout; slower writes finish in the background.
//!
//! Every stage after normalization absorbs its own faults: a failed
//! engine, page or cache write only shrinks the output. The only error
//! [`bulk_retrieve`] returns is [`RetrievalError::InvalidInput`].
//!
//! All collaborators arrive through [`RetrievalContext`], so tests can
//! swap in fakes for the search backend, fetcher, embedder and store.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;

use evidence_harness_core::budget::{assemble, EvidenceBlock};
use evidence_harness_core::dedup::{merge_ranked, Deduplicator};
use evidence_harness_core::models::{FetchedPage, ParsedQueries, SearchHit, Source};
use evidence_harness_core::normalize::{normalize_payload, NormalizeOptions};
use evidence_harness_core::url_norm::normalize_url;
use evidence_harness_core::RetrievalError;

use crate::cache::{number_cached, VectorCache};
use crate::config::Config;
use crate::fetch::{HttpFetcher, PageFetcher};
use crate::metasearch::{SearchBackend, SearxngClient};

/// Per-request knobs, resolved from [`crate::config::RetrievalConfig`].
#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub per_page_chars: usize,
    pub total_chars: usize,
    pub fetch_concurrency: usize,
    /// Cache hits requested per request.
    pub cache_hits: usize,
    pub normalize: NormalizeOptions,
}

impl RetrievalSettings {
    pub fn from_config(config: &Config) -> Self {
        let r = &config.retrieval;
        Self {
            top_k: r.top_k,
            per_page_chars: r.per_page_chars,
            total_chars: r.total_chars,
            fetch_concurrency: r.fetch_concurrency.max(1),
            cache_hits: r.cache_hits(),
            normalize: r.normalize_options(),
        }
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Everything a retrieval needs, constructed once and shared.
#[derive(Clone)]
pub struct RetrievalContext {
    pub settings: RetrievalSettings,
    pub search: Arc<dyn SearchBackend>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub cache: Option<VectorCache>,
}

impl RetrievalContext {
    pub fn new(
        settings: RetrievalSettings,
        search: Arc<dyn SearchBackend>,
        fetcher: Arc<dyn PageFetcher>,
        cache: Option<VectorCache>,
    ) -> Self {
        Self {
            settings,
            search,
            fetcher,
            cache,
        }
    }

    /// Wire the production SearxNG client, HTTP fetcher and vector cache.
    ///
    /// A cache that cannot be opened is logged and left out; retrieval
    /// still works from live results alone.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let settings = RetrievalSettings::from_config(config);
        let search = Arc::new(SearxngClient::new(config.search.clone())?);
        let fetcher = Arc::new(HttpFetcher::new(&config.fetch, settings.per_page_chars)?);

        // requests rely on the embed timeout, not on backoff retries
        let mut cache_config = config.clone();
        cache_config.embedding.max_retries = 0;
        let cache = match VectorCache::from_config(&cache_config).await {
            Ok(cache) => cache,
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "vector cache unavailable, continuing without it");
                None
            }
        };
        Ok(Self::new(settings, search, fetcher, cache))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseSettings {
    pub total_chars: usize,
    pub per_page_chars: usize,
    pub top_k: usize,
    pub num_queries: usize,
    pub hybrid_vector_cache: bool,
}

/// The tool's JSON result.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResponse {
    pub queries: Vec<String>,
    pub claim: Option<String>,
    pub sources: Vec<Source>,
    /// Size of the merged live + cache list before truncation.
    pub source_count: usize,
    /// Search hits across all queries, before duplicate URLs collapse.
    pub total_results_found: usize,
    pub merged_text: String,
    pub character_count: usize,
    pub retrieval_timestamp: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub settings: ResponseSettings,
}

/// Normalize `payload` and run the full pipeline.
pub async fn bulk_retrieve(
    ctx: &RetrievalContext,
    payload: &Value,
) -> Result<RetrievalResponse, RetrievalError> {
    let parsed = normalize_payload(payload, &ctx.settings.normalize)?;
    Ok(retrieve(ctx, parsed).await)
}

/// Run the pipeline for already-normalized queries. Never fails.
pub async fn retrieve(ctx: &RetrievalContext, parsed: ParsedQueries) -> RetrievalResponse {
    let started = Instant::now();
    let settings = &ctx.settings;

    let hits = search_all(ctx, &parsed.queries).await;
    let total_results_found = hits.len();
    let hits = unique_by_url(hits);
    tracing::debug!(
        queries = parsed.queries.len(),
        hits = total_results_found,
        unique = hits.len(),
        "search complete"
    );

    let fetched = fetch_all(ctx, hits).await;
    let writes: Vec<JoinHandle<()>> = match &ctx.cache {
        Some(cache) => fetched
            .iter()
            .map(|(hit, page)| spawn_cache_write(cache, hit, page))
            .collect(),
        None => Vec::new(),
    };

    let mut live: Vec<Source> = fetched
        .iter()
        .enumerate()
        .map(|(i, (hit, page))| Source::from_fetch(i + 1, hit, page))
        .collect();

    let assembled = assemble(live.iter().map(EvidenceBlock::from), settings.total_chars);
    live.truncate(assembled.sources_included);

    let cached = match &ctx.cache {
        Some(cache) => {
            let (hits, ()) = tokio::join!(
                cache_hits(cache, &parsed, &live, settings.cache_hits),
                await_writes(cache, writes),
            );
            hits
        }
        None => Vec::new(),
    };
    let merged = merge_ranked(live, cached);

    let elapsed_ms = started.elapsed().as_millis() as u64;
    tracing::info!(
        queries = parsed.queries.len(),
        sources = merged.sources.len(),
        source_count = merged.source_count,
        characters = assembled.character_count,
        elapsed_ms,
        "retrieval complete"
    );

    RetrievalResponse {
        settings: ResponseSettings {
            total_chars: settings.total_chars,
            per_page_chars: settings.per_page_chars,
            top_k: settings.top_k,
            num_queries: parsed.queries.len(),
            hybrid_vector_cache: ctx.cache.is_some(),
        },
        queries: parsed.queries,
        claim: parsed.claim,
        sources: merged.sources,
        source_count: merged.source_count,
        total_results_found,
        merged_text: assembled.merged_text,
        character_count: assembled.character_count,
        retrieval_timestamp: Utc::now(),
        elapsed_ms,
    }
}

/// Search every query concurrently; hits keep query order.
async fn search_all(ctx: &RetrievalContext, queries: &[String]) -> Vec<SearchHit> {
    let searches = queries
        .iter()
        .map(|q| ctx.search.search(q, ctx.settings.top_k));
    futures::future::join_all(searches)
        .await
        .into_iter()
        .flatten()
        .collect()
}

/// Drop hits whose normalized URL was already seen.
fn unique_by_url(hits: Vec<SearchHit>) -> Vec<SearchHit> {
    let mut seen = HashSet::new();
    hits.into_iter()
        .filter(|h| seen.insert(normalize_url(&h.url)))
        .collect()
}

/// Fetch pages with bounded concurrency. Results come back in completion
/// order; failures are dropped.
async fn fetch_all(ctx: &RetrievalContext, hits: Vec<SearchHit>) -> Vec<(SearchHit, FetchedPage)> {
    stream::iter(hits)
        .map(|hit| async move {
            match ctx.fetcher.fetch(&hit.url).await {
                Ok(page) if !page.clean_text.is_empty() => Some((hit, page)),
                Ok(_) => {
                    tracing::debug!(url = %hit.url, "page had no text");
                    None
                }
                Err(e) => {
                    tracing::debug!(url = %hit.url, error = %e, "fetch failed");
                    None
                }
            }
        })
        .buffer_unordered(ctx.settings.fetch_concurrency)
        .filter_map(|r| async move { r })
        .collect()
        .await
}

/// Cache one fetched page on its own task.
fn spawn_cache_write(cache: &VectorCache, hit: &SearchHit, page: &FetchedPage) -> JoinHandle<()> {
    let cache = cache.clone();
    let url = hit.url.clone();
    let site = hit.domain.clone();
    let title = page
        .metadata
        .page_title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| hit.title.clone());
    let text = page.clean_text.clone();
    let fetched_at = page.fetch_timestamp;

    tokio::spawn(async move {
        if let Err(e) = cache
            .cache_page(&normalize_url(&url), &text, &title, &site, fetched_at)
            .await
        {
            tracing::warn!(url = %url, error = %e, "page not cached");
        }
    })
}

/// Wait for cache writes, giving up after the cache's embed timeout.
async fn await_writes(cache: &VectorCache, writes: Vec<JoinHandle<()>>) {
    if writes.is_empty() {
        return;
    }
    let all = futures::future::join_all(writes);
    match cache.settings().embed_timeout {
        Some(limit) => {
            if tokio::time::timeout(limit, all).await.is_err() {
                tracing::debug!(?limit, "cache writes still running, not waiting");
            }
        }
        None => {
            all.await;
        }
    }
}

/// Cache similarity hits for the claim (or the joined queries), minus
/// near-duplicates and domains already covered by a live source.
async fn cache_hits(
    cache: &VectorCache,
    parsed: &ParsedQueries,
    live: &[Source],
    k: usize,
) -> Vec<Source> {
    let hits = match cache.search(&parsed.ranking_text(), k).await {
        Ok(hits) => hits,
        Err(e) => {
            tracing::warn!(error = %e, "cache search failed");
            return Vec::new();
        }
    };

    let mut dedup = Deduplicator::new();
    for source in live {
        dedup.seed(source);
    }
    let mut kept = dedup.filter(hits, None);
    number_cached(&mut kept);
    kept
}
