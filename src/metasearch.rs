//! Metasearch client for a SearxNG-compatible aggregator.
//!
//! One query is sent to one engine at a time. Engines are shuffled per
//! call; the first engine that answers with JSON results wins and its
//! top `k` items become [`SearchHit`]s. Engines that fail, answer with a
//! non-JSON body (typically a bot-detection page) or return nothing are
//! skipped. Exhausting every engine yields an empty list, never an error.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::Deserialize;

use evidence_harness_core::models::SearchHit;
use evidence_harness_core::url_norm::domain_of;
use evidence_harness_core::RetrievalError;

use crate::config::SearchConfig;
use crate::http::{build_search_client, search_headers};

/// Anything that turns one query into search hits.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Up to `k` hits for `query`; empty when nothing could be found.
    async fn search(&self, query: &str, k: usize) -> Vec<SearchHit>;
}

#[derive(Debug, Deserialize)]
struct SearxngResponse {
    #[serde(default)]
    results: Vec<SearxngItem>,
}

#[derive(Debug, Deserialize)]
struct SearxngItem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    engine: Option<String>,
    #[serde(default, rename = "publishedDate")]
    published_date: Option<String>,
}

/// HTTP client for a SearxNG `/search` endpoint.
pub struct SearxngClient {
    client: reqwest::Client,
    config: SearchConfig,
}

impl SearxngClient {
    pub fn new(config: SearchConfig) -> Result<Self, RetrievalError> {
        let client = build_search_client(&config)?;
        Ok(Self { client, config })
    }

    /// Query one engine (or the aggregator default when `engine` is `None`).
    pub async fn query_engine(
        &self,
        query: &str,
        engine: Option<&str>,
        k: usize,
    ) -> Result<Vec<SearchHit>, RetrievalError> {
        let mut params: Vec<(&str, &str)> = vec![
            ("q", query),
            ("format", "json"),
            ("categories", self.config.categories.as_str()),
        ];
        if let Some(e) = engine {
            params.push(("engines", e));
        }

        let resp = self
            .client
            .get(&self.config.endpoint)
            .headers(search_headers(&self.config))
            .query(&params)
            .send()
            .await
            .map_err(|e| RetrievalError::SearchUnavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RetrievalError::SearchUnavailable(format!("HTTP {}", status)));
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if !content_type.contains("json") {
            let shown = if content_type.is_empty() {
                "no content-type"
            } else {
                content_type.as_str()
            };
            return Err(RetrievalError::SearchUnavailable(format!(
                "non-JSON response ({}), likely bot detection",
                shown
            )));
        }

        let body: SearxngResponse = resp
            .json()
            .await
            .map_err(|e| RetrievalError::SearchUnavailable(format!("invalid JSON: {e}")))?;

        let hits = map_results(body.results, query, engine, k);
        if hits.is_empty() {
            return Err(RetrievalError::SearchUnavailable("no results".to_string()));
        }
        Ok(hits)
    }
}

fn map_results(
    items: Vec<SearxngItem>,
    query: &str,
    requested_engine: Option<&str>,
    k: usize,
) -> Vec<SearchHit> {
    items
        .into_iter()
        .filter_map(|item| {
            let url = item.url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty())?;
            Some(SearchHit {
                title: item.title.unwrap_or_default().trim().to_string(),
                domain: domain_of(&url),
                url,
                snippet: item.content.unwrap_or_default().trim().to_string(),
                engine: item
                    .engine
                    .or_else(|| requested_engine.map(str::to_string))
                    .unwrap_or_default(),
                published_date: item.published_date.filter(|d| !d.is_empty()),
                source_query: query.to_string(),
            })
        })
        .take(k)
        .collect()
}

#[async_trait]
impl SearchBackend for SearxngClient {
    async fn search(&self, query: &str, k: usize) -> Vec<SearchHit> {
        if self.config.engines.is_empty() {
            return match self.query_engine(query, None, k).await {
                Ok(hits) => hits,
                Err(err) => {
                    tracing::warn!(query, error = %err, "search failed");
                    Vec::new()
                }
            };
        }

        let mut engines = self.config.engines.clone();
        engines.shuffle(&mut rand::thread_rng());

        for engine in &engines {
            match self.query_engine(query, Some(engine), k).await {
                Ok(hits) => {
                    tracing::debug!(query, %engine, count = hits.len(), "engine returned results");
                    return hits;
                }
                Err(err) => {
                    tracing::warn!(query, %engine, error = %err, "engine failed, trying next");
                }
            }
        }

        tracing::warn!(query, tried = engines.len(), "all search engines exhausted");
        Vec::new()
    }
}
