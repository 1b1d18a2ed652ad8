//! Shared fixtures: a local web (fake SearxNG plus pages) and a
//! deterministic embedder.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use evidence_harness::cache::{CacheSettings, VectorCache};
use evidence_harness::config::{FetchConfig, SearchConfig};
use evidence_harness::fetch::HttpFetcher;
use evidence_harness::metasearch::SearxngClient;
use evidence_harness::pipeline::{RetrievalContext, RetrievalSettings};
use evidence_harness_core::embedding::EmbeddingProvider;
use evidence_harness_core::store::memory::InMemoryStore;
use evidence_harness_core::store::VectorStore;

pub const DIMS: usize = 64;

/// Bag-of-words embedder: each lower-cased word hashes into one of
/// [`DIMS`] buckets; the result is L2-normalised.
pub struct HashEmbedder;

fn bucket(word: &str) -> usize {
    word.bytes()
        .fold(2166136261u32, |h, b| (h ^ b as u32).wrapping_mul(16777619)) as usize
        % DIMS
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-bow"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; DIMS];
                for word in t.split_whitespace() {
                    v[bucket(&word.to_lowercase())] += 1.0;
                }
                let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 0.0 {
                    v.iter_mut().for_each(|x| *x /= norm);
                }
                v
            })
            .collect())
    }
}

/// One page served by the fixture web.
#[derive(Clone)]
pub struct Page {
    pub title: String,
    pub body: String,
}

#[derive(Clone, Default)]
struct WebState {
    base: String,
    /// query -> page slugs returned by the fake search; a slug with no
    /// page is still listed and 404s when fetched
    results: HashMap<String, Vec<String>>,
    pages: HashMap<String, Page>,
    /// slug -> (content type, body) served verbatim
    raw: HashMap<String, (String, Vec<u8>)>,
    /// engines that answer with an HTML bot-check page
    blocked_engines: Vec<String>,
}

pub struct FixtureWeb {
    pub addr: SocketAddr,
    state: WebState,
}

impl FixtureWeb {
    pub fn new() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            state: WebState::default(),
        }
    }

    pub fn page(mut self, slug: &str, title: &str, body: &str) -> Self {
        self.state.pages.insert(
            slug.to_string(),
            Page {
                title: title.to_string(),
                body: body.to_string(),
            },
        );
        self
    }

    /// Serve `body` as-is under `content_type`.
    pub fn raw(mut self, slug: &str, content_type: &str, body: Vec<u8>) -> Self {
        self.state
            .raw
            .insert(slug.to_string(), (content_type.to_string(), body));
        self
    }

    pub fn result(mut self, query: &str, slugs: &[&str]) -> Self {
        self.state
            .results
            .insert(query.to_string(), slugs.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn blocked_engine(mut self, engine: &str) -> Self {
        self.state.blocked_engines.push(engine.to_string());
        self
    }

    /// Bind an ephemeral port and serve in the background.
    pub async fn start(mut self) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        self.addr = listener.local_addr().unwrap();
        self.state.base = format!("http://{}", self.addr);

        let app = Router::new()
            .route("/search", get(handle_search))
            .route("/page/{slug}", get(handle_page))
            .with_state(Arc::new(self.state.clone()));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        self
    }

    pub fn url(&self, slug: &str) -> String {
        format!("http://{}/page/{}", self.addr, slug)
    }

    pub fn search_config(&self, engines: &[&str]) -> SearchConfig {
        SearchConfig {
            endpoint: format!("http://{}/search", self.addr),
            engines: engines.iter().map(|e| e.to_string()).collect(),
            timeout_secs: 5,
            ..SearchConfig::default()
        }
    }
}

async fn handle_search(
    State(state): State<Arc<WebState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let engine = params.get("engines").cloned().unwrap_or_default();
    if state.blocked_engines.contains(&engine) {
        return Html("<html><body>Are you a robot?</body></html>").into_response();
    }

    let query = params.get("q").cloned().unwrap_or_default();
    let results: Vec<_> = state
        .results
        .get(&query)
        .into_iter()
        .flatten()
        .map(|slug| {
            let title = state.pages.get(slug).map_or(slug.as_str(), |p| p.title.as_str());
            json!({
                "title": title,
                "url": format!("{}/page/{}", state.base, slug),
                "content": format!("snippet for {}", slug),
                "engine": engine,
            })
        })
        .collect();
    Json(json!({ "results": results })).into_response()
}

async fn handle_page(State(state): State<Arc<WebState>>, Path(slug): Path<String>) -> Response {
    if let Some((content_type, body)) = state.raw.get(&slug) {
        return ([(axum::http::header::CONTENT_TYPE, content_type.clone())], body.clone()).into_response();
    }
    match state.pages.get(&slug) {
        Some(page) => Html(format!(
            "<html><head><title>{}</title><meta name=\"author\" content=\"Fixture Author\"></head>\
             <body><nav>menu</nav><article><p>{}</p></article></body></html>",
            page.title, page.body
        ))
        .into_response(),
        None => (axum::http::StatusCode::NOT_FOUND, "missing").into_response(),
    }
}

/// Long enough for both main-content extraction and one cache chunk.
pub fn paragraph(topic: &str) -> String {
    format!("Researchers studied {} in detail and published their findings. ", topic).repeat(8)
}

pub async fn memory_cache() -> (VectorCache, Arc<dyn VectorStore>) {
    let store: Arc<dyn VectorStore> = Arc::new(InMemoryStore::new());
    let cache = VectorCache::new(store.clone(), Arc::new(HashEmbedder), CacheSettings::default());
    cache.ensure().await.unwrap();
    (cache, store)
}

pub fn context(web: &FixtureWeb, engines: &[&str], cache: Option<VectorCache>) -> RetrievalContext {
    let settings = RetrievalSettings::default();
    let search = SearxngClient::new(web.search_config(engines)).unwrap();
    let fetcher = HttpFetcher::new(&FetchConfig::default(), settings.per_page_chars).unwrap();
    RetrievalContext::new(settings, Arc::new(search), Arc::new(fetcher), cache)
}
