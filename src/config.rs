//! TOML configuration for Evidence Harness.
//!
//! Every section and key has a default, so a missing file or an empty
//! file yields a working configuration. After parsing, `EVH_*`
//! environment variables override individual keys, then the result is
//! validated.
//!
//! ```toml
//! [retrieval]
//! top_k = 3
//! total_chars = 25000
//!
//! [search]
//! endpoint = "http://localhost:8080/search"
//! engines = ["duckduckgo", "brave"]
//!
//! [cache]
//! backend = "sqlite"
//! ttl_days = 7
//!
//! [embedding]
//! provider = "ollama"
//! model = "bge-m3"
//! dims = 1024
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use evidence_harness_core::chunk::ChunkParams;
use evidence_harness_core::normalize::NormalizeOptions;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

// ============ Retrieval ============

/// Upper bound on cache hits requested per retrieval.
pub const MAX_CACHE_HITS: usize = 1000;

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Search results kept per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_queries")]
    pub max_queries: usize,
    #[serde(default = "default_per_page_chars")]
    pub per_page_chars: usize,
    #[serde(default = "default_total_chars")]
    pub total_chars: usize,
    /// Fail on unusable input instead of synthesizing a fallback query.
    #[serde(default)]
    pub strict_input: bool,
    /// Upper bound on in-flight page fetches per request.
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
    /// Cache hits requested per request, as a multiple of `top_k`.
    #[serde(default = "default_cache_hits_multiplier")]
    pub cache_hits_multiplier: usize,
}

fn default_top_k() -> usize {
    3
}
fn default_max_queries() -> usize {
    5
}
fn default_per_page_chars() -> usize {
    5000
}
fn default_total_chars() -> usize {
    25000
}
fn default_fetch_concurrency() -> usize {
    8
}
fn default_cache_hits_multiplier() -> usize {
    2
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_queries: default_max_queries(),
            per_page_chars: default_per_page_chars(),
            total_chars: default_total_chars(),
            strict_input: false,
            fetch_concurrency: default_fetch_concurrency(),
            cache_hits_multiplier: default_cache_hits_multiplier(),
        }
    }
}

impl RetrievalConfig {
    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            max_queries: self.max_queries,
            strict: self.strict_input,
        }
    }

    /// `top_k * cache_hits_multiplier`, capped at [`MAX_CACHE_HITS`].
    pub fn cache_hits(&self) -> usize {
        self.top_k
            .saturating_mul(self.cache_hits_multiplier)
            .min(MAX_CACHE_HITS)
    }
}

// ============ Search ============

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    /// SearxNG-compatible `/search` endpoint.
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,
    /// Engines tried one at a time, in shuffled order.
    #[serde(default = "default_engines")]
    pub engines: Vec<String>,
    #[serde(default = "default_categories")]
    pub categories: String,
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
    /// Fixed User-Agent; a browser UA is rotated per request when unset.
    #[serde(default)]
    pub user_agent: Option<String>,
}

fn default_search_endpoint() -> String {
    "http://localhost:8080/search".to_string()
}
fn default_engines() -> Vec<String> {
    ["duckduckgo", "brave", "bing", "google"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_categories() -> String {
    "general".to_string()
}
fn default_search_timeout() -> u64 {
    15
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            engines: default_engines(),
            categories: default_categories(),
            timeout_secs: default_search_timeout(),
            user_agent: None,
        }
    }
}

// ============ Fetch ============

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    #[serde(default = "default_fetch_user_agent")]
    pub user_agent: String,
    /// Response bytes read per page; the rest of the body is dropped.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_fetch_timeout() -> u64 {
    8
}
fn default_max_redirects() -> usize {
    10
}
fn default_max_body_bytes() -> usize {
    5 * 1024 * 1024
}
fn default_fetch_user_agent() -> String {
    format!("evidence-harness/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            max_redirects: default_max_redirects(),
            user_agent: default_fetch_user_agent(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

// ============ Cache ============

/// Vector store backing the cache.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Sqlite,
    Memory,
    Qdrant,
}

impl FromStr for CacheBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            "qdrant" => Ok(Self::Qdrant),
            other => bail!(
                "Unknown cache backend: '{}'. Must be sqlite, memory, or qdrant.",
                other
            ),
        }
    }
}

impl fmt::Display for CacheBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
            Self::Qdrant => "qdrant",
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub backend: CacheBackend,
    /// SQLite database file (sqlite backend).
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Qdrant host and gRPC port (qdrant backend).
    #[serde(default = "default_qdrant_host")]
    pub host: String,
    #[serde(default = "default_qdrant_port")]
    pub port: u16,
    #[serde(default = "default_ttl_days")]
    pub ttl_days: i64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_min_chunk_chars")]
    pub min_chunk_chars: usize,
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
    /// Time limit on each embedding call made while serving a request.
    #[serde(default = "default_embed_timeout_ms")]
    pub embed_timeout_ms: u64,
}

fn default_true() -> bool {
    true
}
fn default_cache_path() -> PathBuf {
    PathBuf::from("./data/evh-cache.sqlite")
}
fn default_collection() -> String {
    "web_cache".to_string()
}
fn default_qdrant_host() -> String {
    "localhost".to_string()
}
fn default_qdrant_port() -> u16 {
    6334
}
fn default_ttl_days() -> i64 {
    7
}
fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    120
}
fn default_min_chunk_chars() -> usize {
    200
}
fn default_snippet_chars() -> usize {
    280
}
fn default_embed_timeout_ms() -> u64 {
    5000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::default(),
            path: default_cache_path(),
            collection: default_collection(),
            host: default_qdrant_host(),
            port: default_qdrant_port(),
            ttl_days: default_ttl_days(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            min_chunk_chars: default_min_chunk_chars(),
            snippet_chars: default_snippet_chars(),
            embed_timeout_ms: default_embed_timeout_ms(),
        }
    }
}

impl CacheConfig {
    pub fn chunk_params(&self) -> ChunkParams {
        ChunkParams {
            size: self.chunk_size,
            overlap: self.chunk_overlap,
            min_chars: self.min_chunk_chars,
        }
    }

    pub fn qdrant_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

// ============ Embedding ============

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Base URL of the Ollama server.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "ollama".to_string()
}
fn default_model() -> String {
    "bge-m3".to_string()
}
fn default_dims() -> usize {
    1024
}
fn default_batch_size() -> usize {
    16
}
fn default_max_retries() -> u32 {
    3
}
fn default_embedding_timeout() -> u64 {
    30
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dims: default_dims(),
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

// ============ Server ============

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:7331".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

// ============ Loading ============

/// Load, override from the environment, and validate.
///
/// A missing file is not an error: defaults are used instead.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        parse_config(&content)?
    } else {
        tracing::info!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

/// Parse TOML text without overrides or validation.
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

/// Apply `EVH_*` overrides using `lookup` to read variables.
///
/// Unparsable values are logged and ignored.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let r = &mut config.retrieval;
    override_parsed(&lookup, "EVH_TOP_K", &mut r.top_k);
    override_parsed(&lookup, "EVH_MAX_QUERIES", &mut r.max_queries);
    override_parsed(&lookup, "EVH_PER_PAGE_CHARS", &mut r.per_page_chars);
    override_parsed(&lookup, "EVH_TOTAL_CHARS", &mut r.total_chars);
    if let Some(v) = lookup("EVH_STRICT_INPUT") {
        match parse_bool(&v) {
            Some(b) => r.strict_input = b,
            None => tracing::warn!(key = "EVH_STRICT_INPUT", value = %v, "ignoring invalid override"),
        }
    }

    if let Some(v) = lookup("EVH_SEARXNG_URL").filter(|v| !v.trim().is_empty()) {
        config.search.endpoint = v.trim().to_string();
    }
    if let Some(v) = lookup("EVH_SEARCH_ENGINES") {
        config.search.engines = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }

    let c = &mut config.cache;
    override_parsed(&lookup, "EVH_CACHE_TTL_DAYS", &mut c.ttl_days);
    override_parsed(&lookup, "EVH_CACHE_BACKEND", &mut c.backend);
    if let Some(v) = lookup("EVH_CACHE_COLLECTION").filter(|v| !v.trim().is_empty()) {
        c.collection = v.trim().to_string();
    }
    if let Some(v) = lookup("EVH_QDRANT_HOST").filter(|v| !v.trim().is_empty()) {
        c.host = v.trim().to_string();
    }
    override_parsed(&lookup, "EVH_QDRANT_PORT", &mut c.port);
}

fn override_parsed<T, F>(lookup: &F, key: &str, slot: &mut T)
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(v) => *slot = v,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring invalid override"),
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn validate(config: &Config) -> Result<()> {
    let r = &config.retrieval;
    if r.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }
    if r.max_queries == 0 {
        bail!("retrieval.max_queries must be >= 1");
    }
    if r.per_page_chars == 0 || r.total_chars == 0 {
        bail!("retrieval.per_page_chars and retrieval.total_chars must be >= 1");
    }
    if r.fetch_concurrency == 0 {
        bail!("retrieval.fetch_concurrency must be >= 1");
    }
    if config.fetch.max_body_bytes == 0 {
        bail!("fetch.max_body_bytes must be >= 1");
    }

    let c = &config.cache;
    if c.chunk_size == 0 {
        bail!("cache.chunk_size must be > 0");
    }
    if c.chunk_overlap >= c.chunk_size {
        bail!(
            "cache.chunk_overlap ({}) must be smaller than cache.chunk_size ({})",
            c.chunk_overlap,
            c.chunk_size
        );
    }

    if config.embedding.is_enabled() && config.embedding.dims == 0 {
        bail!(
            "embedding.dims must be > 0 when provider is '{}'",
            config.embedding.provider
        );
    }
    match config.embedding.provider.as_str() {
        "disabled" | "ollama" | "openai" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, ollama, openai, or local.",
            other
        ),
    }

    Ok(())
}
