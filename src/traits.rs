//! Tool trait and registry.
//!
//! Every capability the harness offers to agents is a [`Tool`]. The
//! [`ToolRegistry`] holds them; the REST server and the MCP bridge both
//! list and dispatch through it, so a tool registered once is reachable
//! over either transport.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              ToolRegistry                │
//! │  ┌────────────────────┐ ┌─────────────┐  │
//! │  │search_and_retrieve │ │cache_search │  │
//! │  └────────────────────┘ └─────────────┘  │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!   POST /tools/{name}   |   MCP tools/call
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use evidence_harness_core::RetrievalError;

use crate::pipeline::{bulk_retrieve, RetrievalContext};

/// A tool that agents can discover and call.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use anyhow::Result;
/// use serde_json::{json, Value};
/// use evidence_harness::traits::{Tool, ToolContext};
///
/// pub struct PingTool;
///
/// #[async_trait]
/// impl Tool for PingTool {
///     fn name(&self) -> &str { "ping" }
///     fn description(&self) -> &str { "Liveness check" }
///
///     fn parameters_schema(&self) -> Value {
///         json!({ "type": "object", "properties": {} })
///     }
///
///     async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
///         Ok(json!({ "cache": ctx.retrieval().cache.is_some() }))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Route path (`POST /tools/{name}`) and MCP tool name.
    fn name(&self) -> &str;

    /// One-line description for agent discovery.
    fn description(&self) -> &str;

    /// Built-in tools are flagged `"builtin": true` in `GET /tools/list`.
    fn is_builtin(&self) -> bool {
        false
    }

    /// JSON Schema of the parameters object.
    fn parameters_schema(&self) -> Value;

    /// Run the tool. `params` is always a JSON object.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// What a tool can reach while executing.
#[derive(Clone)]
pub struct ToolContext {
    retrieval: Arc<RetrievalContext>,
}

impl ToolContext {
    pub fn new(retrieval: Arc<RetrievalContext>) -> Self {
        Self { retrieval }
    }

    pub fn retrieval(&self) -> &RetrievalContext {
        &self.retrieval
    }

    pub fn strict(&self) -> bool {
        self.retrieval.settings.normalize.strict
    }
}

/// Payload example returned alongside input errors.
pub fn input_example() -> Value {
    json!({
        "queries": ["effects of caffeine on sleep latency", "caffeine half-life adults"],
        "claim": "Caffeine taken six hours before bed still disrupts sleep."
    })
}

/// The structured error document for unusable tool input.
pub fn error_document(err: &RetrievalError) -> Value {
    json!({
        "error": {
            "code": err.code(),
            "message": err.to_string(),
        },
        "example": input_example(),
    })
}

// ═══════════════════════════════════════════════════════════════════════
// Built-in Tool Implementations
// ═══════════════════════════════════════════════════════════════════════

/// Full pipeline: normalize, search, fetch, cache, rank, assemble.
pub struct SearchAndRetrieveTool;

#[async_trait]
impl Tool for SearchAndRetrieveTool {
    fn name(&self) -> &str {
        "search_and_retrieve"
    }

    fn description(&self) -> &str {
        "Search the web for a prompt or claim and return ranked, cited evidence text"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "Free text: a claim, a question, a QUERIES: block or a JSON document"
                },
                "queries": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Explicit search queries"
                },
                "claim": {
                    "type": "string",
                    "description": "What the evidence should support or refute; used for ranking"
                }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        match bulk_retrieve(ctx.retrieval(), &params).await {
            Ok(resp) => Ok(serde_json::to_value(&resp)?),
            Err(e @ RetrievalError::InvalidInput(_)) if !ctx.strict() => {
                tracing::info!(error = %e, "rejected tool input");
                Ok(error_document(&e))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Similarity lookup in the vector cache only; no web traffic.
pub struct CacheSearchTool;

#[async_trait]
impl Tool for CacheSearchTool {
    fn name(&self) -> &str {
        "cache_search"
    }

    fn description(&self) -> &str {
        "Semantic search over previously fetched pages in the local evidence cache"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Text to match" },
                "limit": { "type": "integer", "description": "Max results", "default": 6 }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = params["query"].as_str().unwrap_or("");
        if query.trim().is_empty() {
            return Err(RetrievalError::InvalidInput("query must not be empty".into()).into());
        }
        let Some(cache) = &ctx.retrieval().cache else {
            return Err(RetrievalError::CacheDisabled.into());
        };
        let limit = params["limit"]
            .as_u64()
            .map(|l| l as usize)
            .unwrap_or(ctx.retrieval().settings.cache_hits);

        let results = cache.search(query, limit).await?;
        Ok(json!({ "results": results }))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Registry of callable tools.
///
/// ```rust
/// use evidence_harness::traits::ToolRegistry;
///
/// let tools = ToolRegistry::with_builtins();
/// assert!(tools.find("search_and_retrieve").is_some());
/// ```
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry with `search_and_retrieve` and `cache_search`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(SearchAndRetrieveTool));
        registry.register(Box::new(CacheSearchTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
