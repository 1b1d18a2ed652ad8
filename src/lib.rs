//! # Evidence Harness
//!
//! Turns a free-form prompt or claim into ranked, deduplicated, cited
//! evidence text from the live web, backed by a persistent semantic cache
//! of pages seen before, and serves it as an agent tool over MCP and HTTP.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌────────────┐   ┌─────────────┐
//! │ Normalizer │──▶│ Metasearch │──▶│  Fetcher   │──▶│ VectorCache │
//! │  (core)    │   │  SearxNG   │   │ + Extract  │   │ SQLite/Qdr. │
//! └────────────┘   └────────────┘   └────────────┘   └──────┬──────┘
//!                                                           ▼
//!                              ┌─────────────────┐   ┌─────────────┐
//!                              │ Budget assembly │◀──│ Dedup+Rank  │
//!                              └────────┬────────┘   └─────────────┘
//!                                       ▼
//!                        ┌──────────┐ ┌──────────┐ ┌──────────┐
//!                        │   CLI    │ │   MCP    │ │   REST   │
//!                        │  (evh)   │ │  stdio   │ │  axum    │
//!                        └──────────┘ └──────────┘ └──────────┘
//! ```
//!
//! Pure logic (normalization, chunking, dedup, budget) lives in the
//! `evidence-harness-core` crate; this crate holds everything that does
//! I/O.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and `EVH_*` overrides |
//! | [`logging`] | tracing subscriber setup |
//! | [`http`] | Shared reqwest clients and rotating headers |
//! | [`metasearch`] | SearxNG client with engine rotation |
//! | [`fetch`] / [`extract`] | Page download and text extraction |
//! | [`embedding`] | Ollama, OpenAI and local embedding providers |
//! | [`sqlite_store`] / `qdrant_store` | Vector store backends |
//! | [`cache`] | Freshness-gated vector cache |
//! | [`pipeline`] | The retrieval orchestrator |
//! | [`traits`] | Tool trait and registry |
//! | [`server`] / [`mcp`] | REST and MCP transports |
//! | [`ingest`] | Local file ingestion |
//! | [`commands`] | `evh` subcommands |

pub mod cache;
pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod fetch;
pub mod http;
pub mod ingest;
pub mod logging;
pub mod mcp;
pub mod metasearch;
pub mod migrate;
pub mod pipeline;
#[cfg(feature = "qdrant")]
pub mod qdrant_store;
pub mod server;
pub mod sqlite_store;
pub mod traits;
