//! # Evidence Harness Core
//!
//! Pure logic for Evidence Harness: data models, query normalization,
//! chunking, freshness rules, deduplication and ranking, budget assembly,
//! and the embedding / vector-store traits.
//!
//! This crate performs no network or filesystem I/O and has no tokio,
//! reqwest or sqlx dependency. Everything that talks to the outside world
//! lives in the `evidence-harness` app crate and is injected through the
//! traits defined here.

pub mod budget;
pub mod chunk;
pub mod dedup;
pub mod embedding;
pub mod error;
pub mod freshness;
pub mod models;
pub mod normalize;
pub mod store;
pub mod url_norm;

pub use error::{Result, RetrievalError};
