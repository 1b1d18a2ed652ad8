//! Data models shared across the retrieval pipeline.
//!
//! These types flow between the normalizer, metasearch client, page
//! fetcher, vector cache, deduplicator and budget assembler. Transient
//! types ([`SearchHit`], [`FetchedPage`]) live for one request; only
//! [`CacheChunk`] is persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Output of the query normalizer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedQueries {
    pub queries: Vec<String>,
    pub claim: Option<String>,
}

impl ParsedQueries {
    pub fn new(queries: Vec<String>, claim: Option<String>) -> Self {
        Self { queries, claim }
    }

    /// Text used to rank cached evidence: the claim, or all queries joined.
    pub fn ranking_text(&self) -> String {
        match &self.claim {
            Some(c) if !c.trim().is_empty() => c.clone(),
            _ => self.queries.join(" "),
        }
    }
}

/// One result item returned by the metasearch aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub engine: String,
    pub published_date: Option<String>,
    pub domain: String,
    pub source_query: String,
}

/// Metadata scraped from a page's `<head>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub page_title: Option<String>,
    pub meta_author: Option<String>,
    pub meta_date: Option<String>,
    pub meta_description: Option<String>,
}

/// A successfully fetched and extracted page.
#[derive(Debug, Clone, Serialize)]
pub struct FetchedPage {
    pub clean_text: String,
    pub status_code: u16,
    pub content_type: String,
    pub last_modified: Option<String>,
    pub fetch_timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub metadata: PageMetadata,
}

/// Citation id: dense integers for live sources, `V<n>` for cache hits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceId {
    Live(usize),
    Cached(String),
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceId::Live(n) => write!(f, "{}", n),
            SourceId::Cached(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    SuccessfullyFetched,
    FromVectorCache,
}

/// A citation record in the response.
///
/// Created once per successfully fetched page (or per cache hit) and
/// never mutated afterwards. `text` and `vector` are internal: the full
/// extracted text feeds the budget assembler and the vector feeds the
/// deduplicator, neither is serialized.
#[derive(Debug, Clone, Serialize)]
pub struct Source {
    pub id: SourceId,
    pub title: String,
    pub url: String,
    pub domain: String,
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_engine: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub fetch_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_count: Option<usize>,
    pub character_count: usize,
    pub status: SourceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip)]
    pub text: String,
    #[serde(skip)]
    pub vector: Option<Vec<f32>>,
}

impl Source {
    /// Build a live source from a search hit and the page it pointed to.
    pub fn from_fetch(id: usize, hit: &SearchHit, page: &FetchedPage) -> Self {
        let title = Some(hit.title.clone())
            .filter(|t| !t.trim().is_empty())
            .or_else(|| page.metadata.page_title.clone())
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "Untitled".to_string());
        Self {
            id: SourceId::Live(id),
            title,
            url: hit.url.clone(),
            domain: hit.domain.clone(),
            snippet: hit.snippet.clone(),
            source_query: Some(hit.source_query.clone()),
            search_engine: Some(hit.engine.clone()),
            author: page.metadata.meta_author.clone(),
            publish_date: page
                .metadata
                .meta_date
                .clone()
                .or_else(|| hit.published_date.clone()),
            description: page.metadata.meta_description.clone(),
            fetch_timestamp: Some(page.fetch_timestamp),
            content_type: Some(page.content_type.clone()),
            word_count: Some(page.clean_text.split_whitespace().count()),
            character_count: page.clean_text.chars().count(),
            status: SourceStatus::SuccessfullyFetched,
            score: None,
            text: page.clean_text.clone(),
            vector: None,
        }
    }

    /// Score used for ranking; unscored sources rank as `0.0`.
    pub fn rank_score(&self) -> f64 {
        self.score.unwrap_or(0.0)
    }
}

/// A chunk persisted in the vector cache.
///
/// `id` is the content address `url_norm|chunk_index|start|end`; writing
/// the same address again overwrites the stored chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheChunk {
    pub id: String,
    pub vector: Vec<f32>,
    pub url: String,
    pub title: String,
    pub site: String,
    pub chunk_index: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    pub text: String,
    pub fetched_at: DateTime<Utc>,
}

/// A cache chunk returned from similarity search.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: CacheChunk,
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit() -> SearchHit {
        SearchHit {
            title: "Hit title".into(),
            url: "https://example.com/a".into(),
            snippet: "snippet".into(),
            engine: "brave".into(),
            published_date: Some("2024-01-01".into()),
            domain: "example.com".into(),
            source_query: "ant".into(),
        }
    }

    fn page(title: Option<&str>) -> FetchedPage {
        FetchedPage {
            clean_text: "one two three".into(),
            status_code: 200,
            content_type: "text/html".into(),
            last_modified: None,
            fetch_timestamp: Utc::now(),
            metadata: PageMetadata {
                page_title: title.map(String::from),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_source_id_serialization() {
        assert_eq!(serde_json::to_value(SourceId::Live(1)).unwrap(), 1);
        assert_eq!(
            serde_json::to_value(SourceId::Cached("V2".into())).unwrap(),
            "V2"
        );
    }

    #[test]
    fn test_from_fetch_title_fallbacks() {
        let s = Source::from_fetch(1, &hit(), &page(Some("Page title")));
        assert_eq!(s.title, "Hit title");
        assert_eq!(s.word_count, Some(3));
        assert_eq!(s.publish_date.as_deref(), Some("2024-01-01"));
        assert_eq!(s.status, SourceStatus::SuccessfullyFetched);

        let mut untitled = hit();
        untitled.title = String::new();
        let s = Source::from_fetch(1, &untitled, &page(Some("Page title")));
        assert_eq!(s.title, "Page title");
        let s = Source::from_fetch(1, &untitled, &page(None));
        assert_eq!(s.title, "Untitled");
    }

    #[test]
    fn test_internal_fields_not_serialized() {
        let s = Source::from_fetch(1, &hit(), &page(None));
        let v = serde_json::to_value(&s).unwrap();
        assert!(v.get("text").is_none());
        assert!(v.get("vector").is_none());
        assert!(v.get("score").is_none());
        assert_eq!(v["status"], "successfully_fetched");
    }

    #[test]
    fn test_ranking_text_falls_back_to_queries() {
        let p = ParsedQueries::new(vec!["a".into(), "b".into()], None);
        assert_eq!(p.ranking_text(), "a b");
        let p = ParsedQueries::new(vec!["a".into()], Some("c".into()));
        assert_eq!(p.ranking_text(), "c");
    }
}
