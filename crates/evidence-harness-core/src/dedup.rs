//! Near-duplicate removal and score ranking.
//!
//! Deduplication and ranking are separate steps: [`Deduplicator`] keeps
//! the order it is given, and [`merge_ranked`] sorts afterwards.
//!
//! A candidate is a duplicate when either
//! - it has an embedding whose cosine similarity to an accepted vector
//!   exceeds [`DUPLICATE_SIMILARITY`], or
//! - its non-empty domain matches the domain of an accepted candidate.

use std::collections::HashSet;

use crate::embedding::cosine_similarity;
use crate::models::Source;
use crate::url_norm::normalize_url;

/// Cosine similarity above which two chunks are considered the same.
pub const DUPLICATE_SIMILARITY: f32 = 0.8;

/// Anything the deduplicator can compare.
pub trait DedupCandidate {
    fn vector(&self) -> Option<&[f32]>;
    fn domain(&self) -> &str;
}

impl DedupCandidate for Source {
    fn vector(&self) -> Option<&[f32]> {
        self.vector.as_deref()
    }

    fn domain(&self) -> &str {
        &self.domain
    }
}

/// Tracks accepted vectors and domains across calls.
#[derive(Debug, Default)]
pub struct Deduplicator {
    vectors: Vec<Vec<f32>>,
    domains: HashSet<String>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `candidate` as accepted without checking it.
    pub fn seed<C: DedupCandidate + ?Sized>(&mut self, candidate: &C) {
        if let Some(v) = candidate.vector() {
            self.vectors.push(v.to_vec());
        }
        if !candidate.domain().is_empty() {
            self.domains.insert(candidate.domain().to_string());
        }
    }

    pub fn is_duplicate<C: DedupCandidate + ?Sized>(&self, candidate: &C) -> bool {
        let domain = candidate.domain();
        if !domain.is_empty() && self.domains.contains(domain) {
            return true;
        }
        match candidate.vector() {
            Some(v) => self
                .vectors
                .iter()
                .any(|accepted| cosine_similarity(v, accepted) > DUPLICATE_SIMILARITY),
            None => false,
        }
    }

    /// Accept `candidate` unless it duplicates something already accepted.
    pub fn accept<C: DedupCandidate + ?Sized>(&mut self, candidate: &C) -> bool {
        if self.is_duplicate(candidate) {
            return false;
        }
        self.seed(candidate);
        true
    }

    /// Filter `candidates` in order, stopping after `k` acceptances if given.
    pub fn filter<C: DedupCandidate>(&mut self, candidates: Vec<C>, k: Option<usize>) -> Vec<C> {
        let mut kept = Vec::new();
        for c in candidates {
            if k.is_some_and(|k| kept.len() >= k) {
                break;
            }
            if self.accept(&c) {
                kept.push(c);
            }
        }
        kept
    }
}

/// Deduplicate `candidates` from scratch, preserving their order.
pub fn dedup<C: DedupCandidate>(candidates: Vec<C>, k: Option<usize>) -> Vec<C> {
    Deduplicator::new().filter(candidates, k)
}

/// Result of merging live sources with cache hits.
#[derive(Debug, Clone)]
pub struct MergedSources {
    /// User-facing list, truncated to the number of live sources.
    pub sources: Vec<Source>,
    /// Size of the merged list before truncation.
    pub source_count: usize,
}

/// Merge live sources with cache hits and rank by descending score.
///
/// Cache hits whose normalized URL matches a live source are dropped.
/// Unscored sources rank as `0.0`; ties keep their input order (live
/// first). The user-facing list is cut to the live count.
pub fn merge_ranked(live: Vec<Source>, cached: Vec<Source>) -> MergedSources {
    let live_count = live.len();
    let seen: HashSet<String> = live.iter().map(|s| normalize_url(&s.url)).collect();

    let mut merged = live;
    merged.extend(
        cached
            .into_iter()
            .filter(|h| !seen.contains(&normalize_url(&h.url))),
    );
    merged.sort_by(|a, b| {
        b.rank_score()
            .partial_cmp(&a.rank_score())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let source_count = merged.len();
    merged.truncate(live_count);
    MergedSources {
        sources: merged,
        source_count,
    }
}
