//! Local file ingestion into the vector cache.
//!
//! Walks files and directories, extracts text from `.txt`, `.md`,
//! `.html`/`.htm` and `.pdf` files and caches each one under its
//! `file://` URL. The usual freshness rule applies, so re-running
//! `evh ingest` within the TTL is a no-op. A file that cannot be read
//! or extracted is reported and skipped.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use evidence_harness_core::url_norm::normalize_url;

use crate::cache::{CacheOutcome, VectorCache};
use crate::extract::{extract_text_blocking, MIME_HTML, MIME_MARKDOWN, MIME_PDF, MIME_PLAIN};

#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
pub struct IngestReport {
    pub files_seen: usize,
    pub cached: usize,
    pub chunks_written: usize,
    pub fresh: usize,
    pub empty: usize,
    pub failed: Vec<String>,
}

/// Content type for a supported file, by extension.
pub fn content_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "txt" => Some(MIME_PLAIN),
        "md" | "markdown" => Some(MIME_MARKDOWN),
        "html" | "htm" => Some(MIME_HTML),
        "pdf" => Some(MIME_PDF),
        _ => None,
    }
}

/// Expand `paths` into supported files, sorted for deterministic order.
pub fn collect_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for root in paths {
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = entry?;
            if entry.file_type().is_file() && content_type_for(entry.path()).is_some() {
                files.push(entry.into_path());
            }
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn file_url(path: &Path) -> String {
    let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    normalize_url(&format!("file://{}", absolute.display()))
}

/// Ingest every supported file under `paths`.
pub async fn ingest_paths(cache: &VectorCache, paths: &[PathBuf]) -> Result<IngestReport> {
    let files = collect_files(paths)?;
    let mut report = IngestReport {
        files_seen: files.len(),
        ..IngestReport::default()
    };

    for path in &files {
        match ingest_file(cache, path).await {
            Ok(CacheOutcome::Upserted(n)) => {
                report.cached += 1;
                report.chunks_written += n;
            }
            Ok(CacheOutcome::Fresh) => report.fresh += 1,
            Ok(CacheOutcome::NoChunks) => report.empty += 1,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %format!("{:#}", e), "skipping file");
                report.failed.push(path.display().to_string());
            }
        }
    }

    tracing::info!(
        files = report.files_seen,
        cached = report.cached,
        fresh = report.fresh,
        failed = report.failed.len(),
        "ingest complete"
    );
    Ok(report)
}

async fn ingest_file(cache: &VectorCache, path: &Path) -> Result<CacheOutcome> {
    let content_type = content_type_for(path).unwrap_or(MIME_PLAIN);
    let bytes = std::fs::read(path)?;
    let extracted = extract_text_blocking(bytes, content_type.to_string()).await?;

    let title = extracted
        .metadata
        .page_title
        .filter(|t| !t.trim().is_empty())
        .or_else(|| path.file_name().map(|n| n.to_string_lossy().to_string()))
        .unwrap_or_default();

    Ok(cache
        .cache_page(&file_url(path), &extracted.text, &title, "", Utc::now())
        .await?)
}
