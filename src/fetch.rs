//! Page fetcher: download a URL and turn it into a [`FetchedPage`].
//!
//! Every failure mode (network error, timeout, non-2xx status, empty or
//! unsupported body) is reported as an `Err`; the pipeline treats any
//! error as "no text for this URL" and carries on with the other pages.

use async_trait::async_trait;
use chrono::Utc;

use evidence_harness_core::models::FetchedPage;
use evidence_harness_core::RetrievalError;

use crate::config::FetchConfig;
use crate::extract::{extract_text_blocking, truncate_chars};
use crate::http::build_fetch_client;

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, RetrievalError>;
}

/// [`PageFetcher`] over HTTP(S) with a bounded timeout and redirect count.
pub struct HttpFetcher {
    client: reqwest::Client,
    per_page_chars: usize,
    max_body_bytes: usize,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig, per_page_chars: usize) -> Result<Self, RetrievalError> {
        Ok(Self {
            client: build_fetch_client(config)?,
            per_page_chars,
            max_body_bytes: config.max_body_bytes,
        })
    }
}

/// Read at most `limit` bytes of the body; the remainder is never pulled.
async fn read_capped(mut resp: reqwest::Response, limit: usize) -> Result<Vec<u8>, RetrievalError> {
    let mut body = Vec::with_capacity(resp.content_length().map_or(0, |n| n as usize).min(limit));
    while let Some(chunk) = resp
        .chunk()
        .await
        .map_err(|e| RetrievalError::FetchFailure(e.to_string()))?
    {
        let room = limit - body.len();
        if chunk.len() >= room {
            body.extend_from_slice(&chunk[..room]);
            tracing::debug!(url = %resp.url(), limit, "body truncated at byte limit");
            break;
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, RetrievalError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RetrievalError::FetchFailure(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RetrievalError::FetchFailure(format!("HTTP {}", status)));
        }

        let header = |name: reqwest::header::HeaderName| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header(reqwest::header::CONTENT_TYPE).unwrap_or_default();
        let last_modified = header(reqwest::header::LAST_MODIFIED);

        let bytes = read_capped(resp, self.max_body_bytes).await?;
        let extracted = extract_text_blocking(bytes, content_type.clone()).await?;

        Ok(FetchedPage {
            clean_text: truncate_chars(&extracted.text, self.per_page_chars),
            status_code: status.as_u16(),
            content_type,
            last_modified,
            fetch_timestamp: Utc::now(),
            metadata: extracted.metadata,
        })
    }
}
