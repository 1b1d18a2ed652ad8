//! Shared HTTP client construction and header rotation.
//!
//! Metasearch requests carry a randomized browser User-Agent and
//! Accept-Language so simplistic bot detection on the aggregator does
//! not answer with an HTML challenge page.

use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use std::time::Duration;

use evidence_harness_core::RetrievalError;

use crate::config::{FetchConfig, SearchConfig};

/// Browser User-Agent strings, rotated per request.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_2) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

const ACCEPT_LANGUAGES: &[&str] = &[
    "en-US,en;q=0.9",
    "en-GB,en;q=0.9",
    "en-US,en;q=0.8,de;q=0.5",
    "en;q=0.9,fr;q=0.6",
];

pub fn random_user_agent() -> &'static str {
    let mut rng = rand::thread_rng();
    USER_AGENTS.choose(&mut rng).copied().unwrap_or(USER_AGENTS[0])
}

pub fn random_accept_language() -> &'static str {
    let mut rng = rand::thread_rng();
    ACCEPT_LANGUAGES
        .choose(&mut rng)
        .copied()
        .unwrap_or(ACCEPT_LANGUAGES[0])
}

/// Per-request headers for a metasearch call.
pub fn search_headers(config: &SearchConfig) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let ua = config
        .user_agent
        .as_deref()
        .unwrap_or_else(|| random_user_agent());
    if let Ok(v) = HeaderValue::from_str(ua) {
        headers.insert(USER_AGENT, v);
    }
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static(random_accept_language()),
    );
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers
}

/// Client for the metasearch endpoint.
pub fn build_search_client(config: &SearchConfig) -> Result<reqwest::Client, RetrievalError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| RetrievalError::SearchUnavailable(format!("failed to build HTTP client: {e}")))
}

/// Client for page fetches: short timeout, bounded redirects.
pub fn build_fetch_client(config: &FetchConfig) -> Result<reqwest::Client, RetrievalError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| RetrievalError::FetchFailure(format!("failed to build HTTP client: {e}")))
}
