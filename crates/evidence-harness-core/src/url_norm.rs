//! URL normalization for cache keys and domain extraction.

use url::Url;

/// Normalize a URL for use as a cache key.
///
/// Strips the fragment and any trailing slashes so that two fetches of the
/// same resource collide in the cache.
///
/// ```rust
/// use evidence_harness_core::url_norm::normalize_url;
///
/// assert_eq!(normalize_url("https://a.com/x/#top"), "https://a.com/x");
/// ```
pub fn normalize_url(url: &str) -> String {
    let without_fragment = url.split('#').next().unwrap_or("");
    without_fragment.trim().trim_end_matches('/').to_string()
}

/// Network location of a URL (`host` or `host:port`), or `""` if unparsable.
pub fn domain_of(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return String::new();
    };
    match (parsed.host_str(), parsed.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_fragment_and_trailing_slash() {
        assert_eq!(
            normalize_url("https://example.com/page/#section"),
            "https://example.com/page"
        );
        assert_eq!(normalize_url("https://example.com//"), "https://example.com");
        assert_eq!(
            normalize_url("https://example.com/a?b=1"),
            "https://example.com/a?b=1"
        );
    }

    #[test]
    fn test_same_resource_collides() {
        assert_eq!(
            normalize_url("https://example.com/doc"),
            normalize_url("https://example.com/doc/#intro")
        );
    }

    #[test]
    fn test_domain_of() {
        assert_eq!(domain_of("https://www.example.com/x"), "www.example.com");
        assert_eq!(domain_of("http://127.0.0.1:8080/x"), "127.0.0.1:8080");
        assert_eq!(domain_of("https://example.com:443/"), "example.com");
        assert_eq!(domain_of("not a url"), "");
        assert_eq!(domain_of("file:///tmp/a.txt"), "");
    }
}
