//! Query normalizer: arbitrary tool payload → `{queries, claim}`.
//!
//! Callers hand the pipeline whatever their model produced: a JSON object,
//! a JSON string inside a `prompt` field, a fenced code block, a
//! `QUERIES:` / `CLAIM:` outline or plain lines of text. This module turns
//! all of those into a [`ParsedQueries`].
//!
//! # Resolution order
//!
//! 1. Structured keys: a `queries` field (array, or a string that itself
//!    parses), with an optional string `claim`.
//! 2. Alias keys: `query`, `q`, `search`, `searches`, `questions`.
//! 3. Free-text fields `prompt`, `input`, `body`, `data`, `text` (or the
//!    raw string payload), each run through [`STRATEGIES`] after stripping
//!    one fenced code block.
//! 4. A `claim:` line in the text fills the claim if still missing.
//!
//! Post-processing always trims, collapses whitespace, drops empties,
//! deduplicates (first occurrence wins) and caps at
//! [`NormalizeOptions::max_queries`].
//!
//! # Example
//!
//! ```rust
//! use evidence_harness_core::normalize::{normalize_text, NormalizeOptions};
//!
//! let out = normalize_text("QUERIES:\n- a\n- b\nCLAIM: c", &NormalizeOptions::default()).unwrap();
//! assert_eq!(out.queries, vec!["a", "b"]);
//! assert_eq!(out.claim.as_deref(), Some("c"));
//! ```

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::error::{Result, RetrievalError};
use crate::models::ParsedQueries;

/// Keys treated as a synonym for `queries`.
pub const QUERY_ALIASES: &[&str] = &["query", "q", "search", "searches", "questions"];

/// Fields scanned for free text, in order.
pub const TEXT_FIELDS: &[&str] = &["prompt", "input", "body", "data", "text"];

/// Marker used by fact-checking prompts in front of the claim.
const CLAIM_TO_EVALUATE: &str = "CLAIM TO EVALUATE:";

const FALLBACK_SOURCE_CHARS: usize = 200;
const FALLBACK_MAX_WORDS: usize = 10;
const MAX_LINE_QUERIES: usize = 20;
const MIN_LINE_QUERY_CHARS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub max_queries: usize,
    /// When set, an empty result is an error instead of a fallback query.
    pub strict: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            max_queries: 5,
            strict: false,
        }
    }
}

/// A free-text parser: returns `Some` only if it recognised its shape.
pub type Strategy = fn(&str) -> Option<ParsedQueries>;

/// Free-text strategies in priority order.
pub const STRATEGIES: &[(&str, Strategy)] = &[
    ("json_document", json_document),
    ("queries_block", queries_block),
    ("embedded_json_array", embedded_json_array),
    ("alias_lines", alias_lines),
    ("line_per_query", line_per_query),
];

/// Normalize a tool-call payload.
pub fn normalize_payload(payload: &Value, opts: &NormalizeOptions) -> Result<ParsedQueries> {
    match payload {
        Value::String(s) => normalize_text(s, opts),
        Value::Array(_) => {
            let parsed = ParsedQueries::new(string_list(payload), None);
            finalize(parsed, None, opts)
        }
        Value::Object(map) => normalize_object(map, opts),
        _ => Err(RetrievalError::InvalidInput(
            "payload must be an object or a string".to_string(),
        )),
    }
}

/// Normalize a bare free-text payload.
pub fn normalize_text(text: &str, opts: &NormalizeOptions) -> Result<ParsedQueries> {
    let parsed = parse_text(text).unwrap_or_default();
    finalize(parsed, Some(text), opts)
}

fn normalize_object(map: &Map<String, Value>, opts: &NormalizeOptions) -> Result<ParsedQueries> {
    let texts: Vec<&str> = TEXT_FIELDS
        .iter()
        .filter_map(|f| map.get(*f).and_then(Value::as_str))
        .collect();

    let mut parsed = structured_object(map)
        .or_else(|| {
            TEXT_FIELDS.iter().find_map(|f| match map.get(*f) {
                Some(Value::String(s)) => parse_text(s),
                Some(Value::Object(inner)) => structured_object(inner),
                _ => None,
            })
        })
        .unwrap_or_default();

    if parsed.claim.is_none() {
        parsed.claim = texts.iter().find_map(|t| extract_claim(t));
    }

    finalize(parsed, texts.first().copied(), opts)
}

/// `queries` / alias keys of a JSON object.
fn structured_object(map: &Map<String, Value>) -> Option<ParsedQueries> {
    let claim = map
        .get("claim")
        .and_then(Value::as_str)
        .map(str::to_string);

    if let Some(q) = map.get("queries") {
        let queries = match q {
            Value::String(s) => parse_text(s).map(|p| p.queries).unwrap_or_default(),
            other => string_list(other),
        };
        if !queries.is_empty() {
            return Some(ParsedQueries::new(queries, claim));
        }
    }

    QUERY_ALIASES.iter().find_map(|alias| {
        let queries = string_list(map.get(*alias)?);
        (!queries.is_empty()).then(|| ParsedQueries::new(queries, claim.clone()))
    })
}

/// Strings from a string or an array of strings (other items skipped).
fn string_list(v: &Value) -> Vec<String> {
    match v {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Run [`STRATEGIES`] over `raw`, first non-empty match wins.
fn parse_text(raw: &str) -> Option<ParsedQueries> {
    let text = strip_code_fence(raw);
    let mut parsed = STRATEGIES.iter().find_map(|(name, strategy)| {
        let p = strategy(text).filter(|p| !p.queries.is_empty())?;
        tracing::debug!(strategy = name, queries = p.queries.len(), "parsed free-text payload");
        Some(p)
    })?;
    if parsed.claim.is_none() {
        parsed.claim = extract_claim(text);
    }
    Some(parsed)
}

/// Remove one leading and trailing ``` fence, including its info string.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// The whole text is a JSON object or array.
pub fn json_document(text: &str) -> Option<ParsedQueries> {
    match serde_json::from_str::<Value>(text.trim()).ok()? {
        Value::Object(map) => structured_object(&map),
        v @ Value::Array(_) => Some(ParsedQueries::new(string_list(&v), None)),
        _ => None,
    }
}

/// A `QUERIES:` header followed by bullet, numbered or plain lines.
///
/// The block ends at the next header line such as `CLAIM:`.
pub fn queries_block(text: &str) -> Option<ParsedQueries> {
    let mut lines = text.lines();
    let first = lines.find(|l| starts_with_ci(l.trim_start(), "queries:"))?;
    let inline = first.trim_start()["queries:".len()..].trim();

    let mut queries = Vec::new();
    if !inline.is_empty() {
        queries.push(strip_list_marker(inline).to_string());
    }
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_header_line(line) {
            break;
        }
        let q = strip_list_marker(line);
        if !q.is_empty() {
            queries.push(q.to_string());
        }
    }
    Some(ParsedQueries::new(queries, None))
}

/// A JSON array of strings embedded somewhere in prose.
pub fn embedded_json_array(text: &str) -> Option<ParsedQueries> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end <= start {
        return None;
    }
    let items: Vec<Value> = serde_json::from_str(&text[start..=end]).ok()?;
    let queries: Vec<String> = items
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();
    Some(ParsedQueries::new(queries, None))
}

/// `key: value` lines whose key is a query alias.
pub fn alias_lines(text: &str) -> Option<ParsedQueries> {
    let queries: Vec<String> = text
        .lines()
        .filter_map(|line| {
            let (key, value) = strip_list_marker(line.trim()).split_once(':')?;
            let key = key.trim().to_ascii_lowercase();
            QUERY_ALIASES
                .contains(&key.as_str())
                .then(|| value.trim().to_string())
        })
        .filter(|v| !v.is_empty())
        .collect();
    (!queries.is_empty()).then(|| ParsedQueries::new(queries, None))
}

/// Last resort: each non-trivial line is one query, if there are 1–20.
pub fn line_per_query(text: &str) -> Option<ParsedQueries> {
    let queries: Vec<String> = text
        .lines()
        .map(|l| strip_list_marker(l.trim()))
        .filter(|l| l.chars().count() >= MIN_LINE_QUERY_CHARS)
        .filter(|l| !starts_with_ci(l, "claim:") && !starts_with_ci(l, "queries:"))
        .map(str::to_string)
        .collect();
    (1..=MAX_LINE_QUERIES)
        .contains(&queries.len())
        .then(|| ParsedQueries::new(queries, None))
}

/// Claim from the first `claim:` line.
///
/// An empty remainder takes the following lines up to the next header.
pub fn extract_claim(text: &str) -> Option<String> {
    let mut lines = text.lines();
    let line = lines.find(|l| starts_with_ci(l.trim_start(), "claim:"))?;
    let rest = line.trim_start()["claim:".len()..].trim();
    let claim = if rest.is_empty() {
        lines
            .map(str::trim)
            .take_while(|l| !is_header_line(l))
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        rest.to_string()
    };
    (!claim.is_empty()).then_some(claim)
}

/// Synthesize one keyword query from a prompt or claim.
///
/// Uses the quoted (or first 200 characters of the) text after
/// `CLAIM TO EVALUATE:` when present, otherwise the first 200 characters;
/// keeps up to ten lower-cased words longer than three characters.
///
/// ```rust
/// use evidence_harness_core::normalize::fallback_query;
///
/// let q = fallback_query(r#"CLAIM TO EVALUATE: "The Moon is made of cheese and is delicious""#);
/// assert_eq!(q, "moon made cheese delicious");
/// ```
pub fn fallback_query(text: &str) -> String {
    let source: String = match text.find(CLAIM_TO_EVALUATE) {
        Some(pos) => {
            let section = text[pos + CLAIM_TO_EVALUATE.len()..].trim();
            quoted(section).unwrap_or_else(|| take_chars(section, FALLBACK_SOURCE_CHARS))
        }
        None => take_chars(text, FALLBACK_SOURCE_CHARS),
    };
    let words: Vec<String> = source
        .to_lowercase()
        .split_whitespace()
        .filter(|w| w.chars().count() > 3)
        .take(FALLBACK_MAX_WORDS)
        .map(str::to_string)
        .collect();
    if words.is_empty() {
        take_chars(&source, FALLBACK_SOURCE_CHARS)
    } else {
        words.join(" ")
    }
}

fn quoted(section: &str) -> Option<String> {
    let open = section.find('"')? + 1;
    let close = section[open..].find('"')? + open;
    (close > open).then(|| section[open..close].to_string())
}

fn take_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn starts_with_ci(s: &str, prefix: &str) -> bool {
    s.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Section labels that end a `QUERIES:` block or a multi-line claim.
const SECTION_LABELS: &[&str] = &[
    "claim",
    "claim to evaluate",
    "queries",
    "context",
    "evidence",
    "notes",
    "question",
    "task",
    "instructions",
];

/// A line that opens a known section, e.g. `CLAIM:` or `Notes: ...`.
///
/// Other `Word:` prefixes are ordinary text, so a query such as
/// `Rust: ownership rules` stays inside the block.
fn is_header_line(line: &str) -> bool {
    line.split_once(':').is_some_and(|(label, _)| {
        let label = label.trim();
        SECTION_LABELS.iter().any(|known| known.eq_ignore_ascii_case(label))
    })
}

/// Strip `-`, `*`, `•`, `1.` or `1)` list markers.
fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();
    for bullet in ["-", "*", "•"] {
        if let Some(rest) = line.strip_prefix(bullet) {
            return rest.trim_start();
        }
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return rest.trim_start();
        }
    }
    line
}

/// Clean, dedupe and cap; substitute a fallback query when allowed.
fn finalize(
    parsed: ParsedQueries,
    fallback_text: Option<&str>,
    opts: &NormalizeOptions,
) -> Result<ParsedQueries> {
    let mut seen = HashSet::new();
    let mut queries: Vec<String> = parsed
        .queries
        .iter()
        .map(|q| collapse_whitespace(q))
        .filter(|q| !q.is_empty())
        .filter(|q| seen.insert(q.clone()))
        .collect();

    let max = opts.max_queries.max(1);
    if queries.len() > max {
        tracing::warn!(
            requested = queries.len(),
            kept = max,
            "too many queries, discarding the excess"
        );
        queries.truncate(max);
    }

    let claim = parsed
        .claim
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    if queries.is_empty() {
        if opts.strict {
            return Err(RetrievalError::InvalidInput(
                "no usable query in payload".to_string(),
            ));
        }
        let source = claim
            .as_deref()
            .or(fallback_text)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RetrievalError::InvalidInput("payload contains no text".to_string()))?;
        let q = collapse_whitespace(&fallback_query(source));
        if q.is_empty() {
            return Err(RetrievalError::InvalidInput(
                "no usable query in payload".to_string(),
            ));
        }
        tracing::warn!(query = %q, "no queries found, using fallback query");
        queries.push(q);
    }

    Ok(ParsedQueries { queries, claim })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn opts() -> NormalizeOptions {
        NormalizeOptions::default()
    }

    fn strict() -> NormalizeOptions {
        NormalizeOptions {
            strict: true,
            ..NormalizeOptions::default()
        }
    }

    #[test]
    fn test_direct_queries() {
        let out = normalize_payload(&json!({"queries": ["ant", "bee"], "claim": "c"}), &opts()).unwrap();
        assert_eq!(out.queries, vec!["ant", "bee"]);
        assert_eq!(out.claim.as_deref(), Some("c"));
    }

    #[test]
    fn test_nested_json_string() {
        let payload = json!({"prompt": r#"{"queries":["a","b"],"claim":"x"}"#});
        let out = normalize_payload(&payload, &opts()).unwrap();
        assert_eq!(
            out,
            ParsedQueries::new(vec!["a".into(), "b".into()], Some("x".into()))
        );
    }

    #[test]
    fn test_code_fenced_json() {
        let payload = json!({"prompt": "```json\n{\"queries\":[\"a\",\"b\"]}\n```"});
        let out = normalize_payload(&payload, &opts()).unwrap();
        assert_eq!(out.queries, vec!["a", "b"]);
    }

    #[test]
    fn test_bullet_list_with_claim() {
        let out = normalize_payload(&json!({"prompt": "QUERIES:\n- a\n- b\nCLAIM: c"}), &opts()).unwrap();
        assert_eq!(
            out,
            ParsedQueries::new(vec!["a".into(), "b".into()], Some("c".into()))
        );
    }

    #[test]
    fn test_numbered_block_with_multiline_claim() {
        let text = "QUERIES:\n1. first query\n- second query\nCLAIM:\nThis is the claim";
        let out = normalize_text(text, &opts()).unwrap();
        assert_eq!(out.queries, vec!["first query", "second query"]);
        assert_eq!(out.claim.as_deref(), Some("This is the claim"));
    }

    #[test]
    fn test_labelled_query_stays_in_block() {
        let text = "QUERIES:\n- Rust: ownership rules\n- Borrow checker: lifetimes\nNotes: ignore\nCLAIM: c";
        let out = normalize_text(text, &opts()).unwrap();
        assert_eq!(out.queries, vec!["Rust: ownership rules", "Borrow checker: lifetimes"]);
        assert_eq!(out.claim.as_deref(), Some("c"));
    }

    #[test]
    fn test_known_labels_end_multiline_claim() {
        let text = "CLAIM:\nTokio: a runtime\nis fast\nContext: benchmarks";
        assert_eq!(extract_claim(text).as_deref(), Some("Tokio: a runtime is fast"));
        assert!(is_header_line("CLAIM TO EVALUATE: x"));
        assert!(!is_header_line("Rust: ownership rules"));
    }

    #[test]
    fn test_newline_list() {
        let out = normalize_payload(&json!({"prompt": "alpha\nbeta"}), &opts()).unwrap();
        assert_eq!(out.queries, vec!["alpha", "beta"]);
        assert_eq!(out.claim, None);
    }

    #[test]
    fn test_single_query_alias() {
        let out = normalize_payload(&json!({"query": "a"}), &opts()).unwrap();
        assert_eq!(out.queries, vec!["a"]);
        let out = normalize_payload(&json!({"questions": ["x", "y"]}), &opts()).unwrap();
        assert_eq!(out.queries, vec!["x", "y"]);
    }

    #[test]
    fn test_query_cap_keeps_first_in_order() {
        let many: Vec<String> = (0..10).map(|i| format!("q{}", i)).collect();
        let out = normalize_payload(&json!({ "queries": many }), &opts()).unwrap();
        assert_eq!(out.queries, vec!["q0", "q1", "q2", "q3", "q4"]);
    }

    #[test]
    fn test_dedupe_and_whitespace_collapse() {
        let payload = json!({"queries": ["  solar   power ", "solar power", "", "wind"]});
        let out = normalize_payload(&payload, &opts()).unwrap();
        assert_eq!(out.queries, vec!["solar power", "wind"]);
    }

    #[test]
    fn test_empty_payload_is_invalid() {
        for o in [opts(), strict()] {
            let err = normalize_payload(&json!({}), &o).unwrap_err();
            assert!(matches!(err, RetrievalError::InvalidInput(_)));
        }
        assert!(normalize_payload(&json!(42), &opts()).is_err());
        assert!(normalize_text("", &strict()).is_err());
    }

    #[test]
    fn test_strict_rejects_unparseable_text() {
        let text = "x\ny";
        assert!(matches!(
            normalize_text(text, &strict()),
            Err(RetrievalError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_lenient_falls_back_to_keywords() {
        // Every line is shorter than three characters.
        let text = "is\nit\nok";
        let out = normalize_text(text, &opts()).unwrap();
        assert_eq!(out.queries.len(), 1);
    }

    #[test]
    fn test_fallback_query_from_claim_to_evaluate() {
        let prompt = r#"CLAIM TO EVALUATE: "The Moon is made of cheese and is delicious""#;
        assert_eq!(fallback_query(prompt), "moon made cheese delicious");
        assert_eq!(
            fallback_query("Water boils at one hundred degrees"),
            "water boils hundred degrees"
        );
        assert_eq!(fallback_query("a b c"), "a b c");
    }

    #[test]
    fn test_too_many_lines_is_not_a_list() {
        let text: String = (0..25).map(|i| format!("line number {}\n", i)).collect();
        assert!(line_per_query(&text).is_none());
        let out = normalize_text(&text, &opts()).unwrap();
        assert_eq!(
            out.queries,
            vec!["line number line number line number line number line number"]
        );
    }

    #[test]
    fn test_embedded_array_in_prose() {
        let text = r#"Here are the searches: ["rust async", "tokio runtime"] thanks"#;
        let out = normalize_text(text, &opts()).unwrap();
        assert_eq!(out.queries, vec!["rust async", "tokio runtime"]);
    }

    #[test]
    fn test_alias_lines() {
        let text = "search: first topic\nq: second topic\nnotes: ignored";
        let out = normalize_text(text, &opts()).unwrap();
        assert_eq!(out.queries, vec!["first topic", "second topic"]);
    }

    #[test]
    fn test_claim_line_not_used_as_query() {
        let text = "ocean acidification rates\nclaim: oceans are getting more acidic";
        let out = normalize_text(text, &opts()).unwrap();
        assert_eq!(out.queries, vec!["ocean acidification rates"]);
        assert_eq!(out.claim.as_deref(), Some("oceans are getting more acidic"));
    }

    #[test]
    fn test_queries_field_as_string() {
        let payload = json!({"queries": "[\"a\", \"b\"]", "claim": "z"});
        let out = normalize_payload(&payload, &opts()).unwrap();
        assert_eq!(out.queries, vec!["a", "b"]);
        assert_eq!(out.claim.as_deref(), Some("z"));
    }

    #[test]
    fn test_claim_from_text_field_when_structured() {
        let payload = json!({"queries": ["a"], "prompt": "CLAIM: from prompt"});
        let out = normalize_payload(&payload, &opts()).unwrap();
        assert_eq!(out.claim.as_deref(), Some("from prompt"));
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```\nabc\n```"), "abc");
        assert_eq!(strip_code_fence("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("plain"), "plain");
    }
}
