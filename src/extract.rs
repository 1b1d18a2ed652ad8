//! Text and metadata extraction for fetched documents.
//!
//! Dispatches on the response media type:
//!
//! | Media type | Extraction |
//! |------------|------------|
//! | `text/html`, `application/xhtml+xml` | Boilerplate removal, then generic text fallback |
//! | `text/plain`, `text/markdown` | Body as-is |
//! | `application/pdf` | `pdf-extract` |
//!
//! Anything else is an [`RetrievalError::ExtractionFailure`].

use scraper::{ElementRef, Html, Selector};

use evidence_harness_core::models::PageMetadata;
use evidence_harness_core::RetrievalError;

pub const MIME_HTML: &str = "text/html";
pub const MIME_XHTML: &str = "application/xhtml+xml";
pub const MIME_PLAIN: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_PDF: &str = "application/pdf";

/// Below this many characters the boilerplate pass is distrusted.
pub const MIN_MAIN_TEXT_CHARS: usize = 200;

/// Elements never considered part of the main text.
const BOILERPLATE_TAGS: &[&str] = &[
    "script", "style", "noscript", "nav", "header", "footer", "aside", "form", "svg", "iframe",
    "table", "template",
];

/// Elements whose text is never visible.
const INVISIBLE_TAGS: &[&str] = &["script", "style", "noscript", "template"];

const CONTENT_SELECTORS: &[&str] = &["article", "main", "[role=\"main\"]", "body"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    pub metadata: PageMetadata,
}

/// Media type without parameters, lower-cased.
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Extract text from a response body of the given content type.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<ExtractedText, RetrievalError> {
    let mime = media_type(content_type);
    let extracted = match mime.as_str() {
        MIME_HTML | MIME_XHTML | "" => extract_html(&String::from_utf8_lossy(bytes)),
        MIME_PLAIN | MIME_MARKDOWN => ExtractedText {
            text: normalise_whitespace(&String::from_utf8_lossy(bytes)),
            metadata: PageMetadata::default(),
        },
        MIME_PDF => ExtractedText {
            text: normalise_whitespace(&extract_pdf(bytes)?),
            metadata: PageMetadata::default(),
        },
        other => {
            return Err(RetrievalError::ExtractionFailure(format!(
                "unsupported content-type: {}",
                other
            )))
        }
    };

    if extracted.text.is_empty() {
        return Err(RetrievalError::ExtractionFailure(
            "no extractable text".to_string(),
        ));
    }
    Ok(extracted)
}

/// [`extract_text`] on the blocking pool.
///
/// PDF and HTML parsing is CPU-bound and `pdf-extract` can panic on
/// malformed input; a panic becomes an `ExtractionFailure` for this
/// document only.
pub async fn extract_text_blocking(
    bytes: Vec<u8>,
    content_type: String,
) -> Result<ExtractedText, RetrievalError> {
    tokio::task::spawn_blocking(move || extract_text(&bytes, &content_type))
        .await
        .map_err(|e| {
            let reason = if e.is_panic() { "extractor panicked" } else { "extraction cancelled" };
            RetrievalError::ExtractionFailure(reason.to_string())
        })?
}

fn extract_pdf(bytes: &[u8]) -> Result<String, RetrievalError> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| RetrievalError::ExtractionFailure(format!("PDF extraction failed: {}", e)))
}

/// Main text and head metadata of an HTML page.
///
/// The boilerplate pass keeps the first non-empty `article`, `main`,
/// `[role=main]` or `body` element minus navigation, tables and similar
/// chrome. When that leaves fewer than [`MIN_MAIN_TEXT_CHARS`] characters
/// the whole document's visible text is used instead.
pub fn extract_html(html: &str) -> ExtractedText {
    let document = Html::parse_document(html);

    let main = normalise_whitespace(&main_text(&document));
    let text = if main.chars().count() >= MIN_MAIN_TEXT_CHARS {
        main
    } else {
        tracing::debug!(chars = main.chars().count(), "main text too short, using full page text");
        let mut all = String::new();
        collect_text(document.root_element(), INVISIBLE_TAGS, &mut all);
        let all = normalise_whitespace(&all);
        if all.chars().count() > main.chars().count() {
            all
        } else {
            main
        }
    };

    ExtractedText {
        text,
        metadata: extract_metadata(&document),
    }
}

fn main_text(document: &Html) -> String {
    for selector_str in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        if let Some(element) = document.select(&selector).next() {
            let mut text = String::new();
            collect_text(element, BOILERPLATE_TAGS, &mut text);
            if !text.trim().is_empty() {
                return text;
            }
        }
    }
    String::new()
}

/// Append text nodes under `element`, skipping `skip` subtrees and comments.
fn collect_text(element: ElementRef<'_>, skip: &[&str], out: &mut String) {
    for child in element.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            if !skip.contains(&child_el.value().name()) {
                collect_text(child_el, skip, out);
            }
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        }
    }
}

/// Title plus author/date/description from `name` or `property` meta tags.
///
/// The first non-empty value for each field wins.
pub fn extract_metadata(document: &Html) -> PageMetadata {
    let mut meta = PageMetadata {
        page_title: select_text(document, "title"),
        ..Default::default()
    };

    let Ok(selector) = Selector::parse("meta") else {
        return meta;
    };
    for el in document.select(&selector) {
        let attrs = el.value();
        let content = attrs.attr("content").map(str::trim).unwrap_or("");
        if content.is_empty() {
            continue;
        }
        let name = attrs.attr("name").unwrap_or("").to_ascii_lowercase();
        let property = attrs.attr("property").unwrap_or("").to_ascii_lowercase();

        let slot = match (name.as_str(), property.as_str()) {
            ("author", _) | (_, "article:author") => &mut meta.meta_author,
            ("date" | "publish-date" | "pubdate", _) | (_, "article:published_time") => {
                &mut meta.meta_date
            }
            ("description", _) | (_, "og:description") => &mut meta.meta_description,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(content.to_string());
        }
    }
    meta
}

fn select_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    let text = document
        .select(&selector)
        .next()?
        .text()
        .collect::<String>();
    let text = normalise_whitespace(&text);
    (!text.is_empty()).then_some(text)
}

/// Collapse runs of spaces to one and blank-line runs to one blank line.
pub fn normalise_whitespace(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut blank_run = 0;
    for line in text.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            blank_run += 1;
            if blank_run == 1 && !lines.is_empty() {
                lines.push(String::new());
            }
        } else {
            blank_run = 0;
            lines.push(collapsed);
        }
    }
    lines.join("\n").trim().to_string()
}

/// Cut `text` to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
