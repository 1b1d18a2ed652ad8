//! Character-budgeted assembly of the evidence text.
//!
//! Each source becomes a citation block
//! `"[SOURCE <id>] <title>\n<url>\n\n<text>\n\n"`. Blocks are appended in
//! order until the global budget is used up; the block that crosses the
//! boundary is cut to fill the budget exactly and nothing follows it.
//! Lengths are counted in characters.

use crate::models::Source;

/// One citation block to be assembled.
#[derive(Clone, Copy)]
pub struct EvidenceBlock<'a> {
    pub id: &'a dyn std::fmt::Display,
    pub title: &'a str,
    pub url: &'a str,
    pub text: &'a str,
}

impl<'a> From<&'a Source> for EvidenceBlock<'a> {
    fn from(s: &'a Source) -> Self {
        Self {
            id: &s.id,
            title: &s.title,
            url: &s.url,
            text: &s.text,
        }
    }
}

impl EvidenceBlock<'_> {
    pub fn render(&self) -> String {
        format!(
            "[SOURCE {}] {}\n{}\n\n{}\n\n",
            self.id, self.title, self.url, self.text
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssembledEvidence {
    pub merged_text: String,
    /// Characters consumed, never more than the budget.
    pub character_count: usize,
    /// Number of blocks that made it in, including a truncated last one.
    pub sources_included: usize,
}

/// Append blocks in order until `total_chars` characters are used.
pub fn assemble<'a, I>(blocks: I, total_chars: usize) -> AssembledEvidence
where
    I: IntoIterator<Item = EvidenceBlock<'a>>,
{
    let mut out = AssembledEvidence::default();
    for block in blocks {
        let remaining = total_chars.saturating_sub(out.character_count);
        if remaining == 0 {
            break;
        }
        let rendered = block.render();
        let len = rendered.chars().count();
        if len > remaining {
            out.merged_text.extend(rendered.chars().take(remaining));
            out.character_count += remaining;
        } else {
            out.merged_text.push_str(&rendered);
            out.character_count += len;
        }
        out.sources_included += 1;
    }
    out
}
