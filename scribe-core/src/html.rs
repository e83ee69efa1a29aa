//! Markup (de)serialization for document snapshots.
//!
//! The snapshot format is a small HTML subset: `p`, `h1`–`h3` blocks with
//! `strong`, `em` and `u` inline marks. Serialization is canonical (runs are
//! split at mark boundaries and tags are always nested in `MarkKind` order),
//! so two documents with equal content serialize to equal strings, which is
//! what echo suppression compares.
//!
//! Input that is not markup is read as plain text, one paragraph per line.

use crate::block::{Block, BlockKind};
use crate::model::{MarkAttrs, MarkKind};

pub(crate) fn serialize(blocks: &[Block]) -> String {
    let mut out = String::new();
    for block in blocks {
        let tag = block.kind.tag();
        out.push('<');
        out.push_str(tag);
        out.push('>');
        serialize_inline(block, &mut out);
        out.push_str("</");
        out.push_str(tag);
        out.push('>');
    }
    out
}

fn serialize_inline(block: &Block, out: &mut String) {
    let formatting: Vec<_> = block
        .spans
        .iter()
        .filter(|s| !s.kind.is_overlay())
        .collect();

    let mut bounds: Vec<usize> = vec![0, block.len()];
    for span in &formatting {
        bounds.push(span.start);
        bounds.push(span.end);
    }
    bounds.sort_unstable();
    bounds.dedup();

    let mut runs: Vec<(Vec<MarkKind>, String)> = Vec::new();
    for pair in bounds.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        if start >= end {
            continue;
        }
        let mut active: Vec<MarkKind> = formatting
            .iter()
            .filter(|s| s.start <= start && s.end >= end)
            .map(|s| s.kind)
            .collect();
        active.sort();
        active.dedup();
        let text: String = block.chars[start..end].iter().collect();
        if let Some((kinds, run)) = runs.last_mut() {
            if *kinds == active {
                run.push_str(&text);
                continue;
            }
        }
        runs.push((active, text));
    }

    for (kinds, text) in runs {
        for kind in &kinds {
            if let Some(tag) = kind.tag() {
                out.push('<');
                out.push_str(tag);
                out.push('>');
            }
        }
        escape_into(&text, out);
        for kind in kinds.iter().rev() {
            if let Some(tag) = kind.tag() {
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

fn escape_into(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}

fn inline_kind(tag: &str) -> Option<MarkKind> {
    match tag {
        "strong" | "b" => Some(MarkKind::Bold),
        "em" | "i" => Some(MarkKind::Italic),
        "u" => Some(MarkKind::Underline),
        _ => None,
    }
}

/// Parse a snapshot. Never fails: non-markup input becomes plain paragraphs.
/// The result always holds at least one block.
pub(crate) fn parse(input: &str) -> Vec<Block> {
    if !input.trim_start().starts_with('<') {
        return plain_blocks(input);
    }

    let mut blocks: Vec<Block> = Vec::new();
    let mut current: Option<Block> = None;
    let mut active: Vec<MarkKind> = Vec::new();
    let mut rest = input;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('<') {
            let Some(close) = after.find('>') else {
                // Unterminated tag: keep it as text.
                push_text(&mut current, &active, &unescape(rest));
                break;
            };
            let raw = after[..close].trim();
            rest = &after[close + 1..];

            let closing = raw.starts_with('/');
            let name = raw
                .trim_start_matches('/')
                .split(|c: char| c.is_whitespace() || c == '/')
                .next()
                .unwrap_or_default()
                .to_ascii_lowercase();

            if let Some(kind) = BlockKind::from_tag(&name) {
                if closing {
                    if let Some(block) = current.take() {
                        blocks.push(block);
                    }
                } else {
                    if let Some(block) = current.take() {
                        blocks.push(block);
                    }
                    current = Some(Block::new(kind));
                }
                active.clear();
            } else if let Some(kind) = inline_kind(&name) {
                if closing {
                    if let Some(idx) = active.iter().rposition(|k| *k == kind) {
                        active.remove(idx);
                    }
                } else {
                    active.push(kind);
                }
            }
            // Anything else (span, br, a...) is dropped; its text is kept.
        } else {
            let end = rest.find('<').unwrap_or(rest.len());
            let text = unescape(&rest[..end]);
            rest = &rest[end..];
            if current.is_none() && text.trim().is_empty() {
                continue;
            }
            push_text(&mut current, &active, &text);
        }
    }

    if let Some(block) = current.take() {
        blocks.push(block);
    }
    if blocks.is_empty() {
        blocks.push(Block::new(BlockKind::Paragraph));
    }
    blocks
}

fn push_text(current: &mut Option<Block>, active: &[MarkKind], text: &str) {
    let block = current.get_or_insert_with(|| Block::new(BlockKind::Paragraph));
    let chars: Vec<char> = text.chars().collect();
    let start = block.len();
    block.chars.extend_from_slice(&chars);
    let end = block.len();
    for kind in active {
        block.add_span(*kind, start, end, MarkAttrs::new());
    }
}

fn plain_blocks(input: &str) -> Vec<Block> {
    if input.is_empty() {
        return vec![Block::new(BlockKind::Paragraph)];
    }
    input.split('\n').map(Block::paragraph).collect()
}
