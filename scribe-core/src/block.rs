//! Block nodes and their inline mark spans.

use crate::model::{MarkAttrs, MarkKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Paragraph,
    /// Heading level 1–3.
    Heading(u8),
}

impl BlockKind {
    pub(crate) fn tag(self) -> &'static str {
        match self {
            BlockKind::Paragraph => "p",
            BlockKind::Heading(1) => "h1",
            BlockKind::Heading(2) => "h2",
            BlockKind::Heading(_) => "h3",
        }
    }

    pub(crate) fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "p" | "div" => Some(BlockKind::Paragraph),
            "h1" => Some(BlockKind::Heading(1)),
            "h2" => Some(BlockKind::Heading(2)),
            "h3" | "h4" | "h5" | "h6" => Some(BlockKind::Heading(3)),
            _ => None,
        }
    }
}

/// A mark over block-local character offsets, half-open.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Span {
    pub kind: MarkKind,
    pub start: usize,
    pub end: usize,
    pub attrs: MarkAttrs,
}

/// A text block: kind, characters, and the marks laid over them.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub(crate) kind: BlockKind,
    pub(crate) chars: Vec<char>,
    pub(crate) spans: Vec<Span>,
}

impl Block {
    pub fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            chars: Vec::new(),
            spans: Vec::new(),
        }
    }

    pub fn paragraph(text: &str) -> Self {
        Self {
            kind: BlockKind::Paragraph,
            chars: text.chars().collect(),
            spans: Vec::new(),
        }
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn text(&self) -> String {
        self.chars.iter().collect()
    }

    /// Insert characters at `at`. A mark ending exactly at `at` grows over
    /// the inserted text; one starting there is pushed right.
    pub(crate) fn insert(&mut self, at: usize, chars: &[char]) {
        let n = chars.len();
        if n == 0 {
            return;
        }
        self.chars.splice(at..at, chars.iter().copied());
        for span in &mut self.spans {
            if span.start >= at {
                span.start += n;
                span.end += n;
            } else if span.end >= at {
                span.end += n;
            }
        }
    }

    /// Remove characters in `[start, end)`, collapsing marks inside it.
    pub(crate) fn remove(&mut self, start: usize, end: usize) {
        if start >= end {
            return;
        }
        self.chars.drain(start..end);
        let removed = end - start;
        let map = |x: usize| {
            if x <= start {
                x
            } else if x <= end {
                start
            } else {
                x - removed
            }
        };
        for span in &mut self.spans {
            span.start = map(span.start);
            span.end = map(span.end);
        }
        self.spans.retain(|s| s.start < s.end);
    }

    /// Split at `at`, returning the tail. Splitting a heading at its very end
    /// starts a plain paragraph.
    pub(crate) fn split_off(&mut self, at: usize) -> Block {
        let kind = if at == self.chars.len() {
            BlockKind::Paragraph
        } else {
            self.kind
        };
        let tail_chars = self.chars.split_off(at);
        let mut head_spans = Vec::new();
        let mut tail_spans = Vec::new();
        for span in self.spans.drain(..) {
            if span.end <= at {
                head_spans.push(span);
            } else if span.start >= at {
                tail_spans.push(Span {
                    start: span.start - at,
                    end: span.end - at,
                    ..span
                });
            } else {
                tail_spans.push(Span {
                    kind: span.kind,
                    start: 0,
                    end: span.end - at,
                    attrs: span.attrs.clone(),
                });
                head_spans.push(Span { end: at, ..span });
            }
        }
        self.spans = head_spans;
        Block {
            kind,
            chars: tail_chars,
            spans: tail_spans,
        }
    }

    /// Append another block's content (used when a deletion joins blocks).
    pub(crate) fn append(&mut self, other: Block) {
        let offset = self.chars.len();
        self.chars.extend(other.chars);
        self.spans.extend(other.spans.into_iter().map(|s| Span {
            start: s.start + offset,
            end: s.end + offset,
            ..s
        }));
        self.normalize();
    }

    pub(crate) fn add_span(&mut self, kind: MarkKind, start: usize, end: usize, attrs: MarkAttrs) {
        if start >= end {
            return;
        }
        self.spans.push(Span {
            kind,
            start,
            end,
            attrs,
        });
        self.normalize();
    }

    /// Cut `[start, end)` out of every span of `kind`.
    pub(crate) fn remove_span_range(&mut self, kind: MarkKind, start: usize, end: usize) {
        let mut kept = Vec::with_capacity(self.spans.len());
        for span in self.spans.drain(..) {
            if span.kind != kind || span.end <= start || span.start >= end {
                kept.push(span);
                continue;
            }
            if span.start < start {
                kept.push(Span {
                    kind,
                    start: span.start,
                    end: start,
                    attrs: span.attrs.clone(),
                });
            }
            if span.end > end {
                kept.push(Span {
                    kind,
                    start: end,
                    end: span.end,
                    attrs: span.attrs,
                });
            }
        }
        self.spans = kept;
        self.normalize();
    }

    /// Sort spans and merge touching spans of the same kind and attributes.
    pub(crate) fn normalize(&mut self) {
        self.spans
            .sort_by(|a, b| (a.kind, a.start, a.end).cmp(&(b.kind, b.start, b.end)));
        let mut merged: Vec<Span> = Vec::with_capacity(self.spans.len());
        for span in self.spans.drain(..) {
            if let Some(last) = merged.last_mut() {
                if last.kind == span.kind && last.attrs == span.attrs && span.start <= last.end {
                    last.end = last.end.max(span.end);
                    continue;
                }
            }
            merged.push(span);
        }
        self.spans = merged;
    }
}
