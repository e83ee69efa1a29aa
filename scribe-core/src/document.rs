//! In-memory rich-text document implementing [`DocumentModel`].

use crate::block::{Block, BlockKind};
use crate::html;
use crate::model::{
    DocumentError, DocumentEvent, DocumentModel, Mark, MarkAttrs, MarkKind, Selection,
};

/// Character and word counts of the plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DocumentStats {
    pub characters: usize,
    pub words: usize,
}

/// A tree of blocks addressed through a flattened position stream.
#[derive(Debug, Clone)]
pub struct RichTextDocument {
    blocks: Vec<Block>,
    selection: Selection,
    version: u64,
    events: Vec<DocumentEvent>,
}

impl Default for RichTextDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl RichTextDocument {
    /// An empty document: one empty paragraph, cursor inside it.
    pub fn new() -> Self {
        Self {
            blocks: vec![Block::new(BlockKind::Paragraph)],
            selection: Selection::cursor(1),
            version: 0,
            events: Vec::new(),
        }
    }

    pub fn from_serialized(serialized: &str) -> Self {
        Self {
            blocks: html::parse(serialized),
            selection: Selection::cursor(1),
            version: 0,
            events: Vec::new(),
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn stats(&self) -> DocumentStats {
        let text = self.text();
        DocumentStats {
            characters: text.chars().count(),
            words: text.split_whitespace().count(),
        }
    }

    /// Position of the end of the last block's text.
    pub fn end_pos(&self) -> usize {
        self.size().saturating_sub(1)
    }

    /// Resolve a position to `(block index, offset within block)`. Positions
    /// on block tokens snap to the nearest text position.
    fn locate(&self, pos: usize) -> Option<(usize, usize)> {
        if pos > self.size() {
            return None;
        }
        let mut start = 0;
        for (idx, block) in self.blocks.iter().enumerate() {
            let text_end = start + 1 + block.len();
            if pos <= text_end {
                return Some((idx, pos.saturating_sub(start + 1)));
            }
            start = text_end + 1;
        }
        let last = self.blocks.len() - 1;
        Some((last, self.blocks[last].len()))
    }

    /// Engine position of the first character of block `idx`.
    fn block_text_start(&self, idx: usize) -> usize {
        self.blocks[..idx].iter().map(|b| b.len() + 2).sum::<usize>() + 1
    }

    fn check_range(&self, from: usize, to: usize) -> Result<(), DocumentError> {
        if from > to {
            return Err(DocumentError::Inverted { from, to });
        }
        let size = self.size();
        if to > size {
            return Err(DocumentError::OutOfBounds { from, to, size });
        }
        Ok(())
    }

    fn content_changed(&mut self, notify: bool) {
        self.version += 1;
        if notify {
            self.events.push(DocumentEvent::ContentChanged {
                version: self.version,
            });
        }
    }

    /// Visit the part of every block covered by `[from, to)`.
    fn for_each_overlap(&mut self, from: usize, to: usize, mut f: impl FnMut(&mut Block, usize, usize)) {
        let mut text_start = 1;
        for block in &mut self.blocks {
            let len = block.len();
            let start = from.max(text_start);
            let end = to.min(text_start + len);
            if start < end {
                f(block, start - text_start, end - text_start);
            }
            text_start += len + 2;
        }
    }

    fn clamp_selection(&mut self) {
        let max = self.end_pos().max(1);
        self.selection.from = self.selection.from.clamp(1, max);
        self.selection.to = self.selection.to.clamp(self.selection.from, max);
    }
}

impl DocumentModel for RichTextDocument {
    fn text(&self) -> String {
        self.blocks
            .iter()
            .map(Block::text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn selection(&self) -> Selection {
        self.selection
    }

    fn set_content(&mut self, serialized: &str, emit_update: bool) {
        self.blocks = html::parse(serialized);
        self.clamp_selection();
        self.content_changed(emit_update);
        log::trace!("document replaced, version {}", self.version);
    }

    fn set_selection(&mut self, selection: Selection) -> bool {
        if self.check_range(selection.from, selection.to).is_err() {
            return false;
        }
        if selection != self.selection {
            self.selection = selection;
            self.events.push(DocumentEvent::SelectionChanged { selection });
        }
        true
    }

    fn apply_mark(
        &mut self,
        kind: MarkKind,
        from: usize,
        to: usize,
        attrs: MarkAttrs,
    ) -> Result<(), DocumentError> {
        self.check_range(from, to)?;
        if from == to {
            return Ok(());
        }
        self.for_each_overlap(from, to, |block, start, end| {
            block.add_span(kind, start, end, attrs.clone());
        });
        if !kind.is_overlay() {
            self.content_changed(true);
        }
        Ok(())
    }

    fn remove_mark(&mut self, kind: MarkKind, from: usize, to: usize) -> Result<(), DocumentError> {
        self.check_range(from, to)?;
        self.for_each_overlap(from, to, |block, start, end| {
            block.remove_span_range(kind, start, end);
        });
        if !kind.is_overlay() {
            self.content_changed(true);
        }
        Ok(())
    }

    fn clear_marks(&mut self, kinds: &[MarkKind]) {
        let mut structural = false;
        for block in &mut self.blocks {
            let before = block.spans.len();
            block.spans.retain(|s| !kinds.contains(&s.kind));
            if block.spans.len() != before && kinds.iter().any(|k| !k.is_overlay()) {
                structural = true;
            }
        }
        if structural {
            self.content_changed(true);
        }
    }

    fn plain_to_pos(&self, offset: usize) -> Option<usize> {
        let mut plain_start = 0;
        let mut text_start = 1;
        for block in &self.blocks {
            let len = block.len();
            if offset <= plain_start + len {
                return Some(text_start + offset - plain_start);
            }
            plain_start += len + 1;
            text_start += len + 2;
        }
        None
    }

    fn size(&self) -> usize {
        self.blocks.iter().map(|b| b.len() + 2).sum()
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn serialize(&self) -> String {
        html::serialize(&self.blocks)
    }

    fn text_between(&self, from: usize, to: usize) -> Result<String, DocumentError> {
        self.check_range(from, to)?;
        let mut parts = Vec::new();
        let mut text_start = 1;
        for block in &self.blocks {
            let len = block.len();
            let block_end = text_start + len;
            // A block participates if the range touches its text span.
            if to >= text_start && from <= block_end {
                let start = from.max(text_start) - text_start;
                let end = to.min(block_end) - text_start;
                if start <= end {
                    parts.push(block.chars[start..end].iter().collect::<String>());
                }
            }
            text_start += len + 2;
        }
        Ok(parts.join("\n"))
    }

    fn insert_text(&mut self, pos: usize, text: &str) -> Result<(), DocumentError> {
        self.check_range(pos, pos)?;
        if text.is_empty() {
            return Ok(());
        }
        let Some((mut idx, mut offset)) = self.locate(pos) else {
            return Err(DocumentError::OutOfBounds {
                from: pos,
                to: pos,
                size: self.size(),
            });
        };
        let old_size = self.size();
        let insert_at = self.block_text_start(idx) + offset;

        for (n, line) in text.split('\n').enumerate() {
            if n > 0 {
                let tail = self.blocks[idx].split_off(offset);
                self.blocks.insert(idx + 1, tail);
                idx += 1;
                offset = 0;
            }
            let chars: Vec<char> = line.chars().collect();
            self.blocks[idx].insert(offset, &chars);
            offset += chars.len();
        }

        let delta = self.size() - old_size;
        let map = |p: usize| if p >= insert_at { p + delta } else { p };
        self.selection = Selection::new(map(self.selection.from), map(self.selection.to));
        self.content_changed(true);
        Ok(())
    }

    fn delete_range(&mut self, from: usize, to: usize) -> Result<(), DocumentError> {
        self.check_range(from, to)?;
        if from == to {
            return Ok(());
        }
        let (Some((first, start)), Some((last, end))) = (self.locate(from), self.locate(to)) else {
            return Err(DocumentError::OutOfBounds {
                from,
                to,
                size: self.size(),
            });
        };
        if first == last && start == end {
            log::trace!("delete [{}, {}) covers no text, nothing to do", from, to);
            return Ok(());
        }
        let old_size = self.size();

        if first == last {
            self.blocks[first].remove(start, end);
        } else {
            let first_len = self.blocks[first].len();
            self.blocks[first].remove(start, first_len);
            let tail = self.blocks[last].split_off(end);
            self.blocks.drain(first + 1..=last);
            self.blocks[first].append(tail);
        }

        let delta = old_size - self.size();
        let map = |p: usize| {
            if p <= from {
                p
            } else if p < to {
                from
            } else {
                p.saturating_sub(delta).max(from)
            }
        };
        self.selection = Selection::new(map(self.selection.from), map(self.selection.to));
        self.clamp_selection();
        self.content_changed(true);
        Ok(())
    }

    fn marks(&self) -> Vec<Mark> {
        let mut out = Vec::new();
        let mut text_start = 1;
        for block in &self.blocks {
            for span in &block.spans {
                out.push(Mark {
                    kind: span.kind,
                    from: text_start + span.start,
                    to: text_start + span.end,
                    attrs: span.attrs.clone(),
                });
            }
            text_start += block.len() + 2;
        }
        out.sort_by_key(|m| (m.from, m.to, m.kind));
        out
    }

    fn drain_events(&mut self) -> Vec<DocumentEvent> {
        std::mem::take(&mut self.events)
    }
}
