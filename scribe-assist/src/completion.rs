//! Inline completion state.
//!
//! A suggestion is only good for the exact spot it was computed for: the
//! cursor position, the document version, and a hash of everything before
//! the cursor. Any keystroke or cursor move clears it.

use std::hash::Hasher;

use rustc_hash::FxHasher;
use scribe_core::DocumentModel;

use crate::config::AssistConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionTicket {
    pub seq: u64,
    pub cursor: usize,
    pub version: u64,
    pub prefix_hash: u64,
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub text: String,
    pub cursor: usize,
    pub version: u64,
    prefix_hash: u64,
}

#[derive(Debug, Default)]
pub struct CompletionAnalyzer {
    seq: u64,
    suggestion: Option<Suggestion>,
}

fn prefix_hash(prefix: &str) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(prefix.as_bytes());
    hasher.finish()
}

/// The last `n` characters of `text`.
fn tail_chars(text: &str, n: usize) -> &str {
    let count = text.chars().count();
    if count <= n {
        return text;
    }
    let skip = count - n;
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => "",
    }
}

impl CompletionAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the current suggestion and anything in flight. Returns whether a
    /// suggestion was showing.
    pub fn invalidate(&mut self) -> bool {
        self.seq += 1;
        self.suggestion.take().is_some()
    }

    /// Build a request for the current cursor, or `None` when there is too
    /// little context.
    pub fn prepare<D: DocumentModel + ?Sized>(
        &mut self,
        doc: &D,
        config: &AssistConfig,
    ) -> Option<CompletionTicket> {
        let cursor = doc.selection().from;
        let prefix = doc.text_before(cursor);
        let context = tail_chars(&prefix, config.completion_context_chars);
        if context.trim().chars().count() < config.completion_min_chars {
            log::trace!("completion: context too short");
            self.suggestion = None;
            return None;
        }
        self.seq += 1;
        Some(CompletionTicket {
            seq: self.seq,
            cursor,
            version: doc.version(),
            prefix_hash: prefix_hash(&prefix),
            context: context.to_string(),
        })
    }

    /// Accept a suggestion if it answers the latest request and the cursor,
    /// version and prefix still match.
    pub fn accept<D: DocumentModel + ?Sized>(
        &mut self,
        ticket: &CompletionTicket,
        text: String,
        doc: &D,
    ) -> Option<&Suggestion> {
        if ticket.seq != self.seq || text.is_empty() {
            return None;
        }
        let still_valid = doc.version() == ticket.version
            && doc.selection().from == ticket.cursor
            && prefix_hash(&doc.text_before(ticket.cursor)) == ticket.prefix_hash;
        if !still_valid {
            log::debug!("completion: document moved on, dropping suggestion");
            return None;
        }
        self.suggestion = Some(Suggestion {
            text,
            cursor: ticket.cursor,
            version: ticket.version,
            prefix_hash: ticket.prefix_hash,
        });
        self.suggestion.as_ref()
    }

    pub fn suggestion(&self) -> Option<&Suggestion> {
        self.suggestion.as_ref()
    }

    /// Take the suggestion for insertion if it still fits the document.
    pub fn take_valid<D: DocumentModel + ?Sized>(&mut self, doc: &D) -> Option<Suggestion> {
        let suggestion = self.suggestion.take()?;
        let valid = suggestion.version == doc.version()
            && doc.selection().from == suggestion.cursor
            && suggestion.cursor <= doc.size()
            && prefix_hash(&doc.text_before(suggestion.cursor)) == suggestion.prefix_hash;
        valid.then_some(suggestion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_core::{RichTextDocument, Selection};

    const LONG: &str = "The quick brown fox jumps over the lazy dog";

    fn doc_at_end(text: &str) -> RichTextDocument {
        let mut doc = RichTextDocument::from_serialized(&format!("<p>{text}</p>"));
        let end = doc.end_pos();
        doc.set_selection(Selection::cursor(end));
        doc
    }

    #[test]
    fn test_tail_chars() {
        assert_eq!(tail_chars("abcdef", 3), "def");
        assert_eq!(tail_chars("ab", 3), "ab");
        assert_eq!(tail_chars("héllo", 4), "éllo");
    }

    #[test]
    fn test_short_context_skipped() {
        let mut c = CompletionAnalyzer::new();
        let doc = doc_at_end("   too short        ");
        assert!(c.prepare(&doc, &AssistConfig::default()).is_none());
    }

    #[test]
    fn test_context_capped() {
        let mut c = CompletionAnalyzer::new();
        let text = "word ".repeat(400);
        let doc = doc_at_end(&text);
        let ticket = c.prepare(&doc, &AssistConfig::default()).unwrap();
        assert_eq!(ticket.context.chars().count(), 800);
        assert!(text.ends_with(&ticket.context));
    }

    #[test]
    fn test_accept_and_take() {
        let mut c = CompletionAnalyzer::new();
        let doc = doc_at_end(LONG);
        let ticket = c.prepare(&doc, &AssistConfig::default()).unwrap();
        assert!(c.accept(&ticket, " and runs away".into(), &doc).is_some());
        let s = c.take_valid(&doc).unwrap();
        assert_eq!(s.text, " and runs away");
        assert_eq!(s.cursor, doc.end_pos());
        assert!(c.suggestion().is_none());
    }

    #[test]
    fn test_superseded_ticket_rejected() {
        let mut c = CompletionAnalyzer::new();
        let doc = doc_at_end(LONG);
        let ticket = c.prepare(&doc, &AssistConfig::default()).unwrap();
        c.invalidate();
        assert!(c.accept(&ticket, "x".into(), &doc).is_none());
    }

    #[test]
    fn test_cursor_move_rejects() {
        let mut c = CompletionAnalyzer::new();
        let mut doc = doc_at_end(LONG);
        let ticket = c.prepare(&doc, &AssistConfig::default()).unwrap();
        doc.set_selection(Selection::cursor(3));
        assert!(c.accept(&ticket, "x".into(), &doc).is_none());
    }

    #[test]
    fn test_edit_invalidates_held_suggestion() {
        let mut c = CompletionAnalyzer::new();
        let mut doc = doc_at_end(LONG);
        let ticket = c.prepare(&doc, &AssistConfig::default()).unwrap();
        c.accept(&ticket, " today".into(), &doc);
        doc.insert_text(1, "X").unwrap();
        assert!(c.take_valid(&doc).is_none());
    }

    #[test]
    fn test_empty_suggestion_ignored() {
        let mut c = CompletionAnalyzer::new();
        let doc = doc_at_end(LONG);
        let ticket = c.prepare(&doc, &AssistConfig::default()).unwrap();
        assert!(c.accept(&ticket, String::new(), &doc).is_none());
    }
}
