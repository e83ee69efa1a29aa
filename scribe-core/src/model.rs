//! Document Model Adapter contract.
//!
//! Everything above this crate (reconciler, annotation pipeline, editor
//! session) talks to the rich-text engine only through [`DocumentModel`].
//! Positions are offsets into the flattened content stream: each block
//! contributes an open token, its characters, and a close token, so the first
//! character of the first block sits at position 1.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Free-form attributes carried by a mark (message, suggestions, href...).
pub type MarkAttrs = BTreeMap<String, String>;

/// Kinds of inline marks.
///
/// Formatting marks are part of the document content and are serialized.
/// Overlay marks (`Spelling`, `Grammar`, `Style`) are annotations laid over
/// the text: they never bump the version and never leave the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkKind {
    Bold,
    Italic,
    Underline,
    Spelling,
    Grammar,
    Style,
}

impl MarkKind {
    /// Every overlay kind, in clearing order.
    pub const OVERLAYS: [MarkKind; 3] = [MarkKind::Spelling, MarkKind::Grammar, MarkKind::Style];

    pub fn is_overlay(self) -> bool {
        matches!(self, MarkKind::Spelling | MarkKind::Grammar | MarkKind::Style)
    }

    /// Markup tag for formatting kinds; overlays have none.
    pub(crate) fn tag(self) -> Option<&'static str> {
        match self {
            MarkKind::Bold => Some("strong"),
            MarkKind::Italic => Some("em"),
            MarkKind::Underline => Some("u"),
            _ => None,
        }
    }
}

/// A selection range in engine positions. `from == to` is a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Selection {
    pub from: usize,
    pub to: usize,
}

impl Selection {
    pub fn new(from: usize, to: usize) -> Self {
        Self { from, to }
    }

    pub fn cursor(pos: usize) -> Self {
        Self { from: pos, to: pos }
    }

    pub fn is_empty(&self) -> bool {
        self.from == self.to
    }

    /// The end the user is typing at.
    pub fn head(&self) -> usize {
        self.to
    }
}

/// A mark as seen from outside the engine, in engine positions.
#[derive(Debug, Clone, PartialEq)]
pub struct Mark {
    pub kind: MarkKind,
    pub from: usize,
    pub to: usize,
    pub attrs: MarkAttrs,
}

/// Change notifications produced by mutations, drained by the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentEvent {
    /// Structural content changed; `version` is the new version.
    ContentChanged { version: u64 },
    /// The user-visible selection moved.
    SelectionChanged { selection: Selection },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("range {from}..{to} out of bounds for document of size {size}")]
    OutOfBounds { from: usize, to: usize, size: usize },
    #[error("inverted range {from}..{to}")]
    Inverted { from: usize, to: usize },
}

/// The contract over the rich-text engine.
///
/// Range-taking operations validate `0 <= from <= to <= size()` and reject
/// without mutating anything; content may have shrunk since the caller
/// computed the range.
pub trait DocumentModel {
    /// Plain-text projection. Blocks are joined by a single `\n`.
    fn text(&self) -> String;

    fn selection(&self) -> Selection;

    /// Replace the whole document from its serialized form. The version is
    /// always bumped; a `ContentChanged` event is only emitted when
    /// `emit_update` is set. Overlay marks do not survive a replace.
    fn set_content(&mut self, serialized: &str, emit_update: bool);

    /// Returns `false` (and changes nothing) when out of bounds.
    fn set_selection(&mut self, selection: Selection) -> bool;

    fn apply_mark(
        &mut self,
        kind: MarkKind,
        from: usize,
        to: usize,
        attrs: MarkAttrs,
    ) -> Result<(), DocumentError>;

    /// Remove marks of `kind` inside `[from, to)`.
    fn remove_mark(&mut self, kind: MarkKind, from: usize, to: usize) -> Result<(), DocumentError>;

    /// Remove every mark of the given kinds across the whole document.
    fn clear_marks(&mut self, kinds: &[MarkKind]);

    /// Translate a plain-text offset (into [`DocumentModel::text`]) to an
    /// engine position. `None` past the end of the text.
    fn plain_to_pos(&self, offset: usize) -> Option<usize>;

    /// Content size in engine positions.
    fn size(&self) -> usize;

    /// Logical version stamp, bumped on every structural mutation.
    fn version(&self) -> u64;

    /// Serialized form understood by `set_content`.
    fn serialize(&self) -> String;

    fn text_between(&self, from: usize, to: usize) -> Result<String, DocumentError>;

    /// Insert plain text; a `\n` splits the current block.
    fn insert_text(&mut self, pos: usize, text: &str) -> Result<(), DocumentError>;

    fn delete_range(&mut self, from: usize, to: usize) -> Result<(), DocumentError>;

    fn replace_range(&mut self, from: usize, to: usize, text: &str) -> Result<(), DocumentError> {
        self.delete_range(from, to)?;
        self.insert_text(from, text)
    }

    /// All marks, in document order.
    fn marks(&self) -> Vec<Mark>;

    /// Take pending change notifications.
    fn drain_events(&mut self) -> Vec<DocumentEvent>;

    /// Plain text from the start of the document up to `pos`.
    fn text_before(&self, pos: usize) -> String {
        self.text_between(0, pos.min(self.size())).unwrap_or_default()
    }
}

/// Resolves a viewport coordinate to a document position. Implemented by
/// whatever owns layout.
pub trait PositionResolver {
    fn pos_at(&self, x: f32, y: f32) -> Option<usize>;
}
