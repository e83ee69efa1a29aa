//! Analysis findings and how they map onto overlay marks.

use serde::{Deserialize, Serialize};

use scribe_core::{MarkAttrs, MarkKind};

/// Category of a finding. Any type the analyzer sends that we don't know is
/// treated as grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum FindingKind {
    Spelling,
    #[default]
    Grammar,
    Style,
}

impl From<String> for FindingKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "spelling" => FindingKind::Spelling,
            "style" => FindingKind::Style,
            _ => FindingKind::Grammar,
        }
    }
}

impl FindingKind {
    pub fn mark_kind(self) -> MarkKind {
        match self {
            FindingKind::Spelling => MarkKind::Spelling,
            FindingKind::Grammar => MarkKind::Grammar,
            FindingKind::Style => MarkKind::Style,
        }
    }

    pub fn from_mark(kind: MarkKind) -> Option<Self> {
        match kind {
            MarkKind::Spelling => Some(FindingKind::Spelling),
            MarkKind::Grammar => Some(FindingKind::Grammar),
            MarkKind::Style => Some(FindingKind::Style),
            _ => None,
        }
    }
}

/// A finding over `[start, end)` in plain-text offsets of the text that was
/// analyzed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub kind: FindingKind,
    pub start: usize,
    pub end: usize,
    pub message: String,
    pub suggestions: Vec<String>,
}

impl Finding {
    pub fn new(kind: FindingKind, start: usize, end: usize, message: impl Into<String>) -> Self {
        Self {
            kind,
            start,
            end,
            message: message.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    /// Attributes carried by the overlay mark. `from`/`to` are the engine
    /// positions the finding was placed at.
    pub fn mark_attrs(&self, from: usize, to: usize) -> MarkAttrs {
        let mut attrs = MarkAttrs::new();
        attrs.insert("message".into(), self.message.clone());
        attrs.insert(
            "suggestions".into(),
            serde_json::to_string(&self.suggestions).unwrap_or_else(|_| "[]".into()),
        );
        attrs.insert("start".into(), from.to_string());
        attrs.insert("end".into(), to.to_string());
        attrs
    }
}

/// A finding as the analyzer sends it. Offsets are signed on the wire so a
/// bad entry can be dropped without failing the whole response.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawFinding {
    #[serde(rename = "type", default)]
    pub kind: FindingKind,
    pub start: i64,
    pub end: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl RawFinding {
    pub fn into_finding(self) -> Option<Finding> {
        let start = usize::try_from(self.start).ok()?;
        let end = usize::try_from(self.end).ok()?;
        Some(Finding {
            kind: self.kind,
            start,
            end,
            message: self.message,
            suggestions: self.suggestions,
        })
    }
}
