//! Laying findings over the document, and reading them back.
//!
//! Finding offsets index the plain text (blocks joined by one `\n`). Each is
//! translated to engine positions and validated against the document as it
//! is now; a finding that no longer fits is dropped, never retried.

use scribe_core::{DocumentError, DocumentModel, MarkKind, PositionResolver};

use crate::finding::{Finding, FindingKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OverlayReport {
    pub applied: usize,
    pub dropped: usize,
}

/// A finding as it currently sits in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedFinding {
    pub kind: FindingKind,
    pub from: usize,
    pub to: usize,
    pub message: String,
    pub suggestions: Vec<String>,
}

pub fn clear_findings<D: DocumentModel + ?Sized>(doc: &mut D) {
    doc.clear_marks(&MarkKind::OVERLAYS);
}

/// Replace every finding mark in `doc` with `findings`.
pub fn apply_findings<D: DocumentModel + ?Sized>(doc: &mut D, findings: &[Finding]) -> OverlayReport {
    clear_findings(doc);

    let mut report = OverlayReport::default();
    for finding in findings {
        let range = match (doc.plain_to_pos(finding.start), doc.plain_to_pos(finding.end)) {
            (Some(from), Some(to)) if from >= 1 && from < to && to <= doc.size() => Some((from, to)),
            _ => None,
        };
        let placed = range.is_some_and(|(from, to)| {
            doc.apply_mark(finding.kind.mark_kind(), from, to, finding.mark_attrs(from, to))
                .is_ok()
        });
        if placed {
            report.applied += 1;
        } else {
            log::trace!(
                "dropping {:?} finding {}..{}",
                finding.kind,
                finding.start,
                finding.end
            );
            report.dropped += 1;
        }
    }
    log::debug!("findings: {} applied, {} dropped", report.applied, report.dropped);
    report
}

/// Every finding mark in document order.
pub fn placed_findings<D: DocumentModel + ?Sized>(doc: &D) -> Vec<PlacedFinding> {
    doc.marks()
        .into_iter()
        .filter_map(|mark| {
            let kind = FindingKind::from_mark(mark.kind)?;
            let message = mark.attrs.get("message").cloned().unwrap_or_default();
            let suggestions = mark
                .attrs
                .get("suggestions")
                .and_then(|s| serde_json::from_str(s).ok())
                .unwrap_or_default();
            Some(PlacedFinding {
                kind,
                from: mark.from,
                to: mark.to,
                message,
                suggestions,
            })
        })
        .collect()
}

/// The first finding covering `pos`.
pub fn finding_at<D: DocumentModel + ?Sized>(doc: &D, pos: usize) -> Option<PlacedFinding> {
    placed_findings(doc)
        .into_iter()
        .find(|f| f.from <= pos && pos < f.to)
}

/// Resolve a viewport point and find the finding under it.
pub fn inspect<D, R>(doc: &D, resolver: &R, x: f32, y: f32) -> Option<PlacedFinding>
where
    D: DocumentModel + ?Sized,
    R: PositionResolver + ?Sized,
{
    let pos = resolver.pos_at(x, y)?;
    finding_at(doc, pos)
}

fn char_at<D: DocumentModel + ?Sized>(doc: &D, pos: usize) -> Option<char> {
    doc.text_between(pos, pos + 1).ok()?.chars().next()
}

/// Replace `[from, to)` with `suggestion`, padding with a space on a side
/// where it would otherwise run into a word.
pub fn apply_suggestion<D: DocumentModel + ?Sized>(
    doc: &mut D,
    from: usize,
    to: usize,
    suggestion: &str,
) -> Result<(), DocumentError> {
    if from > to {
        return Err(DocumentError::Inverted { from, to });
    }
    if to > doc.size() {
        return Err(DocumentError::OutOfBounds {
            from,
            to,
            size: doc.size(),
        });
    }

    let before = from.checked_sub(1).and_then(|p| char_at(doc, p));
    let after = char_at(doc, to);

    let mut replacement = String::with_capacity(suggestion.len() + 2);
    if before.is_some_and(char::is_alphanumeric) && !suggestion.starts_with(' ') {
        replacement.push(' ');
    }
    replacement.push_str(suggestion);
    if after.is_some_and(char::is_alphanumeric) && !suggestion.ends_with(' ') {
        replacement.push(' ');
    }

    doc.replace_range(from, to, &replacement)
}
