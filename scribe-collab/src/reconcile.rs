//! Content reconciliation between local edits and pushed snapshots.
//!
//! Outbound: local edits are coalesced into a single pending edit and sent
//! once the debounce window closes. A newer edit replaces the pending one, it
//! is never queued behind it. Write access is checked twice, when the edit is
//! made and when the window closes; both must allow it.
//!
//! Inbound: a snapshot equal to the current serialization is an echo and is
//! ignored, as is a repeat of the last applied snapshot while the document
//! still holds what it produced (raw text and non-canonical HTML serialize
//! differently from how they arrived). Anything else replaces the document
//! without raising a local change, then the previous selection is put back,
//! clamped to the new content.
//!
//! The server keeps whole-document last-write-wins. A snapshot that arrives
//! while a local edit is pending replaces the document and drops the pending
//! edit, so what goes out next is always what the user is looking at.

use std::time::Duration;

use scribe_core::{DocumentModel, Selection};

use crate::access::AccessGate;

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Quiet period after the last local edit before it is sent
    pub debounce: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
        }
    }
}

/// Result of applying an inbound snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    /// Equal to what we already have.
    Unchanged,
    /// Replaced; `selection` is where the selection ended up.
    Applied {
        selection: Selection,
        /// Whether the prior selection fit unchanged.
        restored: bool,
    },
}

#[derive(Debug, Clone)]
struct PendingEdit {
    content: String,
    writable: bool,
}

/// The last snapshot applied, as received and as it serialized afterwards.
#[derive(Debug, Clone)]
struct AppliedSnapshot {
    raw: String,
    serialized: String,
}

#[derive(Debug, Clone, Default)]
pub struct ContentReconciler {
    config: ReconcilerConfig,
    pending: Option<PendingEdit>,
    last_applied: Option<AppliedSnapshot>,
}

impl ContentReconciler {
    pub fn new(config: ReconcilerConfig) -> Self {
        Self {
            config,
            pending: None,
            last_applied: None,
        }
    }

    /// Record a local edit. Returns how long to (re)arm the debounce timer
    /// for; the caller re-arms on every edit, whatever the role.
    pub fn on_local_change(&mut self, content: String, writable: bool) -> Duration {
        if !writable {
            log::debug!("local edit without write access, it will not be sent");
        }
        self.pending = Some(PendingEdit { content, writable });
        self.config.debounce
    }

    /// The debounce window closed. Yields the content to send, if any.
    pub fn on_debounce_elapsed(&mut self, gate: &AccessGate) -> Option<String> {
        let pending = self.pending.take()?;
        if pending.writable && gate.can_write() {
            Some(pending.content)
        } else {
            log::debug!("dropping pending edit: write access denied");
            None
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_content(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.content.as_str())
    }

    pub fn clear(&mut self) {
        self.pending = None;
        self.last_applied = None;
    }

    pub fn debounce(&self) -> Duration {
        self.config.debounce
    }

    /// Apply a pushed snapshot to `doc`. A pending local edit does not
    /// survive a snapshot that replaces the document.
    pub fn apply_inbound<D: DocumentModel + ?Sized>(
        &mut self,
        doc: &mut D,
        content: &str,
    ) -> InboundOutcome {
        let current = doc.serialize();
        let repeat = self
            .last_applied
            .as_ref()
            .is_some_and(|last| last.raw == content && last.serialized == current);
        if current == content || repeat {
            log::trace!("inbound content equals local, ignoring");
            return InboundOutcome::Unchanged;
        }

        let prior = doc.selection();
        doc.set_content(content, false);
        if self.pending.take().is_some() {
            log::debug!("inbound snapshot replaced the document, dropping pending edit");
        }
        self.last_applied = Some(AppliedSnapshot {
            raw: content.to_string(),
            serialized: doc.serialize(),
        });

        let end = doc.size().saturating_sub(1).max(1);
        let from = prior.from.clamp(1, end);
        let to = prior.to.clamp(from, end);
        let clamped = Selection::new(from, to);

        let restored = clamped == prior && doc.set_selection(clamped);
        if !restored && !doc.set_selection(clamped) {
            doc.set_selection(Selection::cursor(end));
        }
        // Restoring the selection is not a user move.
        doc.drain_events();

        InboundOutcome::Applied {
            selection: doc.selection(),
            restored,
        }
    }
}
