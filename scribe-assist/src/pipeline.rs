//! The annotation pipeline: debounced analyzer requests whose results are
//! laid over the live document.
//!
//! ```text
//! document_changed ──► schedule GrammarDue (1.5s)  ──► decide ──► spawn check_grammar
//!                  └─► schedule CompletionDue (1s) ──► prepare ──► spawn complete
//!                                                                      │
//! handle(fired) ◄──────────────── GrammarResult / CompletionResult ◄───┘
//!     │  stale seq or version: dropped
//!     ▼
//! overlay::apply_findings / held suggestion
//! ```
//!
//! Timers and requests run on the pipeline's own [`Scheduler`]; the owner
//! polls the receiver from [`AnnotationPipeline::take_event_rx`] and feeds
//! each item back through [`AnnotationPipeline::handle`] together with the
//! document, so results are always checked against the document as it is
//! at that moment.

use std::sync::Arc;

use scribe_collab::access::AccessGate;
use scribe_collab::scheduler::{Component, Fired, Scheduler, TaskKey};
use scribe_core::{DocumentError, DocumentModel, PositionResolver, Selection};
use tokio::sync::mpsc;

use crate::client::{AnalyzerClient, AnalyzerError, AnalyzerReply, EnhanceAction, Enhancement};
use crate::completion::{CompletionAnalyzer, CompletionTicket};
use crate::config::AssistConfig;
use crate::finding::Finding;
use crate::grammar::{GrammarAnalyzer, GrammarDecision};
use crate::overlay::{self, OverlayReport, PlacedFinding};

/// Work items the pipeline schedules for itself.
#[derive(Debug)]
pub enum AssistEvent {
    GrammarDue,
    GrammarResult {
        seq: u64,
        version: u64,
        reply: Result<AnalyzerReply<Vec<Finding>>, AnalyzerError>,
    },
    CompletionDue,
    CompletionResult {
        ticket: CompletionTicket,
        reply: Result<AnalyzerReply<String>, AnalyzerError>,
    },
    EnhanceResult {
        seq: u64,
        reply: Result<AnalyzerReply<Enhancement>, AnalyzerError>,
    },
}

/// What changed, for whoever renders the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssistUpdate {
    FindingsApplied(OverlayReport),
    FindingsCleared,
    CompletionReady(String),
    CompletionCleared,
    EnhancementReady(Enhancement),
    RateLimited(Component),
    Failed { component: Component, message: String },
}

#[derive(Debug, Clone)]
struct EnhanceRequest {
    seq: u64,
    range: Selection,
    version: u64,
}

#[derive(Debug, Clone)]
struct PendingEnhancement {
    range: Selection,
    version: u64,
    enhancement: Enhancement,
}

pub struct AnnotationPipeline {
    config: AssistConfig,
    analyzer: Option<Arc<dyn AnalyzerClient>>,
    scheduler: Scheduler<AssistEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<Fired<AssistEvent>>>,
    grammar: GrammarAnalyzer,
    completion: CompletionAnalyzer,
    enhance_seq: u64,
    enhance_request: Option<EnhanceRequest>,
    enhancement: Option<PendingEnhancement>,
}

const GRAMMAR_DEBOUNCE: TaskKey = TaskKey::debounce(Component::Grammar);
const GRAMMAR_REQUEST: TaskKey = TaskKey::request(Component::Grammar);
const COMPLETION_DEBOUNCE: TaskKey = TaskKey::debounce(Component::Completion);
const COMPLETION_REQUEST: TaskKey = TaskKey::request(Component::Completion);
const ENHANCE_REQUEST: TaskKey = TaskKey::request(Component::Enhance);

impl AnnotationPipeline {
    pub fn new(config: AssistConfig, analyzer: Option<Arc<dyn AnalyzerClient>>) -> Self {
        let (scheduler, event_rx) = Scheduler::new();
        Self {
            config,
            analyzer,
            scheduler,
            event_rx: Some(event_rx),
            grammar: GrammarAnalyzer::new(),
            completion: CompletionAnalyzer::new(),
            enhance_seq: 0,
            enhance_request: None,
            enhancement: None,
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::UnboundedReceiver<Fired<AssistEvent>>> {
        self.event_rx.take()
    }

    pub fn config(&self) -> &AssistConfig {
        &self.config
    }

    /// Swap the analyzer, e.g. after re-authenticating. In-flight requests
    /// made with the old one are cancelled.
    pub fn set_analyzer(&mut self, analyzer: Option<Arc<dyn AnalyzerClient>>) {
        for component in [Component::Grammar, Component::Completion, Component::Enhance] {
            self.scheduler.cancel(TaskKey::request(component));
        }
        self.analyzer = analyzer;
    }

    pub fn findings(&self) -> &[Finding] {
        self.grammar.findings()
    }

    pub fn suggestion(&self) -> Option<&str> {
        self.completion.suggestion().map(|s| s.text.as_str())
    }

    pub fn is_pending(&self, key: TaskKey) -> bool {
        self.scheduler.is_pending(key)
    }

    /// A local edit happened.
    pub fn document_changed(&mut self) -> Vec<AssistUpdate> {
        let mut updates = Vec::new();
        if self.config.grammar_enabled {
            self.scheduler
                .schedule(GRAMMAR_DEBOUNCE, self.config.grammar_debounce(), AssistEvent::GrammarDue);
        }
        if self.completion.invalidate() {
            updates.push(AssistUpdate::CompletionCleared);
        }
        self.scheduler.cancel(COMPLETION_REQUEST);
        if self.config.completion_enabled {
            self.scheduler.schedule(
                COMPLETION_DEBOUNCE,
                self.config.completion_debounce(),
                AssistEvent::CompletionDue,
            );
        }
        updates
    }

    /// The cursor or selection moved without an edit.
    pub fn selection_changed(&mut self) -> Option<AssistUpdate> {
        self.scheduler.cancel(COMPLETION_REQUEST);
        self.completion
            .invalidate()
            .then_some(AssistUpdate::CompletionCleared)
    }

    /// A remote snapshot replaced the document. Findings placed against the
    /// old content are gone; analysis starts over for the new one.
    pub fn snapshot_applied<D: DocumentModel + ?Sized>(&mut self, doc: &mut D) -> Vec<AssistUpdate> {
        let had_findings = !self.grammar.findings().is_empty();
        self.grammar.invalidate();
        overlay::clear_findings(doc);

        let mut updates = Vec::new();
        if had_findings {
            updates.push(AssistUpdate::FindingsCleared);
        }
        updates.extend(self.document_changed());
        updates
    }

    /// Process one fired task against the current document.
    pub fn handle<D: DocumentModel + ?Sized>(
        &mut self,
        fired: Fired<AssistEvent>,
        doc: &mut D,
        gate: &AccessGate,
    ) -> Option<AssistUpdate> {
        let event = self.scheduler.accept(fired)?;
        match event {
            AssistEvent::GrammarDue => self.grammar_due(doc),
            AssistEvent::GrammarResult { seq, version, reply } => match reply {
                Ok(AnalyzerReply::Ready(findings)) => {
                    let findings = self.grammar.accept(seq, version, doc.version(), findings)?;
                    Some(AssistUpdate::FindingsApplied(overlay::apply_findings(doc, findings)))
                }
                other => Self::non_result(Component::Grammar, other),
            },
            AssistEvent::CompletionDue => {
                self.completion_due(&*doc, gate);
                None
            }
            AssistEvent::CompletionResult { ticket, reply } => match reply {
                Ok(AnalyzerReply::Ready(text)) => self
                    .completion
                    .accept(&ticket, text, &*doc)
                    .map(|s| AssistUpdate::CompletionReady(s.text.clone())),
                other => Self::non_result(Component::Completion, other),
            },
            AssistEvent::EnhanceResult { seq, reply } => match reply {
                Ok(AnalyzerReply::Ready(enhancement)) => {
                    let request = self.enhance_request.take().filter(|r| r.seq == seq)?;
                    self.enhancement = Some(PendingEnhancement {
                        range: request.range,
                        version: request.version,
                        enhancement: enhancement.clone(),
                    });
                    Some(AssistUpdate::EnhancementReady(enhancement))
                }
                other => {
                    self.enhance_request = None;
                    Self::non_result(Component::Enhance, other)
                }
            },
        }
    }

    fn non_result<T>(
        component: Component,
        reply: Result<AnalyzerReply<T>, AnalyzerError>,
    ) -> Option<AssistUpdate> {
        match reply {
            Ok(AnalyzerReply::Ready(_)) => None,
            Ok(AnalyzerReply::RateLimited) => {
                log::info!("{:?}: rate limited, no result this round", component);
                Some(AssistUpdate::RateLimited(component))
            }
            Err(e) => {
                log::warn!("{:?} request failed: {}", component, e);
                Some(AssistUpdate::Failed {
                    component,
                    message: e.to_string(),
                })
            }
        }
    }

    fn grammar_due<D: DocumentModel + ?Sized>(&mut self, doc: &mut D) -> Option<AssistUpdate> {
        let analyzer = self.analyzer.clone()?;
        match self.grammar.decide(&doc.text(), doc.version(), &self.config) {
            GrammarDecision::Skip => None,
            GrammarDecision::Clear => {
                overlay::clear_findings(doc);
                Some(AssistUpdate::FindingsCleared)
            }
            GrammarDecision::Check(ticket) => {
                log::debug!("grammar check #{} ({} chars)", ticket.seq, ticket.text.len());
                self.scheduler.spawn(GRAMMAR_REQUEST, async move {
                    let reply = analyzer.check_grammar(&ticket.text).await;
                    AssistEvent::GrammarResult {
                        seq: ticket.seq,
                        version: ticket.version,
                        reply,
                    }
                });
                None
            }
        }
    }

    fn completion_due<D: DocumentModel + ?Sized>(&mut self, doc: &D, gate: &AccessGate) {
        let Some(analyzer) = self.analyzer.clone() else {
            return;
        };
        if !gate.can_write() {
            log::trace!("completion skipped: read-only");
            return;
        }
        let Some(ticket) = self.completion.prepare(doc, &self.config) else {
            return;
        };
        let max_words = self.config.completion_max_words;
        self.scheduler.spawn(COMPLETION_REQUEST, async move {
            let reply = analyzer.complete(&ticket.context, max_words).await;
            AssistEvent::CompletionResult { ticket, reply }
        });
    }

    /// Insert the held suggestion at the cursor. Returns `Ok(false)` when
    /// there is none, it no longer fits, or the role cannot write.
    pub fn accept_completion<D: DocumentModel + ?Sized>(
        &mut self,
        doc: &mut D,
        gate: &AccessGate,
    ) -> Result<bool, DocumentError> {
        if !gate.can_write() {
            return Ok(false);
        }
        let Some(suggestion) = self.completion.take_valid(&*doc) else {
            return Ok(false);
        };
        doc.insert_text(suggestion.cursor, &suggestion.text)?;
        Ok(true)
    }

    /// The finding under a viewport point.
    pub fn inspect<D, R>(&self, doc: &D, resolver: &R, x: f32, y: f32) -> Option<PlacedFinding>
    where
        D: DocumentModel + ?Sized,
        R: PositionResolver + ?Sized,
    {
        overlay::inspect(doc, resolver, x, y)
    }

    /// Replace a placed finding with one of its suggestions. The finding must
    /// still be in the document where it was inspected.
    pub fn apply_suggestion<D: DocumentModel + ?Sized>(
        &mut self,
        doc: &mut D,
        gate: &AccessGate,
        finding: &PlacedFinding,
        suggestion: &str,
    ) -> Result<bool, DocumentError> {
        if !gate.can_write() {
            return Ok(false);
        }
        let still_placed = overlay::placed_findings(&*doc)
            .iter()
            .any(|f| f.from == finding.from && f.to == finding.to && f.kind == finding.kind);
        if !still_placed {
            log::debug!("finding {}..{} is gone, not applying", finding.from, finding.to);
            return Ok(false);
        }
        overlay::apply_suggestion(doc, finding.from, finding.to, suggestion)?;
        Ok(true)
    }

    /// Ask for a rewrite of the current selection. Returns `false` when the
    /// selection is empty or no analyzer is configured.
    pub fn request_enhancement<D: DocumentModel + ?Sized>(
        &mut self,
        doc: &D,
        action: EnhanceAction,
    ) -> bool {
        let Some(analyzer) = self.analyzer.clone() else {
            return false;
        };
        let range = doc.selection();
        if range.is_empty() {
            return false;
        }
        let Ok(text) = doc.text_between(range.from, range.to) else {
            return false;
        };
        if text.trim().is_empty() {
            return false;
        }

        self.enhance_seq += 1;
        let seq = self.enhance_seq;
        self.enhancement = None;
        self.enhance_request = Some(EnhanceRequest {
            seq,
            range,
            version: doc.version(),
        });
        self.scheduler.spawn(ENHANCE_REQUEST, async move {
            let reply = analyzer.enhance(&text, action).await;
            AssistEvent::EnhanceResult { seq, reply }
        });
        true
    }

    pub fn pending_enhancement(&self) -> Option<&Enhancement> {
        self.enhancement.as_ref().map(|p| &p.enhancement)
    }

    /// Replace the range the enhancement was requested for. Only applies if
    /// the document has not changed since the request.
    pub fn apply_enhancement<D: DocumentModel + ?Sized>(
        &mut self,
        doc: &mut D,
        gate: &AccessGate,
    ) -> Result<bool, DocumentError> {
        if !gate.can_write() {
            return Ok(false);
        }
        let Some(pending) = self.enhancement.take() else {
            return Ok(false);
        };
        if pending.version != doc.version() {
            log::debug!("document changed since enhancement was requested, discarding");
            return Ok(false);
        }
        doc.replace_range(
            pending.range.from,
            pending.range.to,
            &pending.enhancement.enhanced_text,
        )?;
        Ok(true)
    }

    pub fn discard_enhancement(&mut self) {
        self.scheduler.cancel(ENHANCE_REQUEST);
        self.enhance_request = None;
        self.enhancement = None;
    }

    /// Drop all state and overlays, cancelling every timer and request.
    pub fn reset<D: DocumentModel + ?Sized>(&mut self, doc: &mut D) {
        self.scheduler.cancel_all();
        self.grammar.reset();
        self.completion.invalidate();
        self.enhance_request = None;
        self.enhancement = None;
        overlay::clear_findings(doc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use scribe_collab::access::RoomRole;
    use scribe_core::RichTextDocument;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::finding::FindingKind;

    /// Records requests and answers from canned replies.
    #[derive(Default)]
    struct StubAnalyzer {
        grammar_calls: Mutex<Vec<String>>,
        completion_calls: Mutex<Vec<String>>,
        findings: Vec<Finding>,
        suggestion: String,
        rate_limited: bool,
    }

    #[async_trait]
    impl AnalyzerClient for StubAnalyzer {
        async fn check_grammar(
            &self,
            text: &str,
        ) -> Result<AnalyzerReply<Vec<Finding>>, AnalyzerError> {
            self.grammar_calls.lock().unwrap().push(text.to_string());
            if self.rate_limited {
                return Ok(AnalyzerReply::RateLimited);
            }
            Ok(AnalyzerReply::Ready(self.findings.clone()))
        }

        async fn complete(
            &self,
            context: &str,
            _max_words: u32,
        ) -> Result<AnalyzerReply<String>, AnalyzerError> {
            self.completion_calls.lock().unwrap().push(context.to_string());
            Ok(AnalyzerReply::Ready(self.suggestion.clone()))
        }

        async fn enhance(
            &self,
            text: &str,
            _action: EnhanceAction,
        ) -> Result<AnalyzerReply<Enhancement>, AnalyzerError> {
            Ok(AnalyzerReply::Ready(Enhancement {
                enhanced_text: text.to_uppercase(),
                original_text: text.to_string(),
            }))
        }
    }

    struct Harness {
        pipeline: AnnotationPipeline,
        rx: mpsc::UnboundedReceiver<Fired<AssistEvent>>,
        stub: Arc<StubAnalyzer>,
        doc: RichTextDocument,
        gate: AccessGate,
    }

    impl Harness {
        fn new(stub: StubAnalyzer, html: &str) -> Self {
            let stub = Arc::new(stub);
            let mut pipeline = AnnotationPipeline::new(
                AssistConfig::default(),
                Some(stub.clone() as Arc<dyn AnalyzerClient>),
            );
            let rx = pipeline.take_event_rx().unwrap();
            let mut doc = RichTextDocument::from_serialized(html);
            let end = doc.end_pos();
            doc.set_selection(Selection::cursor(end));
            doc.drain_events();
            let mut gate = AccessGate::new();
            gate.set_role(RoomRole::Editor);
            Self {
                pipeline,
                rx,
                stub,
                doc,
                gate,
            }
        }

        /// Feed fired tasks back until one produces an update.
        async fn next_update(&mut self) -> AssistUpdate {
            loop {
                let fired = tokio::time::timeout(Duration::from_secs(10), self.rx.recv())
                    .await
                    .expect("no pipeline activity")
                    .expect("pipeline receiver closed");
                if let Some(update) = self.pipeline.handle(fired, &mut self.doc, &self.gate) {
                    return update;
                }
            }
        }

        fn type_text(&mut self, text: &str) {
            let at = self.doc.selection().from;
            self.doc.insert_text(at, text).unwrap();
            self.doc.drain_events();
            self.pipeline.document_changed();
        }
    }

    fn helo_finding() -> Finding {
        Finding::new(FindingKind::Spelling, 0, 4, "Possible spelling mistake")
            .with_suggestions(vec!["Hello".into()])
    }

    #[tokio::test(start_paused = true)]
    async fn test_grammar_findings_applied_after_debounce() {
        let stub = StubAnalyzer {
            findings: vec![helo_finding()],
            ..Default::default()
        };
        let mut h = Harness::new(stub, "<p>Helo world</p>");
        h.pipeline.document_changed();

        assert_eq!(
            h.next_update().await,
            AssistUpdate::FindingsApplied(OverlayReport {
                applied: 1,
                dropped: 0
            })
        );
        assert_eq!(*h.stub.grammar_calls.lock().unwrap(), vec!["Helo world".to_string()]);
        let placed = overlay::placed_findings(&h.doc);
        assert_eq!((placed[0].from, placed[0].to), (1, 5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_during_debounce_sends_one_request() {
        let mut h = Harness::new(StubAnalyzer::default(), "<p>Hello</p>");
        h.type_text(" there");
        tokio::time::sleep(Duration::from_millis(700)).await;
        h.type_text(" friend");
        tokio::time::sleep(Duration::from_millis(700)).await;
        h.type_text("!");

        h.next_update().await;
        assert_eq!(
            *h.stub.grammar_calls.lock().unwrap(),
            vec!["Hello there friend!".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_grammar_result_discarded() {
        let stub = StubAnalyzer {
            findings: vec![helo_finding()],
            ..Default::default()
        };
        let mut h = Harness::new(stub, "<p>Helo world</p>");
        h.pipeline.document_changed();

        // Run the debounces until the grammar request comes back.
        let result = loop {
            let fired = h.rx.recv().await.unwrap();
            if fired.key == GRAMMAR_REQUEST {
                break fired;
            }
            assert!(h.pipeline.handle(fired, &mut h.doc, &h.gate).is_none());
        };

        // The document moves on before the result is handled.
        h.doc.insert_text(1, "X").unwrap();
        assert!(h.pipeline.handle(result, &mut h.doc, &h.gate).is_none());
        assert!(overlay::placed_findings(&h.doc).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_formatting_snapshot_rechecks_same_text() {
        let stub = StubAnalyzer {
            findings: vec![helo_finding()],
            ..Default::default()
        };
        let mut h = Harness::new(stub, "<p>Helo world</p>");
        h.pipeline.config.completion_enabled = false;
        h.pipeline.document_changed();
        assert!(matches!(h.next_update().await, AssistUpdate::FindingsApplied(_)));

        // A peer bolds a word: same text, overlays wiped by the replace.
        h.doc.set_content("<p>Helo <strong>world</strong></p>", false);
        assert!(overlay::placed_findings(&h.doc).is_empty());
        let updates = h.pipeline.snapshot_applied(&mut h.doc);
        assert_eq!(updates, vec![AssistUpdate::FindingsCleared]);

        assert!(matches!(h.next_update().await, AssistUpdate::FindingsApplied(_)));
        assert_eq!(h.stub.grammar_calls.lock().unwrap().len(), 2);
        assert_eq!(overlay::placed_findings(&h.doc).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retyped_text_checked_again() {
        let stub = StubAnalyzer {
            findings: vec![helo_finding()],
            ..Default::default()
        };
        let mut h = Harness::new(stub, "<p>Helo world</p>");
        h.pipeline.config.completion_enabled = false;
        h.pipeline.document_changed();
        assert!(matches!(h.next_update().await, AssistUpdate::FindingsApplied(_)));

        h.doc.delete_range(4, 11).unwrap();
        h.doc.drain_events();
        h.pipeline.document_changed();
        assert_eq!(h.next_update().await, AssistUpdate::FindingsCleared);

        h.type_text("o world");
        assert_eq!(h.doc.text(), "Helo world");
        assert!(matches!(h.next_update().await, AssistUpdate::FindingsApplied(_)));
        assert_eq!(h.stub.grammar_calls.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_grammar() {
        let stub = StubAnalyzer {
            rate_limited: true,
            ..Default::default()
        };
        let mut h = Harness::new(stub, "<p>Helo world</p>");
        h.pipeline.document_changed();
        assert_eq!(h.next_update().await, AssistUpdate::RateLimited(Component::Grammar));
        assert!(overlay::placed_findings(&h.doc).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_ready_and_accept() {
        let stub = StubAnalyzer {
            suggestion: " over the lazy dog".into(),
            ..Default::default()
        };
        let mut h = Harness::new(stub, "<p>The quick brown fox jumps</p>");
        h.pipeline.config.grammar_enabled = false;
        h.pipeline.document_changed();

        assert_eq!(
            h.next_update().await,
            AssistUpdate::CompletionReady(" over the lazy dog".into())
        );
        assert_eq!(
            *h.stub.completion_calls.lock().unwrap(),
            vec!["The quick brown fox jumps".to_string()]
        );

        assert!(h.pipeline.accept_completion(&mut h.doc, &h.gate).unwrap());
        assert_eq!(h.doc.text(), "The quick brown fox jumps over the lazy dog");
        assert!(h.pipeline.suggestion().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_keystroke_clears_suggestion() {
        let mut h = Harness::new(
            StubAnalyzer {
                suggestion: " next".into(),
                ..Default::default()
            },
            "<p>The quick brown fox jumps</p>",
        );
        h.pipeline.config.grammar_enabled = false;
        h.pipeline.document_changed();
        h.next_update().await;
        assert!(h.pipeline.suggestion().is_some());

        let at = h.doc.selection().from;
        h.doc.insert_text(at, "!").unwrap();
        assert_eq!(h.pipeline.document_changed(), vec![AssistUpdate::CompletionCleared]);
        assert!(!h.pipeline.accept_completion(&mut h.doc, &h.gate).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_selection_change_clears_suggestion() {
        let mut h = Harness::new(
            StubAnalyzer {
                suggestion: " next".into(),
                ..Default::default()
            },
            "<p>The quick brown fox jumps</p>",
        );
        h.pipeline.config.grammar_enabled = false;
        h.pipeline.document_changed();
        h.next_update().await;

        h.doc.set_selection(Selection::cursor(2));
        assert_eq!(h.pipeline.selection_changed(), Some(AssistUpdate::CompletionCleared));
        assert_eq!(h.pipeline.selection_changed(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_viewer_gets_no_completion() {
        let mut h = Harness::new(
            StubAnalyzer {
                suggestion: " next".into(),
                ..Default::default()
            },
            "<p>The quick brown fox jumps</p>",
        );
        h.pipeline.config.grammar_enabled = false;
        h.gate.set_role(RoomRole::Viewer);
        h.pipeline.document_changed();

        let due = h.rx.recv().await.unwrap();
        assert!(h.pipeline.handle(due, &mut h.doc, &h.gate).is_none());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(h.rx.try_recv().is_err());
        assert!(h.stub.completion_calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_clears_findings() {
        let stub = StubAnalyzer {
            findings: vec![helo_finding()],
            ..Default::default()
        };
        let mut h = Harness::new(stub, "<p>Helo world</p>");
        h.pipeline.document_changed();
        h.next_update().await;
        assert_eq!(h.pipeline.findings().len(), 1);

        h.doc.set_content("<p>Completely new text</p>", false);
        let updates = h.pipeline.snapshot_applied(&mut h.doc);
        assert!(updates.contains(&AssistUpdate::FindingsCleared));
        assert!(h.pipeline.findings().is_empty());
        assert!(h.pipeline.is_pending(GRAMMAR_DEBOUNCE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_enhancement_replaces_stored_range() {
        let mut h = Harness::new(StubAnalyzer::default(), "<p>make this loud please</p>");
        h.doc.set_selection(Selection::new(6, 15));
        assert!(h.pipeline.request_enhancement(&h.doc, EnhanceAction::Improve));

        // The selection moves while the request is out.
        h.doc.set_selection(Selection::cursor(1));
        match h.next_update().await {
            AssistUpdate::EnhancementReady(e) => {
                assert_eq!(e.original_text, "this loud");
                assert_eq!(e.enhanced_text, "THIS LOUD");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(h.pipeline.apply_enhancement(&mut h.doc, &h.gate).unwrap());
        assert_eq!(h.doc.text(), "make THIS LOUD please");
    }

    #[tokio::test(start_paused = true)]
    async fn test_enhancement_dropped_after_edit() {
        let mut h = Harness::new(StubAnalyzer::default(), "<p>make this loud please</p>");
        h.doc.set_selection(Selection::new(6, 15));
        h.pipeline.request_enhancement(&h.doc, EnhanceAction::Shorten);
        h.next_update().await;

        h.doc.insert_text(1, "x").unwrap();
        assert!(!h.pipeline.apply_enhancement(&mut h.doc, &h.gate).unwrap());
        assert_eq!(h.doc.text(), "xmake this loud please");
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_suggestion_gated() {
        let stub = StubAnalyzer {
            findings: vec![helo_finding()],
            ..Default::default()
        };
        let mut h = Harness::new(stub, "<p>Helo world</p>");
        h.pipeline.document_changed();
        h.next_update().await;

        let finding = overlay::finding_at(&h.doc, 2).unwrap();
        let mut viewer = AccessGate::new();
        viewer.set_role(RoomRole::Viewer);
        assert!(!h
            .pipeline
            .apply_suggestion(&mut h.doc, &viewer, &finding, "Hello")
            .unwrap());

        assert!(h
            .pipeline
            .apply_suggestion(&mut h.doc, &h.gate, &finding, "Hello")
            .unwrap());
        assert_eq!(h.doc.text(), "Hello world");
        // The finding is gone with the word it covered.
        assert!(!h
            .pipeline
            .apply_suggestion(&mut h.doc, &h.gate, &finding, "Hello")
            .unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_cancels_everything() {
        let mut h = Harness::new(StubAnalyzer::default(), "<p>Helo world</p>");
        h.pipeline.document_changed();
        h.pipeline.reset(&mut h.doc);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(h.rx.try_recv().is_err());
        assert!(h.stub.grammar_calls.lock().unwrap().is_empty());
    }
}
