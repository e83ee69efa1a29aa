//! The editor session: one document, one room connection, one loop.
//!
//! ```text
//!            edit(|doc| …)                      step().await
//!                 │                                  │
//!                 ▼                       ┌──────────┼───────────┐
//!          drain document events          ▼          ▼           ▼
//!           │               │        channel ev   sync timer   assist task
//!           ▼               ▼            │           │           │
//!   ContentReconciler  AnnotationPipeline│           │           │
//!   (pending + timer)  (debounces)       ▼           ▼           ▼
//!                                  apply_inbound   send      overlay / hint
//! ```
//!
//! Everything that touches the document runs on the caller's task, inside
//! [`EditorSession::edit`] or [`EditorSession::step`]. Timers and network
//! requests run as tokio tasks whose results come back through `step`, where
//! they are checked against the document as it is by then.

use std::collections::VecDeque;
use std::sync::Arc;

use scribe_assist::{
    AnalyzerClient, AnalyzerError, AnnotationPipeline, AssistEvent, AssistUpdate, EnhanceAction,
    HttpAnalyzer, PlacedFinding,
};
use scribe_collab::{
    AccessGate, ChannelError, ChannelEvent, Component, ConnectionStatus, ContentReconciler, Fired,
    Inbound, InboundOutcome, RoomPresence, RoomRole, Scheduler, SessionChannel, SessionEvent,
    TaskKey,
};
use scribe_core::{
    DocumentError, DocumentEvent, DocumentModel, DocumentStats, PositionResolver,
    RichTextDocument,
};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::EditorConfig;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("room name is empty")]
    EmptyRoom,
    #[error("not authenticated")]
    NotAuthenticated,
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),
    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// Something the UI should know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    Joined { room: String },
    /// A remote snapshot replaced the document.
    ContentApplied { edited_by: Option<String> },
    RoleChanged(RoomRole),
    PresenceChanged,
    /// The server refused something, e.g. an edit from a viewer.
    ServerError(String),
    /// The pending local edit went out.
    Sent,
    /// The credential was refused; call `authenticate` before joining again.
    Rejected { reason: String },
    Closed,
    Assist(AssistUpdate),
}

#[derive(Debug)]
enum SessionTimer {
    ContentDue,
}

const CONTENT_DEBOUNCE: TaskKey = TaskKey::debounce(Component::Content);

enum Input {
    Channel(Option<ChannelEvent>),
    Timer(Fired<SessionTimer>),
    Assist(Fired<AssistEvent>),
}

pub struct EditorSession<D: DocumentModel = RichTextDocument> {
    config: EditorConfig,
    doc: D,
    channel: SessionChannel,
    channel_rx: mpsc::Receiver<ChannelEvent>,
    reconciler: ContentReconciler,
    gate: AccessGate,
    presence: RoomPresence,
    assist: AnnotationPipeline,
    assist_rx: mpsc::UnboundedReceiver<Fired<AssistEvent>>,
    timers: Scheduler<SessionTimer>,
    timer_rx: mpsc::UnboundedReceiver<Fired<SessionTimer>>,
    credential: Option<String>,
    updates: VecDeque<SessionUpdate>,
}

impl<D: DocumentModel> EditorSession<D> {
    pub fn new(config: EditorConfig, doc: D) -> Self {
        let mut channel = SessionChannel::new(config.sync.channel());
        let channel_rx = channel
            .take_event_rx()
            .unwrap_or_else(|| mpsc::channel(1).1);
        let mut assist = AnnotationPipeline::new(config.assist.clone(), None);
        let assist_rx = assist
            .take_event_rx()
            .unwrap_or_else(|| mpsc::unbounded_channel().1);
        let (timers, timer_rx) = Scheduler::new();

        Self {
            reconciler: ContentReconciler::new(config.sync.reconciler()),
            config,
            doc,
            channel,
            channel_rx,
            gate: AccessGate::new(),
            presence: RoomPresence::new(),
            assist,
            assist_rx,
            timers,
            timer_rx,
            credential: None,
            updates: VecDeque::new(),
        }
    }

    /// Set the credential used for the room connection and the analyzer.
    pub fn authenticate(&mut self, credential: impl Into<String>) -> Result<(), SessionError> {
        let credential = credential.into();
        let analyzer = HttpAnalyzer::new(&self.config.assist, credential.clone())?;
        self.assist.set_analyzer(Some(Arc::new(analyzer)));
        self.credential = Some(credential);
        Ok(())
    }

    /// Use a specific analyzer instead of the HTTP one.
    pub fn set_analyzer(&mut self, analyzer: Option<Arc<dyn AnalyzerClient>>) {
        self.assist.set_analyzer(analyzer);
    }

    pub fn is_authenticated(&self) -> bool {
        self.credential.is_some()
    }

    /// Join `room`, leaving the current one first.
    pub async fn join(&mut self, room: &str) -> Result<(), SessionError> {
        let room = room.trim();
        if room.is_empty() {
            return Err(SessionError::EmptyRoom);
        }
        let credential = self.credential.clone().ok_or(SessionError::NotAuthenticated)?;

        self.reset_room_state();
        match self.channel.connect(room, &credential).await {
            Ok(()) => Ok(()),
            Err(ChannelError::Rejected { reason }) => {
                self.forget_credential();
                Err(ChannelError::Rejected { reason }.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn leave(&mut self) {
        self.channel.disconnect().await;
        self.reset_room_state();
    }

    fn reset_room_state(&mut self) {
        self.timers.cancel_all();
        self.reconciler.clear();
        self.gate.reset();
        self.presence.clear();
        self.assist.reset(&mut self.doc);
        self.updates.clear();
    }

    fn forget_credential(&mut self) {
        log::warn!("credential rejected, re-authentication required");
        self.credential = None;
        self.assist.set_analyzer(None);
    }

    pub fn document(&self) -> &D {
        &self.doc
    }

    pub fn role(&self) -> Option<RoomRole> {
        self.gate.role()
    }

    pub fn can_write(&self) -> bool {
        self.gate.can_write()
    }

    pub fn presence(&self) -> &RoomPresence {
        &self.presence
    }

    pub fn room(&self) -> Option<&str> {
        self.channel.room()
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.channel.status().await
    }

    pub fn has_pending_edit(&self) -> bool {
        self.reconciler.has_pending()
    }

    pub fn suggestion(&self) -> Option<&str> {
        self.assist.suggestion()
    }

    /// Mutate the document as the local user.
    pub fn edit<R>(&mut self, f: impl FnOnce(&mut D) -> R) -> R {
        let result = f(&mut self.doc);
        self.local_changes();
        result
    }

    fn local_changes(&mut self) {
        let mut content_changed = false;
        let mut selection_changed = false;
        for event in self.doc.drain_events() {
            match event {
                DocumentEvent::ContentChanged { .. } => content_changed = true,
                DocumentEvent::SelectionChanged { .. } => selection_changed = true,
            }
        }

        if content_changed {
            let delay = self
                .reconciler
                .on_local_change(self.doc.serialize(), self.gate.can_write());
            self.timers
                .schedule(CONTENT_DEBOUNCE, delay, SessionTimer::ContentDue);
            let updates = self.assist.document_changed();
            self.updates.extend(updates.into_iter().map(SessionUpdate::Assist));
        } else if selection_changed {
            if let Some(update) = self.assist.selection_changed() {
                self.updates.push_back(SessionUpdate::Assist(update));
            }
        }
    }

    /// Wait for the next thing that changes what the user sees.
    ///
    /// Returns `None` once the channel's event stream has ended.
    pub async fn step(&mut self) -> Option<SessionUpdate> {
        loop {
            if let Some(update) = self.updates.pop_front() {
                return Some(update);
            }

            let input = tokio::select! {
                event = self.channel_rx.recv() => Input::Channel(event),
                Some(fired) = self.timer_rx.recv() => Input::Timer(fired),
                Some(fired) = self.assist_rx.recv() => Input::Assist(fired),
            };

            let update = match input {
                Input::Channel(None) => return None,
                Input::Channel(Some(event)) => {
                    if !self.channel.is_current(&event) {
                        log::trace!("dropping event from retired connection");
                        continue;
                    }
                    let update = self.on_channel_event(event.event);
                    if matches!(update, Some(SessionUpdate::Rejected { .. })) {
                        self.channel.disconnect().await;
                    }
                    update
                }
                Input::Timer(fired) => match self.timers.accept(fired) {
                    Some(SessionTimer::ContentDue) => self.flush_pending().await,
                    None => None,
                },
                Input::Assist(fired) => self
                    .assist
                    .handle(fired, &mut self.doc, &self.gate)
                    .map(SessionUpdate::Assist),
            };
            if let Some(update) = update {
                return Some(update);
            }
        }
    }

    async fn flush_pending(&mut self) -> Option<SessionUpdate> {
        let content = self.reconciler.on_debounce_elapsed(&self.gate)?;
        match self.channel.send(&content).await {
            Ok(true) => Some(SessionUpdate::Sent),
            Ok(false) => None,
            Err(e) => {
                log::warn!("failed to send content: {}", e);
                None
            }
        }
    }

    fn on_channel_event(&mut self, event: SessionEvent) -> Option<SessionUpdate> {
        match event {
            SessionEvent::Opened => Some(SessionUpdate::Joined {
                room: self.channel.room().unwrap_or_default().to_string(),
            }),
            SessionEvent::Message(Inbound::Content { data, edited_by }) => {
                match self.reconciler.apply_inbound(&mut self.doc, &data) {
                    InboundOutcome::Unchanged => None,
                    InboundOutcome::Applied { .. } => {
                        // The reconciler dropped any pending edit with it.
                        self.timers.cancel(CONTENT_DEBOUNCE);
                        let updates = self.assist.snapshot_applied(&mut self.doc);
                        self.updates.extend(updates.into_iter().map(SessionUpdate::Assist));
                        Some(SessionUpdate::ContentApplied { edited_by })
                    }
                }
            }
            SessionEvent::Message(Inbound::Role(role)) => {
                self.gate.set_role(role);
                Some(SessionUpdate::RoleChanged(role))
            }
            SessionEvent::Message(Inbound::Presence(participants)) => self
                .presence
                .replace(participants)
                .then_some(SessionUpdate::PresenceChanged),
            SessionEvent::Message(Inbound::Error(message)) => {
                log::warn!("server error: {}", message);
                Some(SessionUpdate::ServerError(message))
            }
            SessionEvent::Message(Inbound::Unknown(kind)) => {
                log::debug!("ignoring '{}' message", kind);
                None
            }
            SessionEvent::Rejected { reason } => {
                self.reset_room_state();
                self.forget_credential();
                Some(SessionUpdate::Rejected { reason })
            }
            SessionEvent::Closed => {
                self.timers.cancel_all();
                self.reconciler.clear();
                Some(SessionUpdate::Closed)
            }
        }
    }

    /// Insert the current completion at the cursor.
    pub fn accept_completion(&mut self) -> Result<bool, SessionError> {
        let inserted = self.assist.accept_completion(&mut self.doc, &self.gate)?;
        if inserted {
            self.local_changes();
        }
        Ok(inserted)
    }

    /// The finding under a viewport point.
    pub fn inspect<R: PositionResolver + ?Sized>(
        &self,
        resolver: &R,
        x: f32,
        y: f32,
    ) -> Option<PlacedFinding> {
        self.assist.inspect(&self.doc, resolver, x, y)
    }

    pub fn apply_suggestion(
        &mut self,
        finding: &PlacedFinding,
        suggestion: &str,
    ) -> Result<bool, SessionError> {
        let applied = self
            .assist
            .apply_suggestion(&mut self.doc, &self.gate, finding, suggestion)?;
        if applied {
            self.local_changes();
        }
        Ok(applied)
    }

    /// Ask for a rewrite of the selection; the result arrives through `step`.
    pub fn request_enhancement(&mut self, action: EnhanceAction) -> bool {
        self.assist.request_enhancement(&self.doc, action)
    }

    pub fn apply_enhancement(&mut self) -> Result<bool, SessionError> {
        let applied = self.assist.apply_enhancement(&mut self.doc, &self.gate)?;
        if applied {
            self.local_changes();
        }
        Ok(applied)
    }

    pub fn discard_enhancement(&mut self) {
        self.assist.discard_enhancement();
    }
}

impl EditorSession<RichTextDocument> {
    pub fn stats(&self) -> DocumentStats {
        self.doc.stats()
    }
}
