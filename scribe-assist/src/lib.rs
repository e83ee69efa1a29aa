//! # scribe-assist — Writing assistance overlays for scribe
//!
//! Sends the document to an analyzer backend and lays the results over the
//! text without touching its content: spelling, grammar and style findings
//! as marks, inline completions at the cursor, and rewrites of a selection.
//!
//! ## Architecture
//!
//! ```text
//!  local edit ──► AnnotationPipeline ──(debounce)──► AnalyzerClient (HTTP)
//!                        ▲                                  │
//!                        │ handle(fired, doc, gate)         │ findings / suggestion
//!                        └──────────── Scheduler ◄──────────┘
//!                        │
//!                        ▼
//!              overlay marks on the DocumentModel
//! ```
//!
//! Every result is checked against the document version (and for
//! completions, the cursor and prefix) it was computed for; anything stale
//! is dropped rather than re-placed.
//!
//! ## Modules
//!
//! - [`client`] — analyzer trait and the bearer-authenticated HTTP client
//! - [`finding`] — findings as the analyzer reports them
//! - [`grammar`] — when to check, which results still count
//! - [`completion`] — suggestion validity at the cursor
//! - [`overlay`] — placing findings as marks, hit-testing, applying fixes
//! - [`pipeline`] — debounced orchestration of all of the above
//! - [`config`] — thresholds and timings

pub mod client;
pub mod completion;
pub mod config;
pub mod finding;
pub mod grammar;
pub mod overlay;
pub mod pipeline;

pub use client::{
    AnalyzerClient, AnalyzerError, AnalyzerReply, EnhanceAction, Enhancement, HttpAnalyzer,
};
pub use completion::{CompletionAnalyzer, CompletionTicket, Suggestion};
pub use config::AssistConfig;
pub use finding::{Finding, FindingKind};
pub use grammar::{GrammarAnalyzer, GrammarDecision, GrammarTicket};
pub use overlay::{OverlayReport, PlacedFinding};
pub use pipeline::{AnnotationPipeline, AssistEvent, AssistUpdate};
