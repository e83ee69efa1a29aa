//! # scribe-collab — Room synchronization for scribe
//!
//! Keeps a local document in step with a shared room over WebSocket, using
//! whole-document snapshots with last-write-wins.
//!
//! ## Architecture
//!
//! ```text
//!   local edit                                   room server
//!       │                                             ▲  │
//!       ▼                                             │  │ presence / content
//! ┌──────────────────┐  debounce  ┌───────────────┐   │  │ role / error
//! │ContentReconciler │ ─────────► │ SessionChannel│ ──┘  │
//! │ (pending edit)   │  + gate    │ (WebSocket)   │ ◄────┘
//! └────────┬─────────┘            └───────┬───────┘
//!          │ apply_inbound                │ Inbound
//!          ▼                              ▼
//!   DocumentModel                AccessGate / RoomPresence
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — inbound frame classification, outbound encoding
//! - [`client`] — WebSocket session channel with rejection handling
//! - [`reconcile`] — debounced outbound edits, echo-suppressed inbound
//! - [`access`] — room roles and the write gate
//! - [`presence`] — participant list
//! - [`scheduler`] — keyed, cancellable timers and requests

pub mod protocol;
pub mod client;
pub mod reconcile;
pub mod access;
pub mod presence;
pub mod scheduler;

pub use access::{AccessGate, Permission, RoomRole};
pub use client::{
    ChannelConfig, ChannelError, ChannelEvent, ConnectionStatus, SessionChannel, SessionEvent,
};
pub use presence::RoomPresence;
pub use protocol::{Inbound, Participant, ProtocolError};
pub use reconcile::{ContentReconciler, InboundOutcome, ReconcilerConfig};
pub use scheduler::{Component, Fired, Purpose, Scheduler, TaskKey};
