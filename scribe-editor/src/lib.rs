//! # scribe-editor — The editor session
//!
//! Wires a [`scribe_core::DocumentModel`] to a room connection and the
//! writing-assistance pipeline, and runs them on one loop:
//!
//! ```no_run
//! # async fn run() -> Result<(), scribe_editor::SessionError> {
//! use scribe_core::{DocumentModel, RichTextDocument};
//! use scribe_editor::{EditorConfig, EditorSession};
//!
//! let mut session = EditorSession::new(EditorConfig::default(), RichTextDocument::new());
//! session.authenticate("token")?;
//! session.join("notes").await?;
//!
//! session.edit(|doc| doc.insert_text(1, "Hello"))?;
//! while let Some(update) = session.step().await {
//!     println!("{update:?}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`session`] — `EditorSession`, the event loop and its updates
//! - [`config`] — TOML configuration for sync and assistance

pub mod config;
pub mod session;

pub use config::{ConfigError, EditorConfig, SyncConfig};
pub use session::{EditorSession, SessionError, SessionUpdate};
