//! # scribe-core — Document Model Adapter
//!
//! The rich-text document the sync and annotation layers operate on, and the
//! [`DocumentModel`] contract they reach it through.
//!
//! ## Position model
//!
//! ```text
//!  <p> H e l l o </p> <p> w o r l d </p>
//! 0   1 2 3 4 5 6    7   8 ...        13   14
//! ```
//!
//! Every block contributes an open token, its characters, and a close token.
//! The plain-text projection joins blocks with a single `\n`, so plain offset
//! `o` inside block `i` sits at engine position `o + i + 1`.
//!
//! ## Modules
//!
//! - [`model`] — the adapter contract, marks, selection, change events
//! - [`document`] — [`RichTextDocument`], the in-memory implementation
//! - `block` — block nodes and mark spans
//! - `html` — canonical snapshot (de)serialization

pub mod model;
pub mod document;
mod block;
mod html;

pub use block::{Block, BlockKind};
pub use document::{DocumentStats, RichTextDocument};
pub use model::{
    DocumentError, DocumentEvent, DocumentModel, Mark, MarkAttrs, MarkKind, PositionResolver,
    Selection,
};
