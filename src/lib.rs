//! Client-side handling of LSP `workspace/applyEdit` requests.
//!
//! Incoming edits are normalized, grouped per document, resolved against the
//! documents open in the host, and applied one batch per document.

pub mod app;
pub mod config;
pub mod core;
pub mod editor;
pub mod lsp;
pub mod workspace;
