use lsp_types::Position;
use thiserror::Error;

/// Errors raised while applying a batch of edits to a document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    #[error("Invalid range: start {}:{} is after end {}:{}", start.line, start.character, end.line, end.character)]
    InvalidRange { start: Position, end: Position },

    #[error("Overlapping edits at {}:{}", at.line, at.character)]
    OverlappingEdits { at: Position },

    #[error("Version mismatch for {uri}: edit targets version {expected}, document is at {actual}")]
    VersionMismatch {
        uri: String,
        expected: i32,
        actual: i32,
    },

    #[error("Document is unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, EditError>;
