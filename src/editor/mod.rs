pub mod applicator;
pub mod buffer;
pub mod edit;
pub mod error;
pub mod group;
pub mod normalize;

// Re-export common types
pub use applicator::{BufferApplicator, EditApplicator};
pub use buffer::{AppliedBatch, TextBuffer};
pub use edit::{
    ApplyWorkspaceEditParams, TextDocumentEdit, VersionedTextDocumentIdentifier, WorkspaceEdit,
};
pub use error::EditError;
pub use group::{group, EditGroups};
pub use normalize::{normalize, EditPayload};
