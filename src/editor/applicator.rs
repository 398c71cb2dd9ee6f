use super::buffer::AppliedBatch;
use super::edit::TextDocumentEdit;
use super::error::Result;
use crate::workspace::Document;

/// Applies one document's batch of edits to its live buffer
pub trait EditApplicator: Send + Sync {
    fn apply(&self, document: &Document, batch: &[TextDocumentEdit]) -> Result<AppliedBatch>;
}

/// Applicator writing straight into the document's rope
#[derive(Debug, Default, Clone, Copy)]
pub struct BufferApplicator;

impl EditApplicator for BufferApplicator {
    fn apply(&self, document: &Document, batch: &[TextDocumentEdit]) -> Result<AppliedBatch> {
        document.apply_batch(batch)
    }
}
