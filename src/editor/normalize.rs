use lsp_types::TextEdit;
use serde_json::Value;
use tracing::debug;

use super::edit::{TextDocumentEdit, WorkspaceEdit};

/// The two wire forms a workspace edit can take, resolved once
#[derive(Debug, Clone, PartialEq)]
pub enum EditPayload {
    /// `documentChanges`: ordered per-document edits
    ByDocument(Vec<TextDocumentEdit>),
    /// Legacy `changes`: URI to raw edits, in map iteration order
    ByUriMap(Vec<(String, Vec<TextEdit>)>),
    /// Neither form present
    Empty,
}

impl EditPayload {
    /// Classify a raw workspace edit. `documentChanges` wins when both are present.
    pub fn from_workspace_edit(edit: &WorkspaceEdit) -> Self {
        if let Some(document_changes) = &edit.document_changes {
            return match document_changes {
                Value::Array(entries) => Self::ByDocument(
                    entries
                        .iter()
                        .enumerate()
                        .filter_map(|(index, entry)| text_document_edit(index, entry))
                        .collect(),
                ),
                other => {
                    debug!("documentChanges is not an array: {}", other);
                    Self::Empty
                }
            };
        }

        match &edit.changes {
            Some(Value::Object(map)) => Self::ByUriMap(
                map.iter()
                    .filter_map(|(uri, edits)| {
                        match serde_json::from_value::<Vec<TextEdit>>(edits.clone()) {
                            Ok(edits) => Some((uri.clone(), edits)),
                            Err(e) => {
                                debug!("Dropping changes for {}: {}", uri, e);
                                None
                            }
                        }
                    })
                    .collect(),
            ),
            Some(other) => {
                debug!("changes is not an object: {}", other);
                Self::Empty
            }
            None => Self::Empty,
        }
    }

    /// Flatten into the canonical ordered sequence of per-document edits
    pub fn into_document_edits(self) -> Vec<TextDocumentEdit> {
        match self {
            Self::ByDocument(edits) => edits,
            Self::ByUriMap(changes) => changes
                .into_iter()
                .map(|(uri, edits)| TextDocumentEdit::new(uri, None, edits))
                .collect(),
            Self::Empty => Vec::new(),
        }
    }
}

/// Keep a `documentChanges` entry only if it is a text edit with operations.
/// Resource operations (create/rename/delete) fail to decode and are dropped here.
fn text_document_edit(index: usize, entry: &Value) -> Option<TextDocumentEdit> {
    match serde_json::from_value::<TextDocumentEdit>(entry.clone()) {
        Ok(edit) if !edit.edits.is_empty() => Some(edit),
        Ok(edit) => {
            debug!("Dropping documentChanges[{}] for {}: no edits", index, edit.uri());
            None
        }
        Err(e) => {
            debug!("Dropping documentChanges[{}]: {}", index, e);
            None
        }
    }
}

/// Normalize a workspace edit into an ordered sequence of per-document edits.
///
/// Malformed or empty payloads yield an empty sequence rather than an error.
pub fn normalize(edit: &WorkspaceEdit) -> Vec<TextDocumentEdit> {
    EditPayload::from_workspace_edit(edit).into_document_edits()
}
