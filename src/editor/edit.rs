use lsp_types::TextEdit;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Versioned text document identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedTextDocumentIdentifier {
    pub uri: String,
    #[serde(default)]
    pub version: Option<i32>,
}

/// Text document edit (multiple edits to a single document)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextDocumentEdit {
    #[serde(rename = "textDocument")]
    pub text_document: VersionedTextDocumentIdentifier,
    pub edits: Vec<TextEdit>,
}

impl TextDocumentEdit {
    pub fn new(uri: impl Into<String>, version: Option<i32>, edits: Vec<TextEdit>) -> Self {
        Self {
            text_document: VersionedTextDocumentIdentifier {
                uri: uri.into(),
                version,
            },
            edits,
        }
    }

    pub fn uri(&self) -> &str {
        &self.text_document.uri
    }
}

/// Workspace edit as it arrives on the wire.
///
/// Both fields are kept as raw JSON so that a single malformed entry does not
/// reject the whole payload; interpretation happens in [`super::normalize`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceEdit {
    #[serde(rename = "documentChanges", default, skip_serializing_if = "Option::is_none")]
    pub document_changes: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<Value>,
}

/// Params of a `workspace/applyEdit` request. `label` is accepted but unused.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyWorkspaceEditParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub edit: WorkspaceEdit,
}

impl ApplyWorkspaceEditParams {
    /// Decode request params; anything undecodable means there is nothing to apply
    pub fn from_value(params: Value) -> Self {
        match serde_json::from_value(params) {
            Ok(params) => params,
            Err(e) => {
                tracing::debug!("Ignoring malformed applyEdit params: {}", e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_text_document_edit() {
        let edit: TextDocumentEdit = serde_json::from_value(json!({
            "textDocument": { "uri": "file:///a.py", "version": 3 },
            "edits": [{
                "range": {
                    "start": { "line": 0, "character": 0 },
                    "end": { "line": 0, "character": 1 }
                },
                "newText": "x"
            }]
        }))
        .unwrap();

        assert_eq!(edit.uri(), "file:///a.py");
        assert_eq!(edit.text_document.version, Some(3));
        assert_eq!(edit.edits[0].new_text, "x");
    }

    #[test]
    fn test_annotated_edit_reads_as_plain() {
        let edit: TextDocumentEdit = serde_json::from_value(json!({
            "textDocument": { "uri": "file:///a.py", "version": null },
            "edits": [{
                "range": {
                    "start": { "line": 1, "character": 2 },
                    "end": { "line": 1, "character": 2 }
                },
                "newText": "y",
                "annotationId": "rename"
            }]
        }))
        .unwrap();

        assert_eq!(edit.text_document.version, None);
        assert_eq!(edit.edits.len(), 1);
    }

    #[test]
    fn test_malformed_params_are_empty() {
        let params = ApplyWorkspaceEditParams::from_value(json!("not an object"));
        assert!(params.edit.document_changes.is_none());
        assert!(params.edit.changes.is_none());

        let params = ApplyWorkspaceEditParams::from_value(json!({ "label": "fix" }));
        assert_eq!(params.label.as_deref(), Some("fix"));
        assert!(params.edit.document_changes.is_none());
    }
}
