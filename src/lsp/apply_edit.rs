use async_trait::async_trait;
use lsp_types::request::Request as _;
use lsp_types::ApplyWorkspaceEditResponse;
use serde_json::{json, Value};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

use super::connection::RequestHandler;
use super::error::Result;
use crate::editor::{
    group, normalize, AppliedBatch, ApplyWorkspaceEditParams, EditApplicator, EditError,
    EditGroups,
};
use crate::workspace::{resolve, ResolvedDocuments, SessionRegistry};

/// Method name of the server-to-client edit request
pub const APPLY_EDIT_METHOD: &str = lsp_types::request::ApplyWorkspaceEdit::METHOD;

/// What happened to each document targeted by one request
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ApplyReport {
    pub applied: Vec<(String, AppliedBatch)>,
    /// URIs with no live document; their edits were dropped
    pub skipped: Vec<String>,
    pub failed: Vec<(String, EditError)>,
}

impl ApplyReport {
    /// True when no document failed. Skipped URIs do not count as failures.
    pub fn is_applied(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failure_reason(&self) -> Option<String> {
        self.failed
            .first()
            .map(|(uri, error)| format!("{}: {}", uri, error))
    }

    pub fn into_response(self) -> ApplyWorkspaceEditResponse {
        ApplyWorkspaceEditResponse {
            applied: self.is_applied(),
            failure_reason: self.failure_reason(),
            failed_change: None,
        }
    }
}

/// Route each document's batch to its live document.
///
/// One applicator call per resolvable URI, in group order. A failing document
/// does not stop the rest.
pub fn dispatch(
    groups: &EditGroups,
    documents: &ResolvedDocuments,
    applicator: &dyn EditApplicator,
) -> ApplyReport {
    let mut report = ApplyReport::default();

    for (uri, batch) in groups.iter() {
        let Some(document) = documents.get(uri) else {
            warn!("No open document for {}, dropping {} edit(s)", uri, batch.len());
            report.skipped.push(uri.to_string());
            continue;
        };

        match applicator.apply(document, batch) {
            Ok(applied) => {
                debug!(
                    "Applied {} edit(s) to {}, now at version {}",
                    applied.edit_count, uri, applied.version
                );
                report.applied.push((uri.to_string(), applied));
            }
            Err(e) => {
                warn!("Failed to apply edits to {}: {}", uri, e);
                report.failed.push((uri.to_string(), e));
            }
        }
    }

    report
}

/// Handler for `workspace/applyEdit` requests
pub struct ApplyEditHandler {
    // Weak: the registry owns the connections that own this handler
    registry: Weak<SessionRegistry>,
    applicator: Arc<dyn EditApplicator>,
}

impl ApplyEditHandler {
    pub fn new(registry: &Arc<SessionRegistry>, applicator: Arc<dyn EditApplicator>) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            applicator,
        }
    }

    /// Apply a request's edits to the documents open right now
    pub fn apply(&self, params: Value) -> ApplyReport {
        let params = ApplyWorkspaceEditParams::from_value(params);
        let groups = group(normalize(&params.edit));
        if groups.is_empty() {
            debug!("applyEdit request carries no text edits");
            return ApplyReport::default();
        }

        let Some(registry) = self.registry.upgrade() else {
            return ApplyReport {
                skipped: groups.uris().map(str::to_string).collect(),
                ..ApplyReport::default()
            };
        };

        let documents = resolve(&registry.snapshot());
        let report = dispatch(&groups, &documents, self.applicator.as_ref());
        if let Some(label) = &params.label {
            info!(
                "Applied edit \"{}\": {} changed, {} skipped, {} failed",
                label,
                report.applied.len(),
                report.skipped.len(),
                report.failed.len()
            );
        }

        notify_changed(&registry, &documents, &report);
        report
    }
}

/// Tell every server holding a changed document about its new content
fn notify_changed(registry: &SessionRegistry, documents: &ResolvedDocuments, report: &ApplyReport) {
    for (uri, _) in &report.applied {
        let Some(document) = documents.get(uri) else {
            continue;
        };
        let connections = registry.connections_for(document);
        if connections.is_empty() {
            continue;
        }
        let (text, version) = match document.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Cannot read {} after edit: {}", uri, e);
                continue;
            }
        };

        let params = json!({
            "textDocument": { "uri": uri, "version": version },
            "contentChanges": [{ "text": text }]
        });
        for connection in connections {
            if let Err(e) = connection.notify("textDocument/didChange", params.clone()) {
                warn!("Failed to send didChange for {}: {}", uri, e);
            }
        }
    }
}

#[async_trait]
impl RequestHandler for ApplyEditHandler {
    async fn handle(&self, params: Value) -> Result<Value> {
        let response = self.apply(params).into_response();
        Ok(serde_json::to_value(response)?)
    }
}
