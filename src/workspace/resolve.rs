use std::collections::HashMap;

use super::{DocumentHandle, SessionSnapshot};

/// URI to live document lookup, rebuilt for every request
#[derive(Debug, Default, Clone)]
pub struct ResolvedDocuments {
    by_uri: HashMap<String, DocumentHandle>,
}

impl ResolvedDocuments {
    pub fn get(&self, uri: &str) -> Option<&DocumentHandle> {
        self.by_uri.get(uri)
    }

    pub fn len(&self) -> usize {
        self.by_uri.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_uri.is_empty()
    }
}

/// Build the lookup from a session snapshot.
///
/// Sessions whose document is not ready are skipped. If two sessions report
/// the same URI, the later one wins.
pub fn resolve<'a>(sessions: impl IntoIterator<Item = &'a SessionSnapshot>) -> ResolvedDocuments {
    let mut by_uri = HashMap::new();
    for session in sessions {
        if let Some(document) = &session.document {
            by_uri.insert(document.uri().to_string(), document.clone());
        }
    }
    ResolvedDocuments { by_uri }
}
