use std::collections::HashMap;

use super::edit::TextDocumentEdit;

/// Per-document edits keyed by exact URI, in order of first appearance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditGroups {
    groups: Vec<(String, Vec<TextDocumentEdit>)>,
    index: HashMap<String, usize>,
}

impl EditGroups {
    /// Append an edit to its URI's group
    pub fn push(&mut self, edit: TextDocumentEdit) {
        match self.index.get(edit.uri()) {
            Some(&slot) => self.groups[slot].1.push(edit),
            None => {
                let uri = edit.uri().to_string();
                self.index.insert(uri.clone(), self.groups.len());
                self.groups.push((uri, vec![edit]));
            }
        }
    }

    pub fn get(&self, uri: &str) -> Option<&[TextDocumentEdit]> {
        self.index
            .get(uri)
            .map(|&slot| self.groups[slot].1.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[TextDocumentEdit])> {
        self.groups
            .iter()
            .map(|(uri, edits)| (uri.as_str(), edits.as_slice()))
    }

    pub fn uris(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(uri, _)| uri.as_str())
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl FromIterator<TextDocumentEdit> for EditGroups {
    fn from_iter<I: IntoIterator<Item = TextDocumentEdit>>(iter: I) -> Self {
        let mut groups = Self::default();
        for edit in iter {
            groups.push(edit);
        }
        groups
    }
}

/// Partition normalized edits by target URI.
///
/// No URI normalization happens: `file:///A.py` and `file:///a.py` are different
/// documents here.
pub fn group(edits: impl IntoIterator<Item = TextDocumentEdit>) -> EditGroups {
    edits.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::edit::WorkspaceEdit;
    use crate::editor::normalize::normalize;
    use lsp_types::{Position, Range, TextEdit};
    use serde_json::json;

    fn edit(uri: &str, text: &str) -> TextDocumentEdit {
        TextDocumentEdit::new(
            uri,
            None,
            vec![TextEdit::new(
                Range::new(Position::new(0, 0), Position::new(0, 0)),
                text.to_string(),
            )],
        )
    }

    #[test]
    fn test_group_is_order_preserving_partition() {
        let input = vec![
            edit("file:///b.py", "b1"),
            edit("file:///a.py", "a1"),
            edit("file:///b.py", "b2"),
            edit("file:///c.py", "c1"),
            edit("file:///a.py", "a2"),
        ];

        let groups = group(input.clone());

        assert_eq!(
            groups.uris().collect::<Vec<_>>(),
            vec!["file:///b.py", "file:///a.py", "file:///c.py"]
        );

        let total: usize = groups.iter().map(|(_, edits)| edits.len()).sum();
        assert_eq!(total, input.len());

        for (uri, edits) in groups.iter() {
            assert!(edits.iter().all(|e| e.uri() == uri));
            let expected: Vec<_> = input.iter().filter(|e| e.uri() == uri).cloned().collect();
            assert_eq!(edits, expected.as_slice());
        }
    }

    #[test]
    fn test_group_uses_exact_uri_match() {
        let groups = group(vec![
            edit("file:///A.py", "upper"),
            edit("file:///a.py", "lower"),
            edit("file:///a%2Epy", "encoded"),
        ]);

        assert_eq!(groups.len(), 3);
        assert_eq!(groups.get("file:///a.py").map(|e| e.len()), Some(1));
        assert!(groups.get("file:///missing.py").is_none());
    }

    #[test]
    fn test_group_empty() {
        let groups = group(Vec::new());
        assert!(groups.is_empty());
        assert_eq!(groups.len(), 0);
    }

    #[test]
    fn test_normalize_then_group_is_idempotent() {
        let raw: WorkspaceEdit = serde_json::from_value(json!({
            "documentChanges": [
                {
                    "textDocument": { "uri": "file:///a.py", "version": 1 },
                    "edits": [{
                        "range": {
                            "start": { "line": 0, "character": 0 },
                            "end": { "line": 0, "character": 3 }
                        },
                        "newText": "abc"
                    }]
                },
                { "kind": "delete", "uri": "file:///gone.py" }
            ]
        }))
        .unwrap();

        let first = group(normalize(&raw));
        let second = group(normalize(&raw));
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
    }
}
