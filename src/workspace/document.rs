use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use url::Url;

use crate::editor::buffer::{AppliedBatch, TextBuffer};
use crate::editor::edit::TextDocumentEdit;
use crate::editor::error::{EditError, Result};

/// Shared handle to a live document
pub type DocumentHandle = Arc<Document>;

/// Version a document has right after it is opened
pub const INITIAL_VERSION: i32 = 1;

/// An open document addressable by URI
#[derive(Debug)]
pub struct Document {
    uri: String,
    language_id: String,
    path: Option<PathBuf>,
    buffer: RwLock<TextBuffer>,
}

impl Document {
    pub fn new(uri: impl Into<String>, language_id: impl Into<String>, text: &str) -> Self {
        Self {
            uri: uri.into(),
            language_id: language_id.into(),
            path: None,
            buffer: RwLock::new(TextBuffer::new(text, INITIAL_VERSION)),
        }
    }

    /// Open a file from disk, addressed by its `file://` URI
    pub async fn open(path: &Path, language_id: &str) -> std::io::Result<DocumentHandle> {
        let path = tokio::fs::canonicalize(path).await?;
        let text = tokio::fs::read_to_string(&path).await?;

        let mut document = Self::new(file_uri(&path)?, language_id, &text);
        document.path = Some(path);
        Ok(Arc::new(document))
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn language_id(&self) -> &str {
        &self.language_id
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn text(&self) -> Result<String> {
        Ok(self.read()?.text())
    }

    pub fn version(&self) -> Result<i32> {
        Ok(self.read()?.version())
    }

    /// Text and version read under one lock
    pub fn snapshot(&self) -> Result<(String, i32)> {
        let buffer = self.read()?;
        Ok((buffer.text(), buffer.version()))
    }

    /// Apply one document's batch atomically
    pub fn apply_batch(&self, batch: &[TextDocumentEdit]) -> Result<AppliedBatch> {
        self.write()?.apply_batch(batch)
    }

    /// Write the current text back to the backing file, if any
    pub async fn save(&self) -> std::io::Result<bool> {
        let Some(path) = &self.path else {
            return Ok(false);
        };
        let text = self
            .text()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        tokio::fs::write(path, text).await?;
        Ok(true)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, TextBuffer>> {
        self.buffer
            .read()
            .map_err(|_| EditError::Unavailable(self.uri.clone()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, TextBuffer>> {
        self.buffer
            .write()
            .map_err(|_| EditError::Unavailable(self.uri.clone()))
    }
}

/// Percent-encoded `file://` URI for an absolute path
pub fn file_uri(path: &Path) -> std::io::Result<String> {
    Url::from_file_path(path)
        .map(String::from)
        .map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Not an absolute path: {}", path.display()),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsp_types::{Position, Range, TextEdit};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_apply_save() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let file_path = temp_dir.path().join("a.py");
        tokio::fs::write(&file_path, "x = 1\n").await?;

        let document = Document::open(&file_path, "python").await?;
        let canonical = file_path.canonicalize()?;
        assert_eq!(document.uri(), file_uri(&canonical)?);
        assert_eq!(document.language_id(), "python");
        assert_eq!(document.version()?, INITIAL_VERSION);

        let applied = document.apply_batch(&[TextDocumentEdit::new(
            document.uri(),
            Some(INITIAL_VERSION),
            vec![TextEdit::new(
                Range::new(Position::new(0, 4), Position::new(0, 5)),
                "2".to_string(),
            )],
        )])?;
        assert_eq!(applied.version, INITIAL_VERSION + 1);

        assert!(document.save().await?);
        assert_eq!(tokio::fs::read_to_string(&file_path).await?, "x = 2\n");
        Ok(())
    }

    #[test]
    fn test_file_uri_is_percent_encoded() {
        assert_eq!(
            file_uri(Path::new("/tmp/my dir/a#1.py")).unwrap(),
            "file:///tmp/my%20dir/a%231.py"
        );
        assert!(file_uri(Path::new("relative/a.py")).is_err());
    }

    #[tokio::test]
    async fn test_in_memory_document_does_not_save() -> anyhow::Result<()> {
        let document = Document::new("untitled:1", "python", "");
        assert!(document.path().is_none());
        assert!(!document.save().await?);
        assert_eq!(document.snapshot()?, (String::new(), INITIAL_VERSION));
        Ok(())
    }
}
