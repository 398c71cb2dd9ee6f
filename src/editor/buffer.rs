use crop::Rope;
use lsp_types::{Position, TextEdit};

use super::edit::TextDocumentEdit;
use super::error::{EditError, Result};

/// Outcome of a committed batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedBatch {
    /// Document version after the batch
    pub version: i32,
    /// Number of text edits applied
    pub edit_count: usize,
}

/// Rope-backed text with an LSP document version
#[derive(Debug, Clone)]
pub struct TextBuffer {
    rope: Rope,
    version: i32,
}

impl TextBuffer {
    pub fn new(text: &str, version: i32) -> Self {
        Self {
            rope: Rope::from(text),
            version,
        }
    }

    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn byte_len(&self) -> usize {
        self.rope.byte_len()
    }

    /// Map an LSP position (UTF-16 columns) to a byte offset, clamping past-the-end
    /// lines to the end of the text and past-the-end columns to the end of the line
    pub fn position_to_byte(&self, position: Position) -> usize {
        position_to_byte(&self.rope, position)
    }

    /// Apply every entry of a batch in order, all or nothing.
    ///
    /// Ranges of each entry refer to the text left by the entries before it.
    /// Versions carried by the entries are checked against the version the
    /// document had when the batch started.
    pub fn apply_batch(&mut self, batch: &[TextDocumentEdit]) -> Result<AppliedBatch> {
        for entry in batch {
            if let Some(expected) = entry.text_document.version {
                if expected != self.version {
                    return Err(EditError::VersionMismatch {
                        uri: entry.uri().to_string(),
                        expected,
                        actual: self.version,
                    });
                }
            }
        }

        let mut rope = self.rope.clone();
        let mut edit_count = 0;
        for entry in batch {
            apply_edits(&mut rope, &entry.edits)?;
            edit_count += entry.edits.len();
        }

        self.rope = rope;
        self.version += 1;

        Ok(AppliedBatch {
            version: self.version,
            edit_count,
        })
    }
}

fn position_to_byte(rope: &Rope, position: Position) -> usize {
    let line = position.line as usize;
    if line >= rope.line_len() {
        return rope.byte_len();
    }

    let line_start_byte = rope.byte_of_line(line);
    let line_end_byte = line_start_byte + rope.line(line).byte_len();
    let line_start_utf16 = rope.utf16_code_unit_of_byte(line_start_byte);
    let line_end_utf16 = rope.utf16_code_unit_of_byte(line_end_byte);

    let target_utf16 = (line_start_utf16 + position.character as usize).min(line_end_utf16);
    rope.byte_of_utf16_code_unit(target_utf16)
}

/// Apply edits whose ranges all refer to the same text
fn apply_edits(rope: &mut Rope, edits: &[TextEdit]) -> Result<()> {
    let mut resolved = Vec::with_capacity(edits.len());
    for (index, edit) in edits.iter().enumerate() {
        let (start, end) = (edit.range.start, edit.range.end);
        if (start.line, start.character) > (end.line, end.character) {
            return Err(EditError::InvalidRange { start, end });
        }
        let start_byte = position_to_byte(rope, start);
        let end_byte = position_to_byte(rope, end);
        resolved.push((start_byte, end_byte, index));
    }

    resolved.sort_by_key(|&(start, _, index)| (start, index));
    for pair in resolved.windows(2) {
        let (_, prev_end, _) = pair[0];
        let (next_start, _, next_index) = pair[1];
        if next_start < prev_end {
            return Err(EditError::OverlappingEdits {
                at: edits[next_index].range.start,
            });
        }
    }

    // Back to front so earlier offsets stay valid; equal starts keep array order
    for &(start, end, index) in resolved.iter().rev() {
        let text = &edits[index].new_text;
        if start < end {
            rope.replace(start..end, text);
        } else if !text.is_empty() {
            rope.insert(start, text);
        }
    }

    Ok(())
}
