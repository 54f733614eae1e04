//! Paragraph chunking for raw text input

use crate::error::{CourseMateError, Result};
use crate::model::ChunkDraft;

/// Split raw text on blank-line boundaries (two or more consecutive newlines).
///
/// Each candidate is trimmed at both ends and dropped when nothing is left, so
/// runs of three or more newlines never yield empty chunks. A line holding only
/// spaces is not a boundary: `"A\n \nB"` stays one chunk. Fails with
/// `EmptyInput` when no chunk survives.
pub fn chunk_paragraphs(text: &str) -> Result<Vec<ChunkDraft>> {
    let normalized = text.replace("\r\n", "\n");

    let chunks: Vec<ChunkDraft> = normalized
        .split("\n\n")
        .map(str::trim)
        .filter(|candidate| !candidate.is_empty())
        .map(ChunkDraft::plain)
        .collect();

    if chunks.is_empty() {
        return Err(CourseMateError::EmptyInput);
    }

    Ok(chunks)
}
