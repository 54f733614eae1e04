//! Document chunking
//!
//! Two policies, picked by the source type:
//! - paragraph chunking for raw text (no positional metadata)
//! - layout-aware chunking for paged documents (page + line span per chunk)
//!
//! Both are pure functions; PDF page extraction is the only step that touches
//! a third-party parser.

mod layout;
mod paragraph;
mod pdf;

pub use layout::chunk_pages;
pub use paragraph::chunk_paragraphs;
pub use pdf::extract_pages;

use crate::config::ChunkingConfig;
use crate::error::Result;
use crate::model::{ChunkDraft, DocumentSource};

/// Chunker configured once at startup
#[derive(Debug, Clone)]
pub struct Chunker {
    max_lines_per_chunk: usize,
}

impl Chunker {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            max_lines_per_chunk: config.max_lines_per_chunk,
        }
    }

    /// Chunk a document source using the policy its type calls for
    pub fn chunk(&self, source: &DocumentSource) -> Result<Vec<ChunkDraft>> {
        match source {
            DocumentSource::Text { text, .. } => chunk_paragraphs(text),
            DocumentSource::Pages { pages, .. } => chunk_pages(pages, self.max_lines_per_chunk),
            DocumentSource::Pdf { bytes, .. } => {
                let pages = extract_pages(bytes)?;
                chunk_pages(&pages, self.max_lines_per_chunk)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CourseMateError;

    #[test]
    fn test_policy_follows_source_type() {
        let chunker = Chunker::new(&ChunkingConfig {
            max_lines_per_chunk: 2,
        });

        let text = DocumentSource::Text {
            title: "notes".to_string(),
            source: None,
            text: "one\ntwo\nthree".to_string(),
        };
        let chunks = chunker.chunk(&text).unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].span.is_none());

        let pages = DocumentSource::Pages {
            title: "slides".to_string(),
            source: Some("slides.pdf".to_string()),
            pages: vec!["one\ntwo\nthree".to_string()],
        };
        let chunks = chunker.chunk(&pages).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].span.unwrap().line_start, 3);
    }

    #[test]
    fn test_empty_pages_fail_terminally() {
        let chunker = Chunker::new(&ChunkingConfig {
            max_lines_per_chunk: 2,
        });
        let scanned = DocumentSource::Pages {
            title: "scan".to_string(),
            source: None,
            pages: vec![String::new(), String::new()],
        };
        assert!(matches!(
            chunker.chunk(&scanned),
            Err(CourseMateError::NoExtractableText { pages: 2 })
        ));
    }
}
