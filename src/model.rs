//! Shared data model: documents, chunks and their positional spans

use serde::{Deserialize, Serialize};

/// Database-assigned document identifier
pub type DocumentId = i64;

/// Database-assigned chunk identifier, unique across all documents
pub type ChunkId = i64;

/// Position of a chunk inside a paged document (all values 1-based, inclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSpan {
    pub page: u32,
    pub line_start: u32,
    pub line_end: u32,
}

/// A chunk produced by the chunker, before it has an id or embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDraft {
    pub text: String,
    pub span: Option<ChunkSpan>,
}

impl ChunkDraft {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            span: None,
        }
    }

    pub fn spanned(text: impl Into<String>, span: ChunkSpan) -> Self {
        Self {
            text: text.into(),
            span: Some(span),
        }
    }
}

/// What a client submits for ingestion
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// Raw text, chunked by paragraph
    Text {
        title: String,
        source: Option<String>,
        text: String,
    },
    /// Already-extracted page texts, chunked layout-aware
    Pages {
        title: String,
        source: Option<String>,
        pages: Vec<String>,
    },
    /// PDF bytes, extracted per page then chunked layout-aware
    Pdf {
        title: String,
        source: Option<String>,
        bytes: Vec<u8>,
    },
}

impl DocumentSource {
    pub fn title(&self) -> &str {
        match self {
            DocumentSource::Text { title, .. }
            | DocumentSource::Pages { title, .. }
            | DocumentSource::Pdf { title, .. } => title,
        }
    }

    pub fn source_name(&self) -> Option<&str> {
        match self {
            DocumentSource::Text { source, .. }
            | DocumentSource::Pages { source, .. }
            | DocumentSource::Pdf { source, .. } => source.as_deref(),
        }
    }
}

/// Stored document record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub title: String,
    pub source: Option<String>,
    pub created_at: i64,
}

/// Stored chunk record (text, position and embedding)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub document_id: DocumentId,
    /// Position of the chunk within its document, 0-based
    pub ordinal: u32,
    pub text: String,
    pub span: Option<ChunkSpan>,
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

impl Chunk {
    pub fn page(&self) -> Option<u32> {
        self.span.map(|s| s.page)
    }
}
