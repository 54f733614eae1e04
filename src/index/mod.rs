//! Dense and lexical index backends
//!
//! The pipelines only talk to the `DenseIndex` and `LexicalIndex` traits.
//! Both contracts are upserts: adding an id that is already present never
//! creates a second retrievable entry.

mod dense;
mod lexical;
#[cfg(test)]
pub(crate) mod testing;

pub use dense::HnswIndex;
pub use lexical::{LexicalScope, TantivyIndex};

use crate::model::{ChunkId, DocumentId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The two retrieval backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Dense,
    Lexical,
}

impl Backend {
    pub const ALL: [Backend; 2] = [Backend::Dense, Backend::Lexical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Dense => "dense",
            Backend::Lexical => "lexical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "dense" => Some(Backend::Dense),
            "lexical" => Some(Backend::Lexical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Index initialization failed: {0}")]
    InitializationError(String),

    #[error("Insert failed: {0}")]
    InsertError(String),

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Tantivy error: {0}")]
    TantivyError(#[from] tantivy::TantivyError),

    #[error("Background task failed: {0}")]
    TaskError(#[from] tokio::task::JoinError),
}

/// Nearest-neighbour hit, ascending distance
#[derive(Debug, Clone, PartialEq)]
pub struct DenseHit {
    pub id: ChunkId,
    /// Cosine distance (0.0 = identical direction)
    pub distance: f32,
}

impl DenseHit {
    /// Similarity reported to users
    pub fn similarity(&self) -> f32 {
        1.0 - self.distance
    }
}

/// Relevance-ranked hit, descending score
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    pub id: ChunkId,
    /// BM25 relevance score
    pub score: f32,
}

/// Filterable fields stored next to each lexical document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LexicalMetadata {
    pub document_id: DocumentId,
    pub page: Option<u32>,
}

/// Store of (chunk id, vector) pairs queried by cosine distance
#[async_trait]
pub trait DenseIndex: Send + Sync {
    /// Insert a vector; re-adding an existing id is a no-op
    async fn add(&self, id: ChunkId, vector: &[f32]) -> Result<(), IndexError>;

    /// k nearest neighbours ordered by ascending distance
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<DenseHit>, IndexError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Store of (chunk id, text, metadata) documents queried by term relevance
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    /// Upsert a document; visible to queries after `commit`
    async fn add(
        &self,
        id: ChunkId,
        text: &str,
        metadata: LexicalMetadata,
    ) -> Result<(), IndexError>;

    /// Make pending writes durable and searchable
    async fn commit(&self) -> Result<(), IndexError>;

    /// k best documents ordered by descending relevance
    async fn query(&self, text: &str, k: usize) -> Result<Vec<LexicalHit>, IndexError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_names_roundtrip() {
        for backend in Backend::ALL {
            assert_eq!(Backend::parse(backend.as_str()), Some(backend));
        }
        assert_eq!(Backend::parse("bm25"), None);
    }

    #[test]
    fn test_similarity_from_distance() {
        let hit = DenseHit {
            id: 1,
            distance: 0.25,
        };
        assert!((hit.similarity() - 0.75).abs() < f32::EPSILON);
    }
}
