//! CourseMate - Hybrid retrieval over course documents
//!
//! Documents (raw text or PDFs) are split into chunks, embedded, and written to
//! a dense vector index and a lexical index. Queries run against both and the
//! two rankings are merged with Reciprocal Rank Fusion.

pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod index;
pub mod ingest;
pub mod model;
pub mod retrieval;
pub mod storage;

pub use engine::Engine;
pub use error::{CourseMateError, Result};
