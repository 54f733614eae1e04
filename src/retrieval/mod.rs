//! Hybrid retrieval
//!
//! Dense and lexical rankings are merged with Reciprocal Rank Fusion and
//! hydrated from the chunk store.

mod fusion;
mod hybrid;

pub use fusion::{fuse, FusedResult, FusionConfig, FusionError};
pub use hybrid::{QueryPipeline, SearchHit, SearchMode, SearchResponse};
