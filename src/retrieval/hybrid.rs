//! Query pipeline: dense-only or hybrid (dense + lexical fused by RRF) search

use crate::config::{FailurePolicy, RetrievalConfig};
use crate::embedding::EmbeddingProvider;
use crate::error::{CourseMateError, Result};
use crate::index::{Backend, DenseHit, DenseIndex, IndexError, LexicalHit, LexicalIndex};
use crate::model::{Chunk, ChunkId, DocumentId};
use crate::retrieval::fusion::{fuse, FusedResult, FusionConfig};
use crate::storage::Database;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Which retrieval signals a search uses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Dense,
    #[default]
    Hybrid,
}

impl std::str::FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "dense" => Ok(Self::Dense),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!(
                "unknown search mode '{}', expected dense or hybrid",
                other
            )),
        }
    }
}

/// One hydrated search result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: ChunkId,
    pub doc_id: DocumentId,
    pub page: Option<u32>,
    pub line_start: Option<u32>,
    pub line_end: Option<u32>,
    pub text: String,
    /// Dense mode: cosine similarity. Hybrid mode: fused RRF score.
    pub score: f64,
    /// `1 - distance` when the chunk was among the dense candidates
    pub dense_similarity: Option<f32>,
    pub dense_rank: Option<usize>,
    pub lexical_rank: Option<usize>,
}

impl SearchHit {
    fn from_chunk(chunk: Chunk, score: f64) -> Self {
        Self {
            id: chunk.id,
            doc_id: chunk.document_id,
            page: chunk.span.map(|s| s.page),
            line_start: chunk.span.map(|s| s.line_start),
            line_end: chunk.span.map(|s| s.line_end),
            text: chunk.text,
            score,
            dense_similarity: None,
            dense_rank: None,
            lexical_rank: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    /// Backends that failed while the query still answered (fail-open)
    pub degraded: Vec<Backend>,
    /// Ranked ids whose stored rows could not be found
    pub missing_ids: Vec<ChunkId>,
}

impl SearchResponse {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}

/// Search over both indexes, hydrated from the chunk store
pub struct QueryPipeline {
    provider: Arc<dyn EmbeddingProvider>,
    dense: Arc<dyn DenseIndex>,
    lexical: Arc<dyn LexicalIndex>,
    database: Arc<Database>,
    fusion: FusionConfig,
    candidate_multiplier: usize,
    failure_policy: FailurePolicy,
}

impl QueryPipeline {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        dense: Arc<dyn DenseIndex>,
        lexical: Arc<dyn LexicalIndex>,
        database: Arc<Database>,
        config: &RetrievalConfig,
    ) -> Result<Self> {
        let fusion = FusionConfig::from_retrieval(config)
            .map_err(|e| CourseMateError::Config(e.to_string()))?;

        Ok(Self {
            provider,
            dense,
            lexical,
            database,
            fusion,
            candidate_multiplier: config.candidate_multiplier.max(1),
            failure_policy: config.failure_policy,
        })
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Run one query.
    ///
    /// Embedding failures are always returned. In hybrid mode an index
    /// failure is handled by the configured `FailurePolicy`; both indexes
    /// failing is always an error.
    pub async fn search(&self, query: &str, k: usize, mode: SearchMode) -> Result<SearchResponse> {
        let query = query.trim();
        if query.is_empty() {
            return Err(CourseMateError::InvalidQuery(
                "Query text cannot be empty".to_string(),
            ));
        }
        if k == 0 {
            return Ok(SearchResponse::default());
        }

        match mode {
            SearchMode::Dense => self.dense_search(query, k).await,
            SearchMode::Hybrid => self.hybrid_search(query, k).await,
        }
    }

    async fn dense_search(&self, query: &str, k: usize) -> Result<SearchResponse> {
        let hits = self.dense_ranking(query, k).await?.map_err(|e| {
            CourseMateError::IndexQuery {
                backends: vec![Backend::Dense],
                message: e.to_string(),
            }
        })?;

        let ids: Vec<ChunkId> = hits.iter().map(|h| h.id).collect();
        let (mut rows, missing_ids) = self.hydrate(&ids)?;

        let hits = hits
            .iter()
            .enumerate()
            .filter_map(|(idx, hit)| {
                let chunk = rows.remove(&hit.id)?;
                let similarity = hit.similarity();
                let mut result = SearchHit::from_chunk(chunk, similarity as f64);
                result.dense_similarity = Some(similarity);
                result.dense_rank = Some(idx + 1);
                Some(result)
            })
            .collect();

        Ok(SearchResponse {
            hits,
            degraded: Vec::new(),
            missing_ids,
        })
    }

    async fn hybrid_search(&self, query: &str, k: usize) -> Result<SearchResponse> {
        let candidates = k.saturating_mul(self.candidate_multiplier);

        let (dense, lexical) = tokio::join!(
            self.dense_ranking(query, candidates),
            self.lexical_ranking(query, candidates)
        );
        let dense = dense?;

        let mut failures: Vec<(Backend, String)> = Vec::new();
        let dense_hits = dense.unwrap_or_else(|e| {
            failures.push((Backend::Dense, e.to_string()));
            Vec::new()
        });
        let lexical_hits = lexical.unwrap_or_else(|e| {
            failures.push((Backend::Lexical, e.to_string()));
            Vec::new()
        });

        let degraded = self.apply_failure_policy(failures)?;

        let dense_ids: Vec<ChunkId> = dense_hits.iter().map(|h| h.id).collect();
        let lexical_ids: Vec<ChunkId> = lexical_hits.iter().map(|h| h.id).collect();
        let fused = fuse(&dense_ids, &lexical_ids, &self.fusion, k);
        tracing::debug!(
            "Fused {} dense + {} lexical candidates into {} results",
            dense_ids.len(),
            lexical_ids.len(),
            fused.len()
        );

        let similarities: HashMap<ChunkId, f32> = dense_hits
            .iter()
            .map(|h| (h.id, h.similarity()))
            .collect();

        let ids: Vec<ChunkId> = fused.iter().map(|f| f.chunk_id).collect();
        let (mut rows, missing_ids) = self.hydrate(&ids)?;

        let hits = fused
            .into_iter()
            .filter_map(|FusedResult { chunk_id, score, dense_rank, lexical_rank }| {
                let chunk = rows.remove(&chunk_id)?;
                let mut result = SearchHit::from_chunk(chunk, score);
                result.dense_similarity = similarities.get(&chunk_id).copied();
                result.dense_rank = dense_rank;
                result.lexical_rank = lexical_rank;
                Some(result)
            })
            .collect();

        Ok(SearchResponse {
            hits,
            degraded,
            missing_ids,
        })
    }

    /// Outer error: the embedding call failed. Inner error: the index failed.
    async fn dense_ranking(
        &self,
        query: &str,
        k: usize,
    ) -> Result<std::result::Result<Vec<DenseHit>, IndexError>> {
        let vector = self
            .provider
            .embed_one(query)
            .await
            .map_err(|e| e.into_engine_error(self.provider.model_name()))?;

        Ok(self.dense.query(&vector, k).await)
    }

    async fn lexical_ranking(
        &self,
        query: &str,
        k: usize,
    ) -> std::result::Result<Vec<LexicalHit>, IndexError> {
        self.lexical.query(query, k).await
    }

    /// Backends to report as degraded, or the error the policy calls for
    fn apply_failure_policy(&self, failures: Vec<(Backend, String)>) -> Result<Vec<Backend>> {
        if failures.is_empty() {
            return Ok(Vec::new());
        }

        let backends: Vec<Backend> = failures.iter().map(|(b, _)| *b).collect();
        let message = failures
            .iter()
            .map(|(b, e)| format!("{}: {}", b, e))
            .collect::<Vec<_>>()
            .join("; ");

        if failures.len() == Backend::ALL.len() || self.failure_policy == FailurePolicy::FailClosed {
            return Err(CourseMateError::IndexQuery { backends, message });
        }

        tracing::warn!("Hybrid search degraded, answering without it: {}", message);
        Ok(backends)
    }

    /// Fetch stored rows for ranked ids. Ids without a row are dropped from
    /// the result and reported back.
    fn hydrate(&self, ids: &[ChunkId]) -> Result<(HashMap<ChunkId, Chunk>, Vec<ChunkId>)> {
        let rows: HashMap<ChunkId, Chunk> = self
            .database
            .get_chunks(ids)?
            .into_iter()
            .map(|chunk| (chunk.id, chunk))
            .collect();

        let missing: Vec<ChunkId> = ids
            .iter()
            .copied()
            .filter(|id| !rows.contains_key(id))
            .collect();
        if !missing.is_empty() {
            tracing::warn!(
                "Dropping {} ranked chunk(s) with no stored row: {:?}",
                missing.len(),
                missing
            );
        }

        Ok((rows, missing))
    }
}
