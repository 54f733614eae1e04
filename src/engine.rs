//! Startup wiring: every component is built once from a `Config`

use crate::chunking::Chunker;
use crate::config::{Config, FailurePolicy};
use crate::embedding::{build_provider, EmbeddingProvider};
use crate::error::{CourseMateError, Result};
use crate::index::{Backend, DenseIndex, HnswIndex, LexicalIndex, TantivyIndex};
use crate::ingest::{IngestReport, IngestionPipeline, ReindexReport};
use crate::model::{Chunk, ChunkId, Document, DocumentId, DocumentSource};
use crate::retrieval::{QueryPipeline, SearchMode, SearchResponse};
use crate::storage::{StorageManager, StorageStats};
use serde::Serialize;
use std::sync::Arc;

/// Counts and settings reported by `status`
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub documents: usize,
    pub chunks: usize,
    pub dense_entries: usize,
    pub lexical_entries: usize,
    pub pending_writes: usize,
    pub failed_writes: usize,
    pub store_size: String,
    pub embedding_model: String,
    pub vector_dim: usize,
    pub failure_policy: FailurePolicy,
}

/// Liveness report
#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub documents: usize,
    pub chunks: usize,
}

/// Hybrid retrieval engine over one data directory
pub struct Engine {
    storage: StorageManager,
    provider: Arc<dyn EmbeddingProvider>,
    dense: Arc<dyn DenseIndex>,
    lexical: Arc<dyn LexicalIndex>,
    ingest: IngestionPipeline,
    query: QueryPipeline,
    default_k: usize,
}

impl Engine {
    /// Open the store under `storage.data_dir` with the configured provider
    pub async fn open(config: &Config) -> Result<Self> {
        let provider = build_provider(config)?;
        Self::open_with_provider(config, provider).await
    }

    /// Open the store with an already-built embedding provider.
    ///
    /// The dense index lives in memory, so it is rebuilt here from the stored
    /// embeddings. Opening never writes to the lexical index: several engines
    /// can share one store, and only the one that ingests or reindexes takes
    /// the lexical writer. Lexical writes left failed by an earlier run wait
    /// for an explicit `reindex`.
    pub async fn open_with_provider(
        config: &Config,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        if provider.dimension() != config.indexing.vector_dim {
            return Err(CourseMateError::DimensionMismatch {
                expected: config.indexing.vector_dim,
                actual: provider.dimension(),
            });
        }

        let data_dir = config.resolved_data_dir()?;
        tracing::info!("Opening store at {}", data_dir.display());
        let storage = StorageManager::new(data_dir)?;

        let dense: Arc<dyn DenseIndex> = Arc::new(HnswIndex::new(&config.indexing));
        let lexical: Arc<dyn LexicalIndex> = Arc::new(
            TantivyIndex::open(&storage.keyword_dir(), config.indexing.writer_memory_bytes)
                .map_err(|e| CourseMateError::IndexOpen {
                    backend: Backend::Lexical,
                    message: e.to_string(),
                })?,
        );

        let ingest = IngestionPipeline::new(
            Chunker::new(&config.chunking),
            provider.clone(),
            dense.clone(),
            lexical.clone(),
            storage.database.clone(),
        );
        let query = QueryPipeline::new(
            provider.clone(),
            dense.clone(),
            lexical.clone(),
            storage.database.clone(),
            &config.retrieval,
        )?;

        let engine = Self {
            storage,
            provider,
            dense,
            lexical,
            ingest,
            query,
            default_k: config.retrieval.default_k,
        };
        engine.warm_up().await?;

        Ok(engine)
    }

    async fn warm_up(&self) -> Result<()> {
        let report = self.ingest.rebuild_dense().await?;
        if report.attempted > 0 {
            tracing::info!(
                "Dense index warm-up: {} of {} entries restored",
                report.indexed,
                report.attempted
            );
        }

        let stats = self.storage.database.stats()?;
        let owed = stats.pending_writes + stats.failed_writes;
        if owed > 0 {
            tracing::warn!(
                "{} index writes are still owed; run `coursemate reindex` to retry",
                owed
            );
        }
        Ok(())
    }

    pub async fn ingest(&self, source: &DocumentSource) -> Result<IngestReport> {
        self.ingest.ingest(source).await
    }

    pub async fn reindex(&self, document_id: Option<DocumentId>) -> Result<ReindexReport> {
        self.ingest.reindex(document_id).await
    }

    /// Search with `k` results, or `retrieval.default_k` when not given
    pub async fn search(
        &self,
        query: &str,
        k: Option<usize>,
        mode: SearchMode,
    ) -> Result<SearchResponse> {
        self.query
            .search(query, k.unwrap_or(self.default_k), mode)
            .await
    }

    pub fn document(&self, id: DocumentId) -> Result<Option<Document>> {
        self.storage.database.get_document(id)
    }

    pub fn document_chunks(&self, id: DocumentId) -> Result<Vec<Chunk>> {
        self.storage.database.chunks_for_document(id)
    }

    pub fn chunks(&self, ids: &[ChunkId]) -> Result<Vec<Chunk>> {
        self.storage.database.get_chunks(ids)
    }

    pub fn status(&self) -> Result<EngineStatus> {
        let stats = self.storage.stats()?;

        Ok(EngineStatus {
            documents: stats.db.document_count,
            chunks: stats.db.chunk_count,
            dense_entries: self.dense.len(),
            lexical_entries: self.lexical.len(),
            pending_writes: stats.db.pending_writes,
            failed_writes: stats.db.failed_writes,
            store_size: StorageStats::format_size(stats.store_size),
            embedding_model: self.provider.model_name().to_string(),
            vector_dim: self.provider.dimension(),
            failure_policy: self.query.failure_policy(),
        })
    }

    pub fn health(&self) -> Result<Health> {
        let stats = self.storage.database.stats()?;

        Ok(Health {
            status: "ok",
            documents: stats.document_count,
            chunks: stats.chunk_count,
        })
    }
}
