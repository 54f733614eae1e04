//! Ingestion pipeline: chunk, embed, store, then write both indexes
//!
//! Durable storage is all-or-nothing: the document, its chunks and their
//! embeddings land in one SQLite transaction after the embedding call has
//! succeeded. The two index writes that follow are tracked per chunk and per
//! backend in `index_status`, so a failed write is reported and can be retried
//! by `reindex` without re-chunking or re-embedding.

use crate::chunking::Chunker;
use crate::embedding::EmbeddingProvider;
use crate::error::{CourseMateError, Result};
use crate::index::{Backend, DenseIndex, LexicalIndex, LexicalMetadata};
use crate::model::{Chunk, ChunkId, DocumentId, DocumentSource};
use crate::storage::{Database, IndexState};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One index write that did not make it; the chunk stays stored and pending
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexWriteFailure {
    pub chunk_id: ChunkId,
    pub backend: Backend,
    pub message: String,
}

impl From<IndexWriteFailure> for CourseMateError {
    fn from(failure: IndexWriteFailure) -> Self {
        CourseMateError::IndexWrite {
            backend: failure.backend,
            chunk_id: failure.chunk_id,
            message: failure.message,
        }
    }
}

/// Outcome of a successful ingest
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub document_id: DocumentId,
    pub chunk_count: usize,
    /// Index writes that failed; empty unless the ingest is degraded
    pub warnings: Vec<IndexWriteFailure>,
}

impl IngestReport {
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Outcome of a reindex pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReindexReport {
    /// (chunk, backend) pairs retried
    pub attempted: usize,
    /// Pairs now indexed
    pub indexed: usize,
    pub warnings: Vec<IndexWriteFailure>,
}

/// Chunks loaded per page by `reindex` and `rebuild_dense`
const REINDEX_PAGE_SIZE: usize = 512;

pub struct IngestionPipeline {
    chunker: Chunker,
    provider: Arc<dyn EmbeddingProvider>,
    dense: Arc<dyn DenseIndex>,
    lexical: Arc<dyn LexicalIndex>,
    database: Arc<Database>,
}

impl IngestionPipeline {
    pub fn new(
        chunker: Chunker,
        provider: Arc<dyn EmbeddingProvider>,
        dense: Arc<dyn DenseIndex>,
        lexical: Arc<dyn LexicalIndex>,
        database: Arc<Database>,
    ) -> Self {
        Self {
            chunker,
            provider,
            dense,
            lexical,
            database,
        }
    }

    /// Ingest one document.
    ///
    /// Fails without writing anything when chunking or embedding fails. Once
    /// the chunks are stored, index failures only degrade the report.
    pub async fn ingest(&self, source: &DocumentSource) -> Result<IngestReport> {
        let drafts = self.chunker.chunk(source)?;
        tracing::debug!("Chunked '{}' into {} chunks", source.title(), drafts.len());

        let texts: Vec<String> = drafts.iter().map(|d| d.text.clone()).collect();
        let embeddings = self
            .provider
            .embed(&texts)
            .await
            .map_err(|e| e.into_engine_error(self.provider.model_name()))?;
        self.check_embeddings(texts.len(), &embeddings)?;

        let (document, chunks) = self.database.insert_document(
            source.title(),
            source.source_name(),
            &drafts,
            &embeddings,
            self.provider.model_name(),
        )?;

        let work: Vec<(&Chunk, Backend)> = Backend::ALL
            .iter()
            .flat_map(|backend| chunks.iter().map(move |chunk| (chunk, *backend)))
            .collect();
        let warnings = self.write_indexes(&work).await?;

        if warnings.is_empty() {
            tracing::info!(
                "Ingested document {} '{}' ({} chunks)",
                document.id,
                document.title,
                chunks.len()
            );
        } else {
            tracing::warn!(
                "Ingested document {} '{}' degraded: {} of {} index writes failed",
                document.id,
                document.title,
                warnings.len(),
                work.len()
            );
        }

        Ok(IngestReport {
            document_id: document.id,
            chunk_count: chunks.len(),
            warnings,
        })
    }

    /// Retry every (chunk, backend) pair that is not indexed yet, for one
    /// document or for the whole store. Safe to repeat: index adds are upserts.
    pub async fn reindex(&self, document_id: Option<DocumentId>) -> Result<ReindexReport> {
        if let Some(id) = document_id {
            if self.database.get_document(id)?.is_none() {
                return Err(CourseMateError::DocumentNotFound { id });
            }
        }

        let pending = self.database.pending_writes(document_id)?;
        if pending.is_empty() {
            tracing::debug!("Nothing to reindex");
            return Ok(ReindexReport::default());
        }

        // Backends still owed per chunk, ascending by chunk id
        let mut owed: BTreeMap<ChunkId, Vec<Backend>> = BTreeMap::new();
        for write in &pending {
            let backends = owed.entry(write.chunk_id).or_default();
            if !backends.contains(&write.backend) {
                backends.push(write.backend);
            }
        }
        let ids: Vec<ChunkId> = owed.keys().copied().collect();
        tracing::info!(
            "Reindexing {} pending index writes across {} chunks",
            pending.len(),
            ids.len()
        );

        let mut report = ReindexReport::default();
        for page in ids.chunks(REINDEX_PAGE_SIZE) {
            let chunks = self.database.get_chunks(page)?;
            if chunks.len() < page.len() {
                tracing::warn!(
                    "{} pending chunk(s) have no stored row",
                    page.len() - chunks.len()
                );
            }

            // Dense writes first, then lexical, so one lexical commit covers the page
            let mut work: Vec<(&Chunk, Backend)> = Vec::with_capacity(chunks.len() * 2);
            for backend in Backend::ALL {
                for chunk in &chunks {
                    if owed.get(&chunk.id).is_some_and(|b| b.contains(&backend)) {
                        work.push((chunk, backend));
                    }
                }
            }

            let warnings = self.write_indexes(&work).await?;
            report.attempted += work.len();
            report.indexed += work.len() - warnings.len();
            report.warnings.extend(warnings);
        }

        Ok(report)
    }

    /// Load every stored embedding into the dense index, one page at a time.
    ///
    /// Used at startup, since the dense index does not outlive the process.
    /// Only the dense side is touched, so this never needs the lexical writer.
    pub async fn rebuild_dense(&self) -> Result<ReindexReport> {
        let mut report = ReindexReport::default();
        let mut after = 0;

        loop {
            let chunks = self.database.chunks_after(after, REINDEX_PAGE_SIZE)?;
            let Some(last) = chunks.last() else {
                break;
            };
            after = last.id;

            let mut restored = Vec::with_capacity(chunks.len());
            for chunk in &chunks {
                match self.dense.add(chunk.id, &chunk.embedding).await {
                    Ok(()) => restored.push(chunk.id),
                    Err(e) => report.warnings.push(self.record_failure(
                        chunk.id,
                        Backend::Dense,
                        e.to_string(),
                    )?),
                }
            }
            self.database.mark_indexed(Backend::Dense, &restored)?;

            report.attempted += chunks.len();
            report.indexed += restored.len();
        }

        tracing::debug!(
            "Dense index rebuilt: {} of {} chunks restored",
            report.indexed,
            report.attempted
        );
        Ok(report)
    }

    fn check_embeddings(&self, expected: usize, embeddings: &[Vec<f32>]) -> Result<()> {
        if embeddings.len() != expected {
            return Err(CourseMateError::EmbeddingCountMismatch {
                expected,
                actual: embeddings.len(),
            });
        }
        let dimension = self.provider.dimension();
        if let Some(bad) = embeddings.iter().find(|v| v.len() != dimension) {
            return Err(CourseMateError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }
        Ok(())
    }

    /// Write each (chunk, backend) pair and record its status. Lexical writes
    /// only count as indexed once the commit that follows them succeeds.
    async fn write_indexes(&self, work: &[(&Chunk, Backend)]) -> Result<Vec<IndexWriteFailure>> {
        let mut failures = Vec::new();
        let mut dense_written = Vec::new();
        let mut lexical_staged = Vec::new();

        for (chunk, backend) in work {
            let written = match backend {
                Backend::Dense => self.dense.add(chunk.id, &chunk.embedding).await,
                Backend::Lexical => {
                    let metadata = LexicalMetadata {
                        document_id: chunk.document_id,
                        page: chunk.page(),
                    };
                    self.lexical.add(chunk.id, &chunk.text, metadata).await
                }
            };

            match written {
                Ok(()) if *backend == Backend::Dense => dense_written.push(chunk.id),
                Ok(()) => lexical_staged.push(chunk.id),
                Err(e) => failures.push(self.record_failure(chunk.id, *backend, e.to_string())?),
            }
        }

        self.database.mark_indexed(Backend::Dense, &dense_written)?;

        if !lexical_staged.is_empty() {
            match self.lexical.commit().await {
                Ok(()) => {
                    self.database.mark_indexed(Backend::Lexical, &lexical_staged)?;
                }
                Err(e) => {
                    let message = format!("commit failed: {}", e);
                    for id in lexical_staged {
                        failures.push(self.record_failure(id, Backend::Lexical, message.clone())?);
                    }
                }
            }
        }

        Ok(failures)
    }

    fn record_failure(
        &self,
        chunk_id: ChunkId,
        backend: Backend,
        message: String,
    ) -> Result<IndexWriteFailure> {
        self.database
            .set_index_status(chunk_id, backend, IndexState::Failed, Some(&message))?;

        let failure = IndexWriteFailure {
            chunk_id,
            backend,
            message,
        };
        tracing::warn!("{}", CourseMateError::from(failure.clone()));
        Ok(failure)
    }
}
