/// Tantivy keyword index for full-text search
use super::{IndexError, LexicalHit, LexicalIndex, LexicalMetadata};
use crate::model::{ChunkId, DocumentId};
use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::*;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};

/// Optional restriction of a lexical query to one document and/or page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LexicalScope {
    pub document_id: Option<DocumentId>,
    pub page: Option<u32>,
}

struct Fields {
    id: Field,
    text: Field,
    document_id: Field,
    page: Field,
}

struct Inner {
    index: Index,
    reader: IndexReader,
    /// Created on the first write; holding it takes Tantivy's directory lock
    writer: Mutex<Option<IndexWriter>>,
    writer_memory_bytes: usize,
    fields: Fields,
}

/// Tantivy keyword index wrapper
///
/// BM25 ranking over chunk text, with `document_id` and `page` stored as
/// indexed fields so queries can be scoped. Opening is read-only: the writer
/// (and with it the lock on the index directory) is only taken by the first
/// `add` or `commit`, so any number of processes can search one store while a
/// single one writes.
pub struct TantivyIndex {
    inner: Arc<Inner>,
}

impl TantivyIndex {
    /// Open the index in `index_path`, creating it when missing
    pub fn open(index_path: &Path, writer_memory_bytes: usize) -> Result<Self, IndexError> {
        let index = if index_path.join("meta.json").exists() {
            Index::open_in_dir(index_path)
                .map_err(|e| IndexError::InitializationError(e.to_string()))?
        } else {
            std::fs::create_dir_all(index_path)?;
            Index::create_in_dir(index_path, Self::schema())
                .map_err(|e| IndexError::InitializationError(e.to_string()))?
        };

        Self::from_index(index, writer_memory_bytes)
    }

    /// In-RAM index, used by tests and throwaway runs
    pub fn in_memory(writer_memory_bytes: usize) -> Result<Self, IndexError> {
        let index = Index::create_in_ram(Self::schema());
        Self::from_index(index, writer_memory_bytes)
    }

    fn schema() -> Schema {
        let mut schema_builder = Schema::builder();
        schema_builder.add_u64_field("id", INDEXED | STORED | FAST);
        schema_builder.add_text_field("text", TEXT | STORED);
        schema_builder.add_u64_field("document_id", INDEXED | STORED | FAST);
        schema_builder.add_u64_field("page", INDEXED | STORED);
        schema_builder.build()
    }

    fn from_index(index: Index, writer_memory_bytes: usize) -> Result<Self, IndexError> {
        let schema = index.schema();
        let field = |name: &str| {
            schema.get_field(name).map_err(|_| {
                IndexError::InitializationError(format!("Missing '{}' field in schema", name))
            })
        };
        let fields = Fields {
            id: field("id")?,
            text: field("text")?,
            document_id: field("document_id")?,
            page: field("page")?,
        };

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e: tantivy::TantivyError| IndexError::InitializationError(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(Inner {
                index,
                reader,
                writer: Mutex::new(None),
                writer_memory_bytes,
                fields,
            }),
        })
    }

    /// Query restricted to a document and/or page
    pub async fn query_scoped(
        &self,
        text: &str,
        k: usize,
        scope: LexicalScope,
    ) -> Result<Vec<LexicalHit>, IndexError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let inner = Arc::clone(&self.inner);
        let text = text.to_string();
        tokio::task::spawn_blocking(move || inner.search(&text, k, scope)).await?
    }
}

impl Inner {
    fn upsert(&self, id: ChunkId, text: &str, metadata: LexicalMetadata) -> Result<(), IndexError> {
        let mut document = doc!(
            self.fields.id => id as u64,
            self.fields.text => text,
            self.fields.document_id => metadata.document_id as u64,
        );
        if let Some(page) = metadata.page {
            document.add_u64(self.fields.page, page as u64);
        }

        let mut guard = self
            .writer
            .lock()
            .map_err(|_| IndexError::InsertError("writer lock poisoned".to_string()))?;
        let writer = self.acquire_writer(&mut guard)?;
        writer.delete_term(Term::from_field_u64(self.fields.id, id as u64));
        writer
            .add_document(document)
            .map_err(|e| IndexError::InsertError(e.to_string()))?;

        Ok(())
    }

    fn commit(&self) -> Result<(), IndexError> {
        let mut guard = self
            .writer
            .lock()
            .map_err(|_| IndexError::InsertError("writer lock poisoned".to_string()))?;
        self.acquire_writer(&mut guard)?
            .commit()
            .map_err(|e| IndexError::InsertError(e.to_string()))?;
        drop(guard);

        self.reader
            .reload()
            .map_err(|e| IndexError::SearchError(e.to_string()))?;

        Ok(())
    }

    /// The writer, created on first use. Fails while another process holds it.
    fn acquire_writer<'a>(
        &self,
        slot: &'a mut Option<IndexWriter>,
    ) -> Result<&'a mut IndexWriter, IndexError> {
        if slot.is_none() {
            let writer = self
                .index
                .writer(self.writer_memory_bytes)
                .map_err(|e| {
                    IndexError::InsertError(format!("could not acquire index writer: {}", e))
                })?;
            tracing::debug!("Acquired lexical index writer");
            *slot = Some(writer);
        }
        slot.as_mut()
            .ok_or_else(|| IndexError::InsertError("writer unavailable".to_string()))
    }

    fn search(
        &self,
        text: &str,
        limit: usize,
        scope: LexicalScope,
    ) -> Result<Vec<LexicalHit>, IndexError> {
        let searcher = self.reader.searcher();

        // Lenient parsing: stray quotes or operators in user text must not fail the query
        let query_parser = QueryParser::for_index(&self.index, vec![self.fields.text]);
        let (text_query, parse_errors) = query_parser.parse_query_lenient(text);
        if !parse_errors.is_empty() {
            tracing::debug!("Lenient query parse of {:?}: {:?}", text, parse_errors);
        }

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![(Occur::Must, text_query)];
        if let Some(document_id) = scope.document_id {
            clauses.push((Occur::Must, self.term_query(self.fields.document_id, document_id as u64)));
        }
        if let Some(page) = scope.page {
            clauses.push((Occur::Must, self.term_query(self.fields.page, page as u64)));
        }
        let query = BooleanQuery::new(clauses);

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .map_err(|e| IndexError::SearchError(e.to_string()))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let retrieved_doc: TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| IndexError::SearchError(e.to_string()))?;

            let id = retrieved_doc
                .get_first(self.fields.id)
                .and_then(|v| v.as_u64())
                .ok_or_else(|| IndexError::SearchError("Missing or invalid ID field".to_string()))?;

            results.push(LexicalHit {
                id: id as ChunkId,
                score,
            });
        }

        Ok(results)
    }

    fn term_query(&self, field: Field, value: u64) -> Box<dyn Query> {
        Box::new(TermQuery::new(
            Term::from_field_u64(field, value),
            IndexRecordOption::Basic,
        ))
    }
}

#[async_trait]
impl LexicalIndex for TantivyIndex {
    async fn add(
        &self,
        id: ChunkId,
        text: &str,
        metadata: LexicalMetadata,
    ) -> Result<(), IndexError> {
        if id < 0 {
            return Err(IndexError::InsertError(format!("Negative chunk id {}", id)));
        }
        let inner = Arc::clone(&self.inner);
        let text = text.to_string();
        tokio::task::spawn_blocking(move || inner.upsert(id, &text, metadata)).await?
    }

    async fn commit(&self) -> Result<(), IndexError> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.commit()).await?
    }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<LexicalHit>, IndexError> {
        self.query_scoped(text, k, LexicalScope::default()).await
    }

    fn len(&self) -> usize {
        self.inner.reader.searcher().num_docs() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn meta(document_id: DocumentId, page: Option<u32>) -> LexicalMetadata {
        LexicalMetadata { document_id, page }
    }

    #[tokio::test]
    async fn test_insert_and_search() {
        let index = TantivyIndex::in_memory(50_000_000).unwrap();

        index
            .add(1, "The quick brown fox jumps over the lazy dog", meta(1, None))
            .await
            .unwrap();
        index
            .add(2, "A fast red fox leaps above a sleepy canine", meta(1, None))
            .await
            .unwrap();
        index
            .add(3, "Python programming language tutorial", meta(2, None))
            .await
            .unwrap();
        index.commit().await.unwrap();

        assert_eq!(index.len(), 3);

        let results = index.query("fox", 10).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].score >= results[1].score);

        let results = index.query("python", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, 3);
    }

    #[tokio::test]
    async fn test_upsert_does_not_duplicate() {
        let index = TantivyIndex::in_memory(50_000_000).unwrap();

        index.add(5, "linear algebra notes", meta(1, Some(2))).await.unwrap();
        index.commit().await.unwrap();
        index.add(5, "linear algebra notes", meta(1, Some(2))).await.unwrap();
        index.add(5, "linear algebra notes", meta(1, Some(2))).await.unwrap();
        index.commit().await.unwrap();

        assert_eq!(index.len(), 1);
        let results = index.query("algebra", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, 5);
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible() {
        let index = TantivyIndex::in_memory(50_000_000).unwrap();
        index.add(1, "eigenvalues", meta(1, None)).await.unwrap();
        assert!(index.query("eigenvalues", 5).await.unwrap().is_empty());

        index.commit().await.unwrap();
        assert_eq!(index.query("eigenvalues", 5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_scoped_query() {
        let index = TantivyIndex::in_memory(50_000_000).unwrap();
        index.add(1, "gradient descent", meta(10, Some(1))).await.unwrap();
        index.add(2, "gradient descent with momentum", meta(10, Some(2))).await.unwrap();
        index.add(3, "stochastic gradient descent", meta(11, Some(1))).await.unwrap();
        index.commit().await.unwrap();

        let all = index.query("gradient", 10).await.unwrap();
        assert_eq!(all.len(), 3);

        let scope = LexicalScope {
            document_id: Some(10),
            page: None,
        };
        let mut ids: Vec<ChunkId> = index
            .query_scoped("gradient", 10, scope)
            .await
            .unwrap()
            .iter()
            .map(|h| h.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);

        let scope = LexicalScope {
            document_id: Some(10),
            page: Some(2),
        };
        let hits = index.query_scoped("gradient", 10, scope).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 2);
    }

    #[tokio::test]
    async fn test_malformed_query_is_lenient() {
        let index = TantivyIndex::in_memory(50_000_000).unwrap();
        index.add(1, "fourier transform", meta(1, None)).await.unwrap();
        index.commit().await.unwrap();

        let results = index.query("fourier \"transform", 5).await.unwrap();
        assert!(results.iter().any(|h| h.id == 1));
        assert!(index.query("anything", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reopen_from_disk() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("keywords");

        {
            let index = TantivyIndex::open(&path, 50_000_000).unwrap();
            index.add(1, "Test document", meta(1, None)).await.unwrap();
            index.commit().await.unwrap();
        }

        let index = TantivyIndex::open(&path, 50_000_000).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.query("test", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_readers_share_directory_with_one_writer() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("keywords");

        let writer = TantivyIndex::open(&path, 50_000_000).unwrap();
        let reader = TantivyIndex::open(&path, 50_000_000).unwrap();

        writer.add(1, "matrix rank", meta(1, None)).await.unwrap();
        writer.commit().await.unwrap();

        // Searching never needs the writer
        assert!(reader.query("rank", 5).await.is_ok());

        // Only one handle can write at a time
        let err = reader.add(2, "matrix trace", meta(1, None)).await.unwrap_err();
        assert!(matches!(err, IndexError::InsertError(_)));

        drop(writer);
        reader.add(2, "matrix trace", meta(1, None)).await.unwrap();
        reader.commit().await.unwrap();
        assert_eq!(reader.query("matrix", 5).await.unwrap().len(), 2);
    }
}
