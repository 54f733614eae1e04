//! In-memory index doubles with switchable failures, for pipeline tests

use super::{DenseHit, DenseIndex, IndexError, LexicalHit, LexicalIndex, LexicalMetadata};
use crate::model::ChunkId;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::collections::BTreeMap;
use std::sync::Mutex;

fn injected(what: &str) -> IndexError {
    IndexError::InsertError(format!("injected {} failure", what))
}

/// Brute-force cosine index
#[derive(Default)]
pub struct MemoryDense {
    vectors: Mutex<BTreeMap<ChunkId, Vec<f32>>>,
    pub adds: AtomicUsize,
    pub fail_writes: AtomicBool,
    pub fail_queries: AtomicBool,
}

impl MemoryDense {
    pub fn ids(&self) -> Vec<ChunkId> {
        self.vectors.lock().unwrap().keys().copied().collect()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 1.0;
    }
    1.0 - dot / (na * nb)
}

#[async_trait]
impl DenseIndex for MemoryDense {
    async fn add(&self, id: ChunkId, vector: &[f32]) -> Result<(), IndexError> {
        self.adds.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(injected("dense write"));
        }
        self.vectors
            .lock()
            .unwrap()
            .entry(id)
            .or_insert_with(|| vector.to_vec());
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<DenseHit>, IndexError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(IndexError::SearchError("injected dense query failure".to_string()));
        }
        let mut hits: Vec<DenseHit> = self
            .vectors
            .lock()
            .unwrap()
            .iter()
            .map(|(id, v)| DenseHit {
                id: *id,
                distance: cosine_distance(vector, v),
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
        hits.truncate(k);
        Ok(hits)
    }

    fn len(&self) -> usize {
        self.vectors.lock().unwrap().len()
    }
}

/// Term-overlap index with staged writes made visible by `commit`
#[derive(Default)]
pub struct MemoryLexical {
    staged: Mutex<BTreeMap<ChunkId, (String, LexicalMetadata)>>,
    committed: Mutex<BTreeMap<ChunkId, (String, LexicalMetadata)>>,
    pub adds: AtomicUsize,
    pub fail_writes: AtomicBool,
    pub fail_commit: AtomicBool,
    pub fail_queries: AtomicBool,
}

impl MemoryLexical {
    pub fn ids(&self) -> Vec<ChunkId> {
        self.committed.lock().unwrap().keys().copied().collect()
    }

    pub fn metadata(&self, id: ChunkId) -> Option<LexicalMetadata> {
        self.committed.lock().unwrap().get(&id).map(|(_, meta)| *meta)
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_commit(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }
}

fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl LexicalIndex for MemoryLexical {
    async fn add(
        &self,
        id: ChunkId,
        text: &str,
        metadata: LexicalMetadata,
    ) -> Result<(), IndexError> {
        self.adds.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(injected("lexical write"));
        }
        self.staged
            .lock()
            .unwrap()
            .insert(id, (text.to_string(), metadata));
        Ok(())
    }

    async fn commit(&self) -> Result<(), IndexError> {
        if self.fail_commit.load(Ordering::SeqCst) {
            self.staged.lock().unwrap().clear();
            return Err(injected("lexical commit"));
        }
        let staged = std::mem::take(&mut *self.staged.lock().unwrap());
        self.committed.lock().unwrap().extend(staged);
        Ok(())
    }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<LexicalHit>, IndexError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(IndexError::SearchError(
                "injected lexical query failure".to_string(),
            ));
        }
        let query_terms = terms(text);
        let mut hits: Vec<LexicalHit> = self
            .committed
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(id, (body, _))| {
                let body_terms = terms(body);
                let score = query_terms.iter().filter(|t| body_terms.contains(t)).count();
                (score > 0).then_some(LexicalHit {
                    id: *id,
                    score: score as f32,
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
        hits.truncate(k);
        Ok(hits)
    }

    fn len(&self) -> usize {
        self.committed.lock().unwrap().len()
    }
}
