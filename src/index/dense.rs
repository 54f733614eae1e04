/// HNSW vector index for similarity search
use super::{DenseHit, DenseIndex, IndexError};
use crate::config::IndexingConfig;
use crate::model::ChunkId;
use async_trait::async_trait;
use hnsw_rs::prelude::*;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

const MAX_LAYERS: usize = 16;

/// In-memory HNSW index over cosine distance.
///
/// The graph itself cannot delete or replace points, so the set of inserted ids
/// is tracked alongside it and repeated inserts are dropped. Chunks never change
/// after creation, so an id always maps to the same vector.
pub struct HnswIndex {
    index: Arc<Hnsw<'static, f32, DistCosine>>,
    ids: Arc<Mutex<HashSet<ChunkId>>>,
    dimension: usize,
    ef_search: usize,
}

impl HnswIndex {
    pub fn new(config: &IndexingConfig) -> Self {
        let index = Hnsw::<f32, DistCosine>::new(
            config.hnsw_m,
            config.hnsw_max_elements,
            MAX_LAYERS,
            config.hnsw_ef_construction,
            DistCosine {},
        );

        Self {
            index: Arc::new(index),
            ids: Arc::new(Mutex::new(HashSet::new())),
            dimension: config.vector_dim,
            ef_search: config.hnsw_ef_search,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn contains(&self, id: ChunkId) -> bool {
        self.ids.lock().map(|ids| ids.contains(&id)).unwrap_or(false)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DenseIndex for HnswIndex {
    async fn add(&self, id: ChunkId, vector: &[f32]) -> Result<(), IndexError> {
        self.check_dimension(vector)?;
        if id < 0 {
            return Err(IndexError::InsertError(format!("Negative chunk id {}", id)));
        }

        let is_new = self
            .ids
            .lock()
            .map_err(|_| IndexError::InsertError("id set lock poisoned".to_string()))?
            .insert(id);
        if !is_new {
            tracing::debug!("Chunk {} already in dense index, skipping", id);
            return Ok(());
        }

        let index = Arc::clone(&self.index);
        let data = vector.to_vec();
        let inserted = tokio::task::spawn_blocking(move || {
            index.insert((data.as_slice(), id as usize));
        })
        .await;

        if let Err(e) = inserted {
            // Let a later reindex retry this id
            if let Ok(mut ids) = self.ids.lock() {
                ids.remove(&id);
            }
            return Err(IndexError::TaskError(e));
        }

        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<DenseHit>, IndexError> {
        self.check_dimension(vector)?;
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let index = Arc::clone(&self.index);
        let query = vector.to_vec();
        let ef_search = self.ef_search.max(k);

        let neighbours =
            tokio::task::spawn_blocking(move || index.search(query.as_slice(), k, ef_search))
                .await?;

        let mut hits: Vec<DenseHit> = neighbours
            .into_iter()
            .map(|n| DenseHit {
                id: n.d_id as ChunkId,
                distance: n.distance,
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        Ok(hits)
    }

    fn len(&self) -> usize {
        self.ids.lock().map(|ids| ids.len()).unwrap_or(0)
    }
}
