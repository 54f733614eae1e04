//! Deterministic placeholder vectors for non-production runs

use super::{EmbeddingError, EmbeddingProvider};
use async_trait::async_trait;

/// Derives a unit-length vector from the BLAKE3 hash of each text.
///
/// Identical texts always map to identical vectors, which keeps ingestion and
/// search runnable without a model or credential. The vectors carry no
/// semantic meaning.
pub struct PlaceholderProvider {
    dimension: usize,
}

impl PlaceholderProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut reader = blake3::Hasher::new()
            .update(text.as_bytes())
            .finalize_xof();

        let mut bytes = vec![0u8; self.dimension * 4];
        reader.fill(&mut bytes);

        let mut vector: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| {
                let raw = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                (raw as f64 / u32::MAX as f64 * 2.0 - 1.0) as f32
            })
            .collect();

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for PlaceholderProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "placeholder"
    }
}
