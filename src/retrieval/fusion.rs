//! Reciprocal Rank Fusion algorithm for combining ranked lists

use crate::config::RetrievalConfig;
use crate::model::ChunkId;
use ahash::{HashMap, HashMapExt};
use serde::Serialize;
use std::cmp::Ordering;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum FusionError {
    #[error("Invalid weight configuration: weights must be positive")]
    InvalidWeights,

    #[error("Invalid RRF constant {0}: must be finite and non-negative")]
    InvalidK(f64),
}

/// Configuration for fusion algorithm
#[derive(Debug, Clone, PartialEq)]
pub struct FusionConfig {
    /// RRF smoothing constant (typically 60)
    pub k: f64,

    /// Weight for dense results
    pub dense_weight: f64,

    /// Weight for lexical results
    pub lexical_weight: f64,
}

impl FusionConfig {
    pub fn new(k: f64, dense_weight: f64, lexical_weight: f64) -> Result<Self, FusionError> {
        if !k.is_finite() || k < 0.0 {
            return Err(FusionError::InvalidK(k));
        }
        if dense_weight <= 0.0 || lexical_weight <= 0.0 {
            return Err(FusionError::InvalidWeights);
        }

        Ok(Self {
            k,
            dense_weight,
            lexical_weight,
        })
    }

    pub fn from_retrieval(config: &RetrievalConfig) -> Result<Self, FusionError> {
        Self::new(config.rrf_k, config.dense_weight, config.lexical_weight)
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            k: 60.0,
            dense_weight: 1.0,
            lexical_weight: 1.0,
        }
    }
}

/// One fused entry with the 1-based rank it held in each input list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedResult {
    pub chunk_id: ChunkId,
    pub score: f64,
    pub dense_rank: Option<usize>,
    pub lexical_rank: Option<usize>,
}

impl FusedResult {
    /// Exact-score tie order: the dense list takes precedence. An id ranked
    /// by the dense list beats one that is not; two dense-ranked ids compare
    /// by dense rank; two lexical-only ids compare by lexical rank.
    fn tie_order(&self, other: &Self) -> Ordering {
        match (self.dense_rank, other.dense_rank) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.lexical_rank.cmp(&other.lexical_rank),
        }
    }
}

/// Apply Reciprocal Rank Fusion to two ranked id lists
///
/// RRF formula: score(id) = sum over both lists of weight / (k + rank), with
/// 1-based ranks. An id missing from a list gets nothing from it. A repeated
/// id within one list only counts at its first (best) rank.
///
/// Results are sorted by score descending, ties per `FusedResult::tie_order`,
/// and truncated to `limit`.
pub fn fuse(
    dense: &[ChunkId],
    lexical: &[ChunkId],
    config: &FusionConfig,
    limit: usize,
) -> Vec<FusedResult> {
    let mut fused: HashMap<ChunkId, FusedResult> = HashMap::with_capacity(dense.len() + lexical.len());

    for (idx, chunk_id) in dense.iter().enumerate() {
        let entry = fused.entry(*chunk_id).or_insert_with(|| empty(*chunk_id));
        if entry.dense_rank.is_none() {
            let rank = idx + 1;
            entry.dense_rank = Some(rank);
            entry.score += config.dense_weight / (config.k + rank as f64);
        }
    }

    for (idx, chunk_id) in lexical.iter().enumerate() {
        let entry = fused.entry(*chunk_id).or_insert_with(|| empty(*chunk_id));
        if entry.lexical_rank.is_none() {
            let rank = idx + 1;
            entry.lexical_rank = Some(rank);
            entry.score += config.lexical_weight / (config.k + rank as f64);
        }
    }

    let mut results: Vec<FusedResult> = fused.into_values().collect();
    results.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.tie_order(b)));
    results.truncate(limit);

    results
}

fn empty(chunk_id: ChunkId) -> FusedResult {
    FusedResult {
        chunk_id,
        score: 0.0,
        dense_rank: None,
        lexical_rank: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(results: &[FusedResult]) -> Vec<ChunkId> {
        results.iter().map(|r| r.chunk_id).collect()
    }

    fn round6(x: f64) -> f64 {
        (x * 1e6).round() / 1e6
    }

    #[test]
    fn test_rank_one_in_both_lists() {
        let fused = fuse(&[7], &[7], &FusionConfig::default(), 10);

        assert_eq!(fused.len(), 1);
        assert!((fused[0].score - 2.0 / 61.0).abs() < 1e-12);
        assert_eq!(round6(fused[0].score), 0.032787);
        assert_eq!(fused[0].dense_rank, Some(1));
        assert_eq!(fused[0].lexical_rank, Some(1));
    }

    #[test]
    fn test_three_way_ordering() {
        let fused = fuse(&[1, 2, 3], &[3, 1, 2], &FusionConfig::default(), 3);

        assert_eq!(ids(&fused), vec![1, 3, 2]);
        assert_eq!(round6(fused[0].score), round6(1.0 / 61.0 + 1.0 / 62.0));
        assert_eq!(round6(fused[1].score), round6(1.0 / 63.0 + 1.0 / 61.0));
        assert_eq!(round6(fused[2].score), round6(1.0 / 62.0 + 1.0 / 63.0));
        assert_eq!(round6(fused[0].score), 0.032522);
        assert_eq!(round6(fused[1].score), 0.032266);
        assert_eq!(round6(fused[2].score), 0.032002);
    }

    #[test]
    fn test_empty_lists() {
        assert!(fuse(&[], &[], &FusionConfig::default(), 5).is_empty());
    }

    #[test]
    fn test_single_list_hits_are_kept() {
        let fused = fuse(&[], &[4, 5], &FusionConfig::default(), 5);
        assert_eq!(ids(&fused), vec![4, 5]);
        assert!(fused.iter().all(|r| r.dense_rank.is_none()));
    }

    #[test]
    fn test_scores_are_symmetric() {
        let config = FusionConfig::default();
        let ab = fuse(&[1, 2, 3, 9], &[3, 1, 8], &config, 10);
        let ba = fuse(&[3, 1, 8], &[1, 2, 3, 9], &config, 10);

        for result in &ab {
            let mirrored = ba.iter().find(|r| r.chunk_id == result.chunk_id).unwrap();
            assert_eq!(result.score, mirrored.score);
        }
    }

    #[test]
    fn test_tie_goes_to_dense_precedence() {
        let config = FusionConfig::default();

        // 1 and 2 both score 1/61 + 1/62
        let fused = fuse(&[1, 2], &[2, 1], &config, 2);
        assert_eq!(fused[0].score, fused[1].score);
        assert_eq!(ids(&fused), vec![1, 2]);

        // Swapping which list is dense swaps the winner
        let fused = fuse(&[2, 1], &[1, 2], &config, 2);
        assert_eq!(ids(&fused), vec![2, 1]);

        // Dense-only beats lexical-only at the same rank
        let fused = fuse(&[10], &[20], &config, 2);
        assert_eq!(ids(&fused), vec![10, 20]);
        let fused = fuse(&[20], &[10], &config, 2);
        assert_eq!(ids(&fused), vec![20, 10]);
    }

    #[test]
    fn test_truncates_to_limit() {
        let fused = fuse(&[1, 2, 3], &[4, 5, 6], &FusionConfig::default(), 2);
        assert_eq!(ids(&fused), vec![1, 4]);
        assert!(fuse(&[1], &[1], &FusionConfig::default(), 0).is_empty());
    }

    #[test]
    fn test_duplicate_ids_count_once() {
        let fused = fuse(&[1, 1, 2], &[], &FusionConfig::default(), 5);
        assert_eq!(ids(&fused), vec![1, 2]);
        assert_eq!(fused[0].score, 1.0 / 61.0);
        assert_eq!(fused[1].dense_rank, Some(3));
    }

    #[test]
    fn test_weighted() {
        let config = FusionConfig::new(60.0, 0.7, 0.3).unwrap();
        let fused = fuse(&[1], &[2], &config, 2);

        assert_eq!(fused[0].chunk_id, 1);
        assert!((fused[0].score - 0.7 / 61.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_config() {
        assert_eq!(
            FusionConfig::new(60.0, 0.0, 1.0),
            Err(FusionError::InvalidWeights)
        );
        assert!(matches!(
            FusionConfig::new(f64::NAN, 1.0, 1.0),
            Err(FusionError::InvalidK(_))
        ));
        assert_eq!(
            FusionConfig::from_retrieval(&RetrievalConfig::default()).unwrap(),
            FusionConfig::default()
        );
    }
}
