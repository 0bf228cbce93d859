//! The vector-index capability used by profile similarity search.
//!
//! Stores narrow the candidate set (entity, isolation scope) themselves and
//! hand the survivors to a [`VectorIndex`] for ranking, so the indexing
//! algorithm stays pluggable.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{embedding::Embedding, profile::ProfileId};

/// A ranked search result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
  pub id:         ProfileId,
  /// Higher is closer.
  pub similarity: f32,
}

/// Ranks candidate embeddings against a query vector.
pub trait VectorIndex: Send + Sync {
  /// Return up to `k` candidates ordered closest first.
  ///
  /// Candidates arrive in the store's tie-break order (most recently updated
  /// first). Implementations must keep that relative order for equal
  /// similarities.
  fn nearest(
    &self,
    query: &Embedding,
    candidates: &[(ProfileId, &Embedding)],
    k: usize,
  ) -> Vec<Neighbor>;
}

/// Exhaustive cosine-similarity scan. Exact, and linear in the number of
/// candidates.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactCosineIndex;

impl VectorIndex for ExactCosineIndex {
  fn nearest(
    &self,
    query: &Embedding,
    candidates: &[(ProfileId, &Embedding)],
    k: usize,
  ) -> Vec<Neighbor> {
    let mut scored: Vec<Neighbor> = candidates
      .iter()
      .map(|(id, emb)| Neighbor {
        id:         *id,
        similarity: cosine_similarity(query.as_slice(), emb.as_slice()),
      })
      .collect();

    // `sort_by` is stable, so equal scores keep candidate order.
    scored.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(Ordering::Equal));
    scored.truncate(k);
    scored
  }
}

/// Cosine similarity between two vectors. Zero-length or zero-norm inputs
/// score `0.0`.
///
/// Accumulates in `f64` so finite `f32` inputs of any magnitude neither
/// overflow nor underflow.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
  if a.len() != b.len() || a.is_empty() {
    return 0.0;
  }

  let mut dot = 0.0_f64;
  let mut norm_a = 0.0_f64;
  let mut norm_b = 0.0_f64;
  for (&x, &y) in a.iter().zip(b.iter()) {
    let (x, y) = (f64::from(x), f64::from(y));
    dot += x * y;
    norm_a += x * x;
    norm_b += y * y;
  }

  let denom = norm_a.sqrt() * norm_b.sqrt();
  if denom == 0.0 {
    return 0.0;
  }
  (dot / denom).clamp(-1.0, 1.0) as f32
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn identical_vectors_score_one() {
    let s = cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]);
    assert!((s - 1.0).abs() < 1e-6);
  }

  #[test]
  fn orthogonal_vectors_score_zero() {
    assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
  }

  #[test]
  fn zero_vector_scores_zero() {
    assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
  }

  #[test]
  fn large_magnitudes_do_not_overflow() {
    let s = cosine_similarity(&[1e20, 0.0], &[1.0, 0.0]);
    assert!((s - 1.0).abs() < 1e-6);
    let s = cosine_similarity(&[3e38, 3e38], &[-3e38, -3e38]);
    assert!((s + 1.0).abs() < 1e-6);
  }

  #[test]
  fn small_magnitudes_are_not_zeroed() {
    let s = cosine_similarity(&[1e-4, 0.0], &[1e-4, 0.0]);
    assert!((s - 1.0).abs() < 1e-6);
    let s = cosine_similarity(&[1e-40, 0.0], &[0.0, 1e-40]);
    assert!(s.abs() < 1e-6);
    let s = cosine_similarity(&[1e-40, 1e-40], &[1e-40, 1e-40]);
    assert!((s - 1.0).abs() < 1e-6);
  }

  #[test]
  fn exact_index_ranks_closest_first_and_truncates() {
    let near = Embedding::from(vec![1.0_f32, 0.1]);
    let far = Embedding::from(vec![0.0_f32, 1.0]);
    let mid = Embedding::from(vec![0.7_f32, 0.7]);
    let query = Embedding::from(vec![1.0_f32, 0.0]);

    let ranked = ExactCosineIndex.nearest(
      &query,
      &[(ProfileId(1), &far), (ProfileId(2), &near), (ProfileId(3), &mid)],
      2,
    );

    let ids: Vec<_> = ranked.iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![ProfileId(2), ProfileId(3)]);
  }

  #[test]
  fn exact_index_keeps_candidate_order_on_ties() {
    let a = Embedding::from(vec![1.0_f32, 0.0]);
    let b = Embedding::from(vec![2.0_f32, 0.0]);
    let ranked = ExactCosineIndex.nearest(&a, &[(ProfileId(9), &b), (ProfileId(4), &a)], 2);
    assert_eq!(ranked[0].id, ProfileId(9));
    assert_eq!(ranked[1].id, ProfileId(4));
  }
}
