//! Fixed-width embedding vectors.

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// A dense `f32` embedding. The width is not part of the type; stores check it
/// against their configured dimension on every write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
  pub fn new(values: Vec<f32>) -> Self { Self(values) }

  pub fn as_slice(&self) -> &[f32] { &self.0 }

  pub fn dim(&self) -> usize { self.0.len() }

  pub fn into_inner(self) -> Vec<f32> { self.0 }

  /// Check the vector has exactly `expected` finite components.
  pub fn validate(&self, expected: usize) -> Result<(), ValidationError> {
    if self.dim() != expected {
      return Err(ValidationError::DimensionMismatch {
        expected,
        actual: self.dim(),
      });
    }
    if let Some(i) = self.0.iter().position(|x| !x.is_finite()) {
      return Err(ValidationError::NonFiniteEmbedding(i));
    }
    Ok(())
  }
}

impl From<Vec<f32>> for Embedding {
  fn from(values: Vec<f32>) -> Self { Self(values) }
}

impl From<&[f32]> for Embedding {
  fn from(values: &[f32]) -> Self { Self(values.to_vec()) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn wrong_width_is_a_dimension_mismatch() {
    let e = Embedding::from(vec![0.1_f32, 0.2, 0.3]);
    assert_eq!(
      e.validate(2),
      Err(ValidationError::DimensionMismatch { expected: 2, actual: 3 })
    );
    assert!(e.validate(3).is_ok());
  }

  #[test]
  fn nan_component_is_rejected() {
    let e = Embedding::from(vec![0.1_f32, f32::NAN]);
    assert_eq!(e.validate(2), Err(ValidationError::NonFiniteEmbedding(1)));
  }
}
