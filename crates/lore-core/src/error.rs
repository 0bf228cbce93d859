//! Error types for `lore-core`.

use thiserror::Error;

/// A write that would violate a field-level invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
  #[error("required field {0:?} is empty")]
  EmptyField(&'static str),

  #[error("embedding has {actual} dimensions, store expects {expected}")]
  DimensionMismatch { expected: usize, actual: usize },

  #[error("embedding dimension must be non-zero")]
  ZeroDimension,

  #[error("embedding contains a non-finite component at index {0}")]
  NonFiniteEmbedding(usize),

  #[error("tag value for key {0:?} is not a finite number")]
  NonFiniteTag(String),

  #[error("limit must be between 1 and i64::MAX")]
  InvalidLimit,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("validation error: {0}")]
  Validation(#[from] ValidationError),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Reject empty or whitespace-only required strings.
pub(crate) fn require_non_empty(
  field: &'static str,
  value: &str,
) -> Result<(), ValidationError> {
  if value.trim().is_empty() {
    return Err(ValidationError::EmptyField(field));
  }
  Ok(())
}
