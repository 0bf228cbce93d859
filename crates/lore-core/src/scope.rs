//! [`Scope`] — the (entity, isolation) pair every read is partitioned by.

use serde::{Deserialize, Serialize};

use crate::{ValidationError, error::require_non_empty, tagged::TaggedMap};

/// Identifies one partition of the store: an owning entity plus the exact
/// isolation scope its rows were written with.
///
/// Matching is exact. Rows written with `{"tenant": "a"}` are invisible to a
/// scope of `{}` and vice versa.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scope {
  /// Opaque identifier of the owning entity (e.g. a user id).
  pub entity:    String,
  #[serde(default)]
  pub isolation: TaggedMap,
}

impl Scope {
  pub fn new(entity: impl Into<String>) -> Self {
    Self { entity: entity.into(), isolation: TaggedMap::new() }
  }

  pub fn with_isolation(mut self, isolation: TaggedMap) -> Self {
    self.isolation = isolation;
    self
  }

  pub fn validate(&self) -> Result<(), ValidationError> {
    require_non_empty("entity", &self.entity)?;
    self.isolation.validate()
  }
}
