//! Profile entries — structured feature/value facts derived from history.
//!
//! Unlike history, a profile entry is mutated in place when the same feature
//! is re-derived: its value, embedding and metadata are replaced and
//! `updated_at` advances. Whether a write updates or inserts is chosen by the
//! caller through [`WriteMode`]; the schema itself does not make
//! (entity, tag, feature) unique.

use std::{
  collections::{BTreeMap, BTreeSet},
  fmt,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  ValidationError,
  embedding::Embedding,
  error::require_non_empty,
  history::HistoryId,
  scope::Scope,
  tagged::TaggedMap,
};

/// The catch-all category used when a caller does not supply a tag.
pub const DEFAULT_TAG: &str = "general";

// ─── Identity ────────────────────────────────────────────────────────────────

/// Surrogate key of a profile entry. Assigned by the store, strictly
/// increasing, never reused.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ProfileId(pub i64);

impl fmt::Display for ProfileId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

// ─── Entry ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileEntry {
  pub id:         ProfileId,
  pub entity:     String,
  pub tag:        String,
  pub feature:    String,
  pub value:      String,
  pub created_at: DateTime<Utc>,
  /// Never earlier than `created_at`.
  pub updated_at: DateTime<Utc>,
  pub embedding:  Embedding,
  pub metadata:   TaggedMap,
  pub isolation:  TaggedMap,
}

/// How [`crate::store::MemoryStore::upsert`] treats an existing entry with the
/// same (entity, tag, feature, isolation).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
  /// Always create a new row, even if the feature already has values.
  #[default]
  Insert,
  /// Update the most recently updated matching row, or insert if none.
  InsertOrUpdate,
}

/// Input to [`crate::store::MemoryStore::upsert`].
#[derive(Debug, Clone)]
pub struct NewProfileEntry {
  pub entity:    String,
  pub tag:       String,
  pub feature:   String,
  pub value:     String,
  pub embedding: Embedding,
  pub metadata:  TaggedMap,
  pub isolation: TaggedMap,
  /// History entries this fact is derived from. Linked in the same
  /// transaction as the write.
  pub citations: Vec<HistoryId>,
}

impl NewProfileEntry {
  /// Convenience constructor using [`DEFAULT_TAG`] and empty maps.
  pub fn new(
    entity: impl Into<String>,
    feature: impl Into<String>,
    value: impl Into<String>,
    embedding: impl Into<Embedding>,
  ) -> Self {
    Self {
      entity:    entity.into(),
      tag:       DEFAULT_TAG.to_owned(),
      feature:   feature.into(),
      value:     value.into(),
      embedding: embedding.into(),
      metadata:  TaggedMap::new(),
      isolation: TaggedMap::new(),
      citations: Vec::new(),
    }
  }

  pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
    self.tag = tag.into();
    self
  }

  pub fn with_metadata(mut self, metadata: TaggedMap) -> Self {
    self.metadata = metadata;
    self
  }

  pub fn with_isolation(mut self, isolation: TaggedMap) -> Self {
    self.isolation = isolation;
    self
  }

  pub fn citing(mut self, citations: impl IntoIterator<Item = HistoryId>) -> Self {
    self.citations.extend(citations);
    self
  }

  /// Validate every field against the store's embedding dimension.
  pub fn validate(&self, dim: usize) -> Result<(), ValidationError> {
    require_non_empty("entity", &self.entity)?;
    require_non_empty("tag", &self.tag)?;
    require_non_empty("feature", &self.feature)?;
    require_non_empty("value", &self.value)?;
    self.embedding.validate(dim)?;
    self.metadata.validate()?;
    self.isolation.validate()
  }
}

// ─── Similarity search ───────────────────────────────────────────────────────

/// Parameters for [`crate::store::MemoryStore::search`].
#[derive(Debug, Clone)]
pub struct SimilarityQuery {
  pub scope:             Scope,
  pub embedding:         Embedding,
  pub top_k:             usize,
  /// Drop results whose similarity is below this threshold.
  pub min_similarity:    Option<f32>,
  /// Attach each result's cited history ids.
  pub include_citations: bool,
}

impl SimilarityQuery {
  pub fn new(scope: Scope, embedding: impl Into<Embedding>, top_k: usize) -> Self {
    Self {
      scope,
      embedding: embedding.into(),
      top_k,
      min_similarity: None,
      include_citations: false,
    }
  }

  pub fn min_similarity(mut self, threshold: f32) -> Self {
    self.min_similarity = Some(threshold);
    self
  }

  pub fn with_citations(mut self) -> Self {
    self.include_citations = true;
    self
  }

  pub fn validate(&self, dim: usize) -> Result<(), ValidationError> {
    self.scope.validate()?;
    self.embedding.validate(dim)?;
    if self.top_k == 0 {
      return Err(ValidationError::InvalidLimit);
    }
    Ok(())
  }
}

/// A search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredProfileEntry {
  pub entry:      ProfileEntry,
  pub similarity: f32,
  /// Present only when the query asked for citations.
  pub citations:  Option<BTreeSet<HistoryId>>,
}

// ─── Grouped read models ─────────────────────────────────────────────────────

/// One value of a feature inside a [`ProfileView`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileValue {
  pub id:         ProfileId,
  pub value:      String,
  pub updated_at: DateTime<Utc>,
}

/// The computed profile of one scope, grouped tag → feature → values. Never
/// stored, always derived.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileView {
  pub scope: Scope,
  pub tags:  BTreeMap<String, BTreeMap<String, Vec<ProfileValue>>>,
}

impl ProfileView {
  pub fn from_entries(scope: Scope, entries: impl IntoIterator<Item = ProfileEntry>) -> Self {
    let mut tags: BTreeMap<String, BTreeMap<String, Vec<ProfileValue>>> = BTreeMap::new();
    for e in entries {
      tags
        .entry(e.tag)
        .or_default()
        .entry(e.feature)
        .or_default()
        .push(ProfileValue { id: e.id, value: e.value, updated_at: e.updated_at });
    }
    for features in tags.values_mut() {
      for values in features.values_mut() {
        values.sort_by_key(|v| v.id);
      }
    }
    Self { scope, tags }
  }

  pub fn is_empty(&self) -> bool { self.tags.is_empty() }

  /// All values of `feature` under `tag`, oldest entry first.
  pub fn values(&self, tag: &str, feature: &str) -> Vec<&str> {
    self
      .tags
      .get(tag)
      .and_then(|f| f.get(feature))
      .map(|vs| vs.iter().map(|v| v.value.as_str()).collect())
      .unwrap_or_default()
  }
}

/// Group entries by tag and keep the groups holding at least `threshold`
/// entries. Groups are ordered by tag, entries within a group by id.
pub fn large_sections(
  entries: impl IntoIterator<Item = ProfileEntry>,
  threshold: usize,
) -> Vec<Vec<ProfileEntry>> {
  let mut by_tag: BTreeMap<String, Vec<ProfileEntry>> = BTreeMap::new();
  for e in entries {
    by_tag.entry(e.tag.clone()).or_default().push(e);
  }
  by_tag
    .into_values()
    .filter(|section| section.len() >= threshold)
    .map(|mut section| {
      section.sort_by_key(|e| e.id);
      section
    })
    .collect()
}
