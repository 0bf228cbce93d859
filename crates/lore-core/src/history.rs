//! History entries — the raw source records profile facts are derived from.
//!
//! History is append-mostly. The only mutation a row ever sees is its
//! `ingested` flag flipping to `true` once the extraction process has consumed
//! it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  ValidationError, error::require_non_empty, scope::Scope, tagged::TaggedMap,
};

// ─── Identity ────────────────────────────────────────────────────────────────

/// Surrogate key of a history entry. Assigned by the store, strictly
/// increasing, never reused.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct HistoryId(pub i64);

impl fmt::Display for HistoryId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

// ─── Entry ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
  pub id:         HistoryId,
  pub entity:     String,
  pub ingested:   bool,
  pub content:    String,
  pub created_at: DateTime<Utc>,
  pub metadata:   TaggedMap,
  pub isolation:  TaggedMap,
}

impl HistoryEntry {
  /// The pagination cursor positioned just after this entry.
  pub fn cursor(&self) -> HistoryCursor {
    HistoryCursor { created_at: self.created_at, id: self.id }
  }
}

/// Input to [`crate::store::MemoryStore::append`]. The id, timestamp and
/// ingestion flag are always set by the store.
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
  pub entity:    String,
  pub content:   String,
  pub metadata:  TaggedMap,
  pub isolation: TaggedMap,
}

impl NewHistoryEntry {
  pub fn new(entity: impl Into<String>, content: impl Into<String>) -> Self {
    Self {
      entity:    entity.into(),
      content:   content.into(),
      metadata:  TaggedMap::new(),
      isolation: TaggedMap::new(),
    }
  }

  pub fn with_metadata(mut self, metadata: TaggedMap) -> Self {
    self.metadata = metadata;
    self
  }

  pub fn with_isolation(mut self, isolation: TaggedMap) -> Self {
    self.isolation = isolation;
    self
  }

  pub fn validate(&self) -> Result<(), ValidationError> {
    require_non_empty("entity", &self.entity)?;
    require_non_empty("content", &self.content)?;
    self.metadata.validate()?;
    self.isolation.validate()
  }
}

// ─── Unconsumed scan ─────────────────────────────────────────────────────────

/// Direction of a scan over creation time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
  #[default]
  OldestFirst,
  NewestFirst,
}

/// Keyset position inside a creation-ordered scan. Ties on `created_at` are
/// broken by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryCursor {
  pub created_at: DateTime<Utc>,
  pub id:         HistoryId,
}

/// Parameters for [`crate::store::MemoryStore::list_unconsumed`].
///
/// The scan is lazy and restartable: each call returns at most `limit`
/// entries plus a cursor for the next page. Passing `after: None` starts over
/// from the beginning.
#[derive(Debug, Clone)]
pub struct UnconsumedQuery {
  pub scope: Scope,
  pub limit: usize,
  pub order: Order,
  pub after: Option<HistoryCursor>,
}

impl UnconsumedQuery {
  pub const DEFAULT_LIMIT: usize = 100;

  pub fn new(scope: Scope) -> Self {
    Self { scope, limit: Self::DEFAULT_LIMIT, order: Order::default(), after: None }
  }

  pub fn limit(mut self, limit: usize) -> Self {
    self.limit = limit;
    self
  }

  pub fn order(mut self, order: Order) -> Self {
    self.order = order;
    self
  }

  pub fn after(mut self, cursor: HistoryCursor) -> Self {
    self.after = Some(cursor);
    self
  }

  pub fn validate(&self) -> Result<(), ValidationError> {
    self.scope.validate()?;
    self.sql_limit().map(|_| ())
  }

  /// The page size as a signed 64-bit integer. Zero and values past
  /// `i64::MAX` are rejected.
  pub fn sql_limit(&self) -> Result<i64, ValidationError> {
    match i64::try_from(self.limit) {
      Ok(n) if n > 0 => Ok(n),
      _ => Err(ValidationError::InvalidLimit),
    }
  }
}

/// One page of an unconsumed scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPage {
  pub entries: Vec<HistoryEntry>,
  /// `Some` when the page was full and more entries may follow. The next
  /// page can still come back empty.
  pub next:    Option<HistoryCursor>,
}

impl HistoryPage {
  /// Build a page, deriving `next` from whether `limit` entries came back.
  pub fn from_entries(entries: Vec<HistoryEntry>, limit: usize) -> Self {
    let next = if entries.len() >= limit {
      entries.last().map(HistoryEntry::cursor)
    } else {
      None
    };
    Self { entries, next }
  }
}

// ─── Filters ─────────────────────────────────────────────────────────────────

/// Entity-scoped predicate for listing and deleting history.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
  pub entity:         String,
  /// Exact isolation scope; `None` matches every scope of the entity.
  pub isolation:      Option<TaggedMap>,
  /// Inclusive lower bound on `created_at`.
  pub created_after:  Option<DateTime<Utc>>,
  /// Exclusive upper bound on `created_at`.
  pub created_before: Option<DateTime<Utc>>,
  /// Restrict to rows that have already been ingested.
  pub ingested_only:  bool,
}

impl HistoryFilter {
  pub fn entity(entity: impl Into<String>) -> Self {
    Self { entity: entity.into(), ..Self::default() }
  }

  pub fn scope(scope: Scope) -> Self {
    Self {
      entity: scope.entity,
      isolation: Some(scope.isolation),
      ..Self::default()
    }
  }

  pub fn validate(&self) -> Result<(), ValidationError> {
    require_non_empty("entity", &self.entity)?;
    match &self.isolation {
      Some(iso) => iso.validate(),
      None => Ok(()),
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn entry(id: i64) -> HistoryEntry {
    HistoryEntry {
      id:         HistoryId(id),
      entity:     "u1".into(),
      ingested:   false,
      content:    format!("message {id}"),
      created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, id as u32).unwrap(),
      metadata:   TaggedMap::new(),
      isolation:  TaggedMap::new(),
    }
  }

  #[test]
  fn full_page_has_a_cursor_at_its_last_entry() {
    let page = HistoryPage::from_entries(vec![entry(1), entry(2)], 2);
    assert_eq!(page.next, Some(entry(2).cursor()));
  }

  #[test]
  fn short_page_is_the_last_one() {
    let page = HistoryPage::from_entries(vec![entry(1)], 2);
    assert!(page.next.is_none());
  }

  #[test]
  fn blank_content_is_rejected() {
    let err = NewHistoryEntry::new("u1", "   ").validate().unwrap_err();
    assert_eq!(err, ValidationError::EmptyField("content"));
  }

  #[test]
  fn zero_limit_is_rejected() {
    let q = UnconsumedQuery::new(Scope::new("u1")).limit(0);
    assert_eq!(q.validate(), Err(ValidationError::InvalidLimit));
  }

  #[test]
  fn limit_must_fit_in_i64() {
    let q = UnconsumedQuery::new(Scope::new("u1")).limit(usize::MAX);
    assert_eq!(q.validate(), Err(ValidationError::InvalidLimit));

    let q = UnconsumedQuery::new(Scope::new("u1")).limit(i64::MAX as usize);
    assert_eq!(q.sql_limit(), Ok(i64::MAX));
  }
}
