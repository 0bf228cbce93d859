//! The `MemoryStore` trait and supporting types.
//!
//! The trait is implemented by storage backends (e.g. `lore-store-sqlite`).
//! Ingestion, extraction and retrieval components depend on this abstraction,
//! not on any concrete backend.

use std::{collections::BTreeSet, future::Future};

use serde::{Deserialize, Serialize};

use crate::{
  history::{HistoryEntry, HistoryFilter, HistoryId, HistoryPage, NewHistoryEntry, UnconsumedQuery},
  profile::{
    NewProfileEntry, ProfileEntry, ProfileId, ProfileView, ScoredProfileEntry, SimilarityQuery,
    WriteMode,
  },
  scope::Scope,
  tagged::TaggedMap,
};

/// Row counts reported by [`MemoryStore::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
  pub profile_entries: u64,
  pub history_entries: u64,
  pub uningested:      u64,
  pub citations:       u64,
  pub embedding_dim:   usize,
}

/// Abstraction over a profile-memory storage backend.
///
/// Every method is all-or-nothing: an invariant violation leaves the store in
/// its prior state. Deleting either endpoint of a citation removes the edge
/// in the same transaction.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes.
pub trait MemoryStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// The fixed embedding width of this deployment.
  fn embedding_dim(&self) -> usize;

  // ── History ───────────────────────────────────────────────────────────

  /// Append raw content. The id, `created_at` and `ingested = false` are set
  /// by the store.
  fn append(
    &self,
    input: NewHistoryEntry,
  ) -> impl Future<Output = Result<HistoryEntry, Self::Error>> + Send + '_;

  /// Fetch one history entry; not-found if absent.
  fn get_history(
    &self,
    id: HistoryId,
  ) -> impl Future<Output = Result<HistoryEntry, Self::Error>> + Send + '_;

  /// One page of not-yet-ingested entries for a scope, in creation order.
  fn list_unconsumed(
    &self,
    query: UnconsumedQuery,
  ) -> impl Future<Output = Result<HistoryPage, Self::Error>> + Send + '_;

  /// Entries matching `filter` regardless of ingestion state, oldest first.
  fn list_history(
    &self,
    filter: HistoryFilter,
  ) -> impl Future<Output = Result<Vec<HistoryEntry>, Self::Error>> + Send + '_;

  /// Number of un-ingested entries, for one entity or the whole store.
  fn count_unconsumed(
    &self,
    entity: Option<String>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Set `ingested = true`. Idempotent; not-found if absent.
  fn mark_ingested(
    &self,
    id: HistoryId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Batch form of [`Self::mark_ingested`]. A missing id aborts the batch.
  fn mark_many_ingested(
    &self,
    ids: Vec<HistoryId>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Atomically flip `ingested` from `false` to `true`.
  ///
  /// Exactly one of several concurrent claimers succeeds; the others get a
  /// concurrency-conflict error.
  fn claim(
    &self,
    id: HistoryId,
  ) -> impl Future<Output = Result<HistoryEntry, Self::Error>> + Send + '_;

  /// Delete every entry matching `filter`, returning how many were removed.
  fn delete_history(
    &self,
    filter: HistoryFilter,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Delete one entry; not-found if absent.
  fn delete_history_entry(
    &self,
    id: HistoryId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Profile ───────────────────────────────────────────────────────────

  /// Write a profile entry according to `mode`, linking its citations in the
  /// same transaction.
  fn upsert(
    &self,
    input: NewProfileEntry,
    mode: WriteMode,
  ) -> impl Future<Output = Result<ProfileEntry, Self::Error>> + Send + '_;

  /// Fetch one profile entry; not-found if absent.
  fn get_profile_entry(
    &self,
    id: ProfileId,
  ) -> impl Future<Output = Result<ProfileEntry, Self::Error>> + Send + '_;

  /// Rank the scope's entries by similarity to the query embedding. Ties are
  /// broken by most recent `updated_at`.
  fn search(
    &self,
    query: SimilarityQuery,
  ) -> impl Future<Output = Result<Vec<ScoredProfileEntry>, Self::Error>> + Send + '_;

  /// Entries of a scope carrying exactly `tag`.
  fn list_by_tag(
    &self,
    scope: Scope,
    tag: String,
  ) -> impl Future<Output = Result<Vec<ProfileEntry>, Self::Error>> + Send + '_;

  /// Materialise the grouped [`ProfileView`] of a scope.
  fn get_profile(
    &self,
    scope: Scope,
  ) -> impl Future<Output = Result<ProfileView, Self::Error>> + Send + '_;

  /// Tag groups of a scope holding at least `threshold` entries.
  fn large_sections(
    &self,
    scope: Scope,
    threshold: usize,
  ) -> impl Future<Output = Result<Vec<Vec<ProfileEntry>>, Self::Error>> + Send + '_;

  /// Delete one entry; not-found if absent.
  fn delete_profile_entry(
    &self,
    id: ProfileId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Delete an entity's entries, in one isolation scope or (`None`) in all of
  /// them. Returns how many were removed.
  fn delete_by_entity(
    &self,
    entity: String,
    isolation: Option<TaggedMap>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Delete every value of a feature, or only the entries holding `value`.
  fn delete_feature(
    &self,
    scope: Scope,
    tag: String,
    feature: String,
    value: Option<String>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Citations ─────────────────────────────────────────────────────────

  /// Link a profile entry to a history entry. Idempotent; both endpoints
  /// must exist.
  fn link(
    &self,
    profile_id: ProfileId,
    history_id: HistoryId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Remove an edge if present.
  fn unlink(
    &self,
    profile_id: ProfileId,
    history_id: HistoryId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// History ids cited by a profile entry. Empty for unknown ids.
  fn citations_for_profile(
    &self,
    profile_id: ProfileId,
  ) -> impl Future<Output = Result<BTreeSet<HistoryId>, Self::Error>> + Send + '_;

  /// Profile ids citing a history entry. Empty for unknown ids.
  fn sources_for_history(
    &self,
    history_id: HistoryId,
  ) -> impl Future<Output = Result<BTreeSet<ProfileId>, Self::Error>> + Send + '_;

  /// Isolation scope of each existing history entry in `ids`; unknown ids are
  /// skipped.
  fn citation_scopes(
    &self,
    ids: Vec<HistoryId>,
  ) -> impl Future<Output = Result<Vec<(HistoryId, TaggedMap)>, Self::Error>> + Send + '_;

  // ── Maintenance ───────────────────────────────────────────────────────

  /// Remove all profile, history and citation rows. Schema bookkeeping is
  /// kept and ids are not reused afterwards.
  fn delete_all(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn stats(&self) -> impl Future<Output = Result<StoreStats, Self::Error>> + Send + '_;
}
