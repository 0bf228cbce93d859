//! [`SqliteStore`] — the SQLite implementation of [`MemoryStore`] and
//! [`MigrationLedger`].

use std::{collections::BTreeSet, path::Path, sync::Arc, time::Duration};

use lore_core::{
  history::{HistoryEntry, HistoryFilter, HistoryId, HistoryPage, NewHistoryEntry, UnconsumedQuery},
  index::{ExactCosineIndex, VectorIndex},
  migration::{MigrationLedger, MigrationRecord, MigrationStatus},
  profile::{
    self as profile_model, NewProfileEntry, ProfileEntry, ProfileId, ProfileView,
    ScoredProfileEntry, SimilarityQuery, WriteMode,
  },
  scope::Scope,
  store::{MemoryStore, StoreStats},
  tagged::TaggedMap,
};
use rusqlite::Connection;
use tracing::info;

use crate::{
  Error, Result, StoreConfig, citation, history, migrate, profile,
  schema::{MIGRATIONS, PRAGMAS},
  settings, tx,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Lore store backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection and vector index are
/// reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:            tokio_rusqlite::Connection,
  embedding_dim:   usize,
  index:           Arc<dyn VectorIndex>,
  applied_on_open: Vec<&'static str>,
}

impl SqliteStore {
  /// Open (or create) the store described by `config`, apply pending
  /// migrations and pin the embedding dimension.
  pub async fn open(config: &StoreConfig) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(&config.path).await?;
    Self::init(conn, config.embedding_dim, config.busy_timeout(), Some(config.path.as_path())).await
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory(embedding_dim: usize) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, embedding_dim, Duration::ZERO, None).await
  }

  async fn init(
    conn: tokio_rusqlite::Connection,
    embedding_dim: usize,
    busy_timeout: Duration,
    path: Option<&Path>,
  ) -> Result<Self> {
    let applied_on_open = conn
      .call(move |conn| Ok(initialise(conn, embedding_dim, busy_timeout)))
      .await??;

    info!(
      path = ?path,
      embedding_dim,
      applied = ?applied_on_open,
      "opened store"
    );

    Ok(Self {
      conn,
      embedding_dim,
      index: Arc::new(ExactCosineIndex),
      applied_on_open,
    })
  }

  /// Replace the vector index used by [`MemoryStore::search`].
  pub fn with_index(mut self, index: impl VectorIndex + 'static) -> Self {
    self.index = Arc::new(index);
    self
  }

  /// Versions applied while opening this handle (empty if the schema was
  /// already current).
  pub fn applied_on_open(&self) -> &[&'static str] { &self.applied_on_open }

  /// Apply any pending built-in migrations, returning those applied now.
  pub async fn migrate(&self) -> Result<Vec<&'static str>> {
    self.run(|conn| migrate::run(conn, MIGRATIONS)).await
  }

  /// Applied/pending state of every built-in migration.
  pub async fn migration_status(&self) -> Result<Vec<MigrationStatus>> {
    self.run(|conn| migrate::status(conn, MIGRATIONS)).await
  }

  /// Ship a synchronous operation to the connection thread.
  async fn run<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(conn))).await?
  }
}

fn initialise(
  conn: &mut Connection,
  embedding_dim: usize,
  busy_timeout: Duration,
) -> Result<Vec<&'static str>> {
  conn.busy_timeout(busy_timeout)?;
  conn
    .execute_batch(PRAGMAS)
    .map_err(|e| Error::from_locking(e, "database busy while setting pragmas"))?;
  let applied = migrate::run(conn, MIGRATIONS)?;
  settings::ensure_embedding_dim(conn, embedding_dim)?;
  Ok(applied)
}

fn count(conn: &Connection, sql: &str) -> Result<u64> {
  let n: i64 = conn.query_row(sql, [], |r| r.get(0))?;
  Ok(n as u64)
}

// ─── MigrationLedger impl ────────────────────────────────────────────────────

impl MigrationLedger for SqliteStore {
  type Error = crate::Error;

  async fn is_applied(&self, version: String) -> Result<bool> {
    self.run(move |conn| migrate::is_applied(conn, &version)).await
  }

  async fn record_applied(&self, version: String, checksum: String) -> Result<()> {
    self.run(move |conn| migrate::record_applied(conn, &version, &checksum)).await
  }

  async fn applied(&self) -> Result<Vec<MigrationRecord>> {
    self.run(|conn| migrate::applied(conn)).await
  }
}

// ─── MemoryStore impl ────────────────────────────────────────────────────────

impl MemoryStore for SqliteStore {
  type Error = crate::Error;

  fn embedding_dim(&self) -> usize { self.embedding_dim }

  // ── History ───────────────────────────────────────────────────────────────

  async fn append(&self, input: NewHistoryEntry) -> Result<HistoryEntry> {
    self.run(move |conn| history::append(conn, input)).await
  }

  async fn get_history(&self, id: HistoryId) -> Result<HistoryEntry> {
    self.run(move |conn| history::get(conn, id)).await
  }

  async fn list_unconsumed(&self, query: UnconsumedQuery) -> Result<HistoryPage> {
    self.run(move |conn| history::list_unconsumed(conn, query)).await
  }

  async fn list_history(&self, filter: HistoryFilter) -> Result<Vec<HistoryEntry>> {
    self.run(move |conn| history::list(conn, filter)).await
  }

  async fn count_unconsumed(&self, entity: Option<String>) -> Result<u64> {
    self
      .run(move |conn| history::count_unconsumed(conn, entity.as_deref()))
      .await
  }

  async fn mark_ingested(&self, id: HistoryId) -> Result<()> {
    self.run(move |conn| history::mark_ingested(conn, id)).await
  }

  async fn mark_many_ingested(&self, ids: Vec<HistoryId>) -> Result<()> {
    self.run(move |conn| history::mark_many_ingested(conn, &ids)).await
  }

  async fn claim(&self, id: HistoryId) -> Result<HistoryEntry> {
    self.run(move |conn| history::claim(conn, id)).await
  }

  async fn delete_history(&self, filter: HistoryFilter) -> Result<u64> {
    self.run(move |conn| history::delete(conn, filter)).await
  }

  async fn delete_history_entry(&self, id: HistoryId) -> Result<()> {
    self.run(move |conn| history::delete_one(conn, id)).await
  }

  // ── Profile ───────────────────────────────────────────────────────────────

  async fn upsert(&self, input: NewProfileEntry, mode: WriteMode) -> Result<ProfileEntry> {
    let dim = self.embedding_dim;
    self.run(move |conn| profile::upsert(conn, dim, input, mode)).await
  }

  async fn get_profile_entry(&self, id: ProfileId) -> Result<ProfileEntry> {
    self.run(move |conn| profile::get(conn, id)).await
  }

  async fn search(&self, query: SimilarityQuery) -> Result<Vec<ScoredProfileEntry>> {
    let dim = self.embedding_dim;
    let index = Arc::clone(&self.index);
    self
      .run(move |conn| profile::search(conn, dim, index.as_ref(), query))
      .await
  }

  async fn list_by_tag(&self, scope: Scope, tag: String) -> Result<Vec<ProfileEntry>> {
    self.run(move |conn| profile::list_by_tag(conn, &scope, &tag)).await
  }

  async fn get_profile(&self, scope: Scope) -> Result<ProfileView> {
    self
      .run(move |conn| {
        let entries = profile::list_scope(conn, &scope)?;
        Ok(ProfileView::from_entries(scope, entries))
      })
      .await
  }

  async fn large_sections(&self, scope: Scope, threshold: usize) -> Result<Vec<Vec<ProfileEntry>>> {
    let entries = self.run(move |conn| profile::list_scope(conn, &scope)).await?;
    Ok(profile_model::large_sections(entries, threshold))
  }

  async fn delete_profile_entry(&self, id: ProfileId) -> Result<()> {
    self.run(move |conn| profile::delete_one(conn, id)).await
  }

  async fn delete_by_entity(&self, entity: String, isolation: Option<TaggedMap>) -> Result<u64> {
    self
      .run(move |conn| profile::delete_by_entity(conn, &entity, isolation.as_ref()))
      .await
  }

  async fn delete_feature(
    &self,
    scope: Scope,
    tag: String,
    feature: String,
    value: Option<String>,
  ) -> Result<u64> {
    self
      .run(move |conn| profile::delete_feature(conn, &scope, &tag, &feature, value.as_deref()))
      .await
  }

  // ── Citations ─────────────────────────────────────────────────────────────

  async fn link(&self, profile_id: ProfileId, history_id: HistoryId) -> Result<()> {
    self.run(move |conn| citation::link(conn, profile_id, history_id)).await
  }

  async fn unlink(&self, profile_id: ProfileId, history_id: HistoryId) -> Result<()> {
    self.run(move |conn| citation::unlink(conn, profile_id, history_id)).await
  }

  async fn citations_for_profile(&self, profile_id: ProfileId) -> Result<BTreeSet<HistoryId>> {
    self.run(move |conn| citation::for_profile(conn, profile_id)).await
  }

  async fn sources_for_history(&self, history_id: HistoryId) -> Result<BTreeSet<ProfileId>> {
    self.run(move |conn| citation::for_history(conn, history_id)).await
  }

  async fn citation_scopes(&self, ids: Vec<HistoryId>) -> Result<Vec<(HistoryId, TaggedMap)>> {
    self.run(move |conn| citation::scopes(conn, &ids)).await
  }

  // ── Maintenance ───────────────────────────────────────────────────────────

  async fn delete_all(&self) -> Result<()> {
    self
      .run(|conn| {
        let tx = tx::immediate(conn, "deleting all rows")?;
        tx.execute_batch(
          "DELETE FROM citations;
           DELETE FROM profile_entries;
           DELETE FROM history_entries;",
        )?;
        tx.commit()?;
        info!("deleted all profile, history and citation rows");
        Ok(())
      })
      .await
  }

  async fn stats(&self) -> Result<StoreStats> {
    let embedding_dim = self.embedding_dim;
    self
      .run(move |conn| {
        Ok(StoreStats {
          profile_entries: count(conn, "SELECT COUNT(*) FROM profile_entries")?,
          history_entries: count(conn, "SELECT COUNT(*) FROM history_entries")?,
          uningested:      count(conn, "SELECT COUNT(*) FROM history_entries WHERE ingested = 0")?,
          citations:       count(conn, "SELECT COUNT(*) FROM citations")?,
          embedding_dim,
        })
      })
      .await
  }
}
