//! SQL schema for the Lore SQLite store, as an ordered list of migrations.
//!
//! Each migration is applied at most once and recorded in
//! `schema_migrations` together with a checksum of its body. Editing the SQL
//! of an already-released migration changes its checksum, which the runner
//! reports as a duplicate version instead of silently skipping it. Add a new
//! migration instead.

use sha2::{Digest, Sha256};

/// Connection-level settings, applied on every open. Not versioned.
pub const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
";

/// The ledger table itself; created before any migration runs.
pub const LEDGER: &str = "
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    TEXT PRIMARY KEY,
    checksum   TEXT NOT NULL,
    applied_at TEXT NOT NULL
);
";

/// A single versioned schema change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
  /// Sort key; versions must strictly increase through [`MIGRATIONS`].
  pub version: &'static str,
  pub sql:     &'static str,
}

impl Migration {
  /// `sha256:<hex>` digest of the version label and body.
  pub fn checksum(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.version.as_bytes());
    hasher.update([0x00]);
    hasher.update(self.sql.trim().as_bytes());
    format!("sha256:{}", hex::encode(hasher.finalize()))
  }
}

const BASE: &str = "
-- Deployment-wide constants such as the embedding dimension.
CREATE TABLE store_settings (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Raw source content. Only `ingested` is ever updated.
CREATE TABLE history_entries (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    entity     TEXT    NOT NULL CHECK (length(entity) > 0),
    ingested   INTEGER NOT NULL DEFAULT 0 CHECK (ingested IN (0, 1)),
    content    TEXT    NOT NULL CHECK (length(content) > 0),
    created_at TEXT    NOT NULL,   -- RFC 3339 UTC, fixed microsecond width
    metadata   TEXT    NOT NULL DEFAULT '{}',
    isolation  TEXT    NOT NULL DEFAULT '{}'   -- canonical JSON
);

CREATE TABLE profile_entries (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    entity     TEXT NOT NULL CHECK (length(entity) > 0),
    tag        TEXT NOT NULL DEFAULT 'general',
    feature    TEXT NOT NULL CHECK (length(feature) > 0),
    value      TEXT NOT NULL CHECK (length(value) > 0),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    embedding  BLOB NOT NULL,   -- little-endian f32
    metadata   TEXT NOT NULL DEFAULT '{}',
    isolation  TEXT NOT NULL DEFAULT '{}',
    CHECK (updated_at >= created_at)
);

CREATE TABLE citations (
    profile_id INTEGER NOT NULL REFERENCES profile_entries(id) ON DELETE CASCADE,
    history_id INTEGER NOT NULL REFERENCES history_entries(id) ON DELETE CASCADE,
    PRIMARY KEY (profile_id, history_id)
) WITHOUT ROWID;

CREATE INDEX history_entity_idx  ON history_entries(entity);
CREATE INDEX profile_entity_idx  ON profile_entries(entity);
CREATE INDEX citations_history_idx ON citations(history_id);
";

const INGEST_SCAN: &str = "
CREATE INDEX history_entity_ingested_idx
    ON history_entries(entity, ingested);
CREATE INDEX history_unconsumed_scan_idx
    ON history_entries(entity, ingested, created_at DESC);
";

const FEATURE_LOOKUP: &str = "
CREATE INDEX profile_feature_idx
    ON profile_entries(entity, tag, feature);
";

/// Every migration this build knows, in application order.
pub const MIGRATIONS: &[Migration] = &[
  Migration { version: "0001_base", sql: BASE },
  Migration { version: "0002_ingest_scan", sql: INGEST_SCAN },
  Migration { version: "0003_feature_lookup", sql: FEATURE_LOOKUP },
];

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn checksum_is_stable_and_prefixed() {
    let m = MIGRATIONS[0];
    assert!(m.checksum().starts_with("sha256:"));
    assert_eq!(m.checksum(), m.checksum());
    assert_ne!(m.checksum(), MIGRATIONS[1].checksum());
  }

  #[test]
  fn built_in_versions_strictly_increase() {
    assert!(MIGRATIONS.windows(2).all(|w| w[0].version < w[1].version));
  }
}
