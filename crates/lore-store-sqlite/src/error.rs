//! Error type for `lore-store-sqlite`.

use lore_core::{
  ValidationError,
  citation::{MissingEndpoint, RecordRef},
  history::HistoryId,
  profile::ProfileId,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] lore_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored column could not be decoded into its domain type.
  #[error("corrupt column {column}: {reason}")]
  Decode { column: &'static str, reason: String },

  #[error("validation error: {0}")]
  Validation(#[from] ValidationError),

  #[error("{0} not found")]
  NotFound(RecordRef),

  #[error("citation {profile} -> {history} references a missing {missing}")]
  DanglingReference {
    profile: ProfileId,
    history: HistoryId,
    missing: MissingEndpoint,
  },

  #[error("migration {version} is already recorded with a different checksum")]
  DuplicateVersion { version: String },

  #[error("database has migration {0} which this build does not know")]
  UnknownVersion(String),

  #[error("migration {later} is listed after {earlier} but does not sort after it")]
  MigrationOrder { earlier: String, later: String },

  /// Another writer won a race; re-read and retry.
  #[error("concurrency conflict: {0}")]
  ConcurrencyConflict(String),
}

impl Error {
  /// `true` for errors a caller is expected to retry after re-reading.
  pub fn is_retryable(&self) -> bool { matches!(self, Self::ConcurrencyConflict(_)) }

  /// Map `SQLITE_BUSY`/`SQLITE_LOCKED` to a concurrency conflict; everything
  /// else stays a database error.
  pub(crate) fn from_locking(err: rusqlite::Error, what: impl Into<String>) -> Self {
    match err.sqlite_error_code() {
      Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked) => {
        Self::ConcurrencyConflict(what.into())
      }
      _ => Self::Sqlite(err),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
