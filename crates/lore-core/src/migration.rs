//! Migration ledger records and the ledger trait.
//!
//! The ledger only records completion. Sequencing migrations is the job of
//! the backend's runner.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One applied schema version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
  pub version:    String,
  /// Digest of the migration body as applied.
  pub checksum:   String,
  pub applied_at: DateTime<Utc>,
}

/// Applied/pending state of a known migration, for status reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStatus {
  pub version:    String,
  pub checksum:   String,
  /// `None` while pending.
  pub applied_at: Option<DateTime<Utc>>,
}

impl MigrationStatus {
  pub fn is_applied(&self) -> bool { self.applied_at.is_some() }
}

/// Bookkeeping for which schema versions a store has applied.
pub trait MigrationLedger: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// `true` once `version` has been recorded.
  fn is_applied(
    &self,
    version: String,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Record `version` as applied.
  ///
  /// Recording the same version with the same checksum again is a no-op.
  /// Recording it with a different checksum is a duplicate-version error.
  fn record_applied(
    &self,
    version: String,
    checksum: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// All recorded versions, in version order.
  fn applied(&self) -> impl Future<Output = Result<Vec<MigrationRecord>, Self::Error>> + Send + '_;
}
