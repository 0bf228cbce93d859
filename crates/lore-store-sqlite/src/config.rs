//! Store configuration.

use std::{path::PathBuf, time::Duration};

use serde::Deserialize;

/// How to open a [`crate::SqliteStore`].
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
  /// SQLite database file; created if missing.
  pub path:            PathBuf,
  /// Width of every profile embedding in this deployment. Pinned in the
  /// database on first open.
  pub embedding_dim:   usize,
  /// How long a writer waits on a locked database before giving up.
  #[serde(default = "default_busy_timeout_ms")]
  pub busy_timeout_ms: u64,
}

fn default_busy_timeout_ms() -> u64 { 5_000 }

impl StoreConfig {
  pub fn new(path: impl Into<PathBuf>, embedding_dim: usize) -> Self {
    Self {
      path: path.into(),
      embedding_dim,
      busy_timeout_ms: default_busy_timeout_ms(),
    }
  }

  pub fn busy_timeout(&self) -> Duration { Duration::from_millis(self.busy_timeout_ms) }
}
