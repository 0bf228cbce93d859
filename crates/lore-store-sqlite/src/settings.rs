//! Deployment-wide settings pinned in the `store_settings` table.

use lore_core::ValidationError;
use rusqlite::{Connection, OptionalExtension as _};
use tracing::info;

use crate::{Error, Result, tx};

const EMBEDDING_DIM: &str = "embedding_dim";

/// Pin the embedding dimension on first open; afterwards the configured value
/// must match the pinned one.
///
/// The read and the pin share one immediate transaction, so concurrent first
/// opens serialise and later openers see the pinned value.
pub fn ensure_embedding_dim(conn: &mut Connection, configured: usize) -> Result<()> {
  if configured == 0 {
    return Err(ValidationError::ZeroDimension.into());
  }

  let tx = tx::immediate(conn, "pinning the embedding dimension")?;
  let stored: Option<String> = tx
    .query_row(
      "SELECT value FROM store_settings WHERE key = ?1",
      rusqlite::params![EMBEDDING_DIM],
      |r| r.get(0),
    )
    .optional()?;

  match stored {
    None => {
      tx.execute(
        "INSERT INTO store_settings (key, value) VALUES (?1, ?2)",
        rusqlite::params![EMBEDDING_DIM, configured.to_string()],
      )?;
      tx.commit()?;
      info!(dim = configured, "pinned embedding dimension");
      Ok(())
    }
    Some(raw) => {
      let pinned: usize = raw.parse().map_err(|_| Error::Decode {
        column: "store_settings.value",
        reason: format!("embedding_dim {raw:?} is not an integer"),
      })?;
      if pinned != configured {
        return Err(
          ValidationError::DimensionMismatch { expected: pinned, actual: configured }.into(),
        );
      }
      Ok(())
    }
  }
}
