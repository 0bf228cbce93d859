//! Write transactions.

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::{Error, Result};

/// Begin a `BEGIN IMMEDIATE` transaction. The write lock is taken up front,
/// so a transaction that reads before it writes cannot be invalidated by a
/// commit from another connection. A lock still held elsewhere after the busy
/// timeout is a [`Error::ConcurrencyConflict`].
pub fn immediate<'c>(conn: &'c mut Connection, what: &str) -> Result<Transaction<'c>> {
  conn
    .transaction_with_behavior(TransactionBehavior::Immediate)
    .map_err(|e| Error::from_locking(e, format!("database busy while {what}")))
}
