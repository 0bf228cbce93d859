//! Citation-graph operations.
//!
//! The `citations` table is keyed by (profile_id, history_id) for the forward
//! direction and indexed on history_id for the reverse one, so both
//! neighbour lookups are index scans.

use std::collections::BTreeSet;

use lore_core::{
  citation::MissingEndpoint, history::HistoryId, profile::ProfileId, tagged::TaggedMap,
};
use rusqlite::{Connection, OptionalExtension as _};
use tracing::debug;

use crate::{Error, Result, encode::decode_map, tx};

/// Insert an edge after checking both endpoints exist. Callers provide the
/// transaction.
pub fn link_in(conn: &Connection, profile: ProfileId, history: HistoryId) -> Result<()> {
  let profile_exists = exists(conn, "profile_entries", profile.0)?;
  let history_exists = exists(conn, "history_entries", history.0)?;
  if let Some(missing) = MissingEndpoint::from_presence(profile_exists, history_exists) {
    return Err(Error::DanglingReference { profile, history, missing });
  }

  conn.execute(
    "INSERT OR IGNORE INTO citations (profile_id, history_id) VALUES (?1, ?2)",
    rusqlite::params![profile.0, history.0],
  )?;
  Ok(())
}

pub fn link(conn: &mut Connection, profile: ProfileId, history: HistoryId) -> Result<()> {
  let tx = tx::immediate(conn, "linking citation")?;
  link_in(&tx, profile, history)?;
  tx.commit()?;
  debug!(%profile, %history, "linked citation");
  Ok(())
}

pub fn unlink(conn: &Connection, profile: ProfileId, history: HistoryId) -> Result<()> {
  conn.execute(
    "DELETE FROM citations WHERE profile_id = ?1 AND history_id = ?2",
    rusqlite::params![profile.0, history.0],
  )?;
  Ok(())
}

pub fn for_profile(conn: &Connection, profile: ProfileId) -> Result<BTreeSet<HistoryId>> {
  let mut stmt = conn.prepare_cached("SELECT history_id FROM citations WHERE profile_id = ?1")?;
  let ids = stmt
    .query_map(rusqlite::params![profile.0], |r| r.get(0).map(HistoryId))?
    .collect::<rusqlite::Result<BTreeSet<_>>>()?;
  Ok(ids)
}

pub fn for_history(conn: &Connection, history: HistoryId) -> Result<BTreeSet<ProfileId>> {
  let mut stmt = conn.prepare_cached("SELECT profile_id FROM citations WHERE history_id = ?1")?;
  let ids = stmt
    .query_map(rusqlite::params![history.0], |r| r.get(0).map(ProfileId))?
    .collect::<rusqlite::Result<BTreeSet<_>>>()?;
  Ok(ids)
}

pub fn scopes(conn: &Connection, ids: &[HistoryId]) -> Result<Vec<(HistoryId, TaggedMap)>> {
  let mut stmt = conn.prepare_cached("SELECT isolation FROM history_entries WHERE id = ?1")?;
  let mut out = Vec::with_capacity(ids.len());
  for id in ids {
    let raw: Option<String> = stmt
      .query_row(rusqlite::params![id.0], |r| r.get(0))
      .optional()?;
    if let Some(raw) = raw {
      out.push((*id, decode_map(&raw)?));
    }
  }
  Ok(out)
}

fn exists(conn: &Connection, table: &'static str, id: i64) -> Result<bool> {
  Ok(conn.query_row(
    &format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1)"),
    rusqlite::params![id],
    |r| r.get(0),
  )?)
}
