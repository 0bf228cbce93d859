//! History-store operations over a plain [`rusqlite::Connection`].

use lore_core::{
  citation::RecordRef,
  history::{
    HistoryEntry, HistoryFilter, HistoryId, HistoryPage, NewHistoryEntry, Order, UnconsumedQuery,
  },
};
use rusqlite::{Connection, OptionalExtension as _, params_from_iter, types::Value};
use tracing::{debug, warn};

use crate::{
  Error, Result,
  encode::{HISTORY_COLUMNS, RawHistory, encode_dt, encode_map, now},
  tx,
};

pub fn append(conn: &Connection, input: NewHistoryEntry) -> Result<HistoryEntry> {
  input.validate()?;

  let created_at = now();
  let metadata = encode_map(&input.metadata)?;
  let isolation = encode_map(&input.isolation)?;

  conn.execute(
    "INSERT INTO history_entries (entity, ingested, content, created_at, metadata, isolation)
     VALUES (?1, 0, ?2, ?3, ?4, ?5)",
    rusqlite::params![input.entity, input.content, encode_dt(created_at), metadata, isolation],
  )?;
  let id = HistoryId(conn.last_insert_rowid());
  debug!(%id, entity = %input.entity, "appended history entry");

  Ok(HistoryEntry {
    id,
    entity: input.entity,
    ingested: false,
    content: input.content,
    created_at,
    metadata: input.metadata,
    isolation: input.isolation,
  })
}

pub fn get(conn: &Connection, id: HistoryId) -> Result<HistoryEntry> {
  conn
    .query_row(
      &format!("SELECT {HISTORY_COLUMNS} FROM history_entries WHERE id = ?1"),
      rusqlite::params![id.0],
      RawHistory::from_row,
    )
    .optional()?
    .ok_or(Error::NotFound(RecordRef::History(id)))?
    .into_entry()
}

pub fn list_unconsumed(conn: &Connection, query: UnconsumedQuery) -> Result<HistoryPage> {
  query.validate()?;

  let (cmp, dir) = match query.order {
    Order::OldestFirst => (">", "ASC"),
    Order::NewestFirst => ("<", "DESC"),
  };

  let mut values: Vec<Value> = vec![
    query.scope.entity.clone().into(),
    encode_map(&query.scope.isolation)?.into(),
  ];
  let mut sql = format!(
    "SELECT {HISTORY_COLUMNS} FROM history_entries
     WHERE entity = ?1 AND ingested = 0 AND isolation = ?2"
  );
  if let Some(cursor) = query.after {
    sql.push_str(&format!(
      " AND (created_at {cmp} ?3 OR (created_at = ?3 AND id {cmp} ?4))"
    ));
    values.push(encode_dt(cursor.created_at).into());
    values.push(cursor.id.0.into());
  }
  sql.push_str(&format!(" ORDER BY created_at {dir}, id {dir} LIMIT ?{}", values.len() + 1));
  values.push(Value::Integer(query.sql_limit()?));

  let entries = query_entries(conn, &sql, values)?;
  Ok(HistoryPage::from_entries(entries, query.limit))
}

pub fn list(conn: &Connection, filter: HistoryFilter) -> Result<Vec<HistoryEntry>> {
  filter.validate()?;
  let (clause, values) = filter_clause(&filter)?;
  query_entries(
    conn,
    &format!("SELECT {HISTORY_COLUMNS} FROM history_entries WHERE {clause} ORDER BY created_at, id"),
    values,
  )
}

pub fn count_unconsumed(conn: &Connection, entity: Option<&str>) -> Result<u64> {
  let count: i64 = match entity {
    Some(e) => conn.query_row(
      "SELECT COUNT(*) FROM history_entries WHERE entity = ?1 AND ingested = 0",
      rusqlite::params![e],
      |r| r.get(0),
    )?,
    None => conn.query_row(
      "SELECT COUNT(*) FROM history_entries WHERE ingested = 0",
      [],
      |r| r.get(0),
    )?,
  };
  Ok(count as u64)
}

pub fn mark_ingested(conn: &Connection, id: HistoryId) -> Result<()> {
  let changed = conn.execute(
    "UPDATE history_entries SET ingested = 1 WHERE id = ?1",
    rusqlite::params![id.0],
  )?;
  if changed == 0 {
    return Err(Error::NotFound(RecordRef::History(id)));
  }
  Ok(())
}

pub fn mark_many_ingested(conn: &mut Connection, ids: &[HistoryId]) -> Result<()> {
  let tx = tx::immediate(conn, "marking history entries ingested")?;
  for id in ids {
    mark_ingested(&tx, *id)?;
  }
  tx.commit()?;
  debug!(count = ids.len(), "marked history entries ingested");
  Ok(())
}

/// Conditional `false -> true` update; the row count tells us who won.
pub fn claim(conn: &mut Connection, id: HistoryId) -> Result<HistoryEntry> {
  let tx = tx::immediate(conn, &format!("claiming history entry {id}"))?;
  let changed = tx.execute(
    "UPDATE history_entries SET ingested = 1 WHERE id = ?1 AND ingested = 0",
    rusqlite::params![id.0],
  )?;

  // Not-found takes precedence over conflict.
  let entry = get(&tx, id)?;
  if changed == 0 {
    warn!(%id, "history entry already claimed");
    return Err(Error::ConcurrencyConflict(format!("history entry {id} is already ingested")));
  }
  tx.commit()?;
  Ok(entry)
}

/// Citation rows go with the history rows through `ON DELETE CASCADE`.
pub fn delete(conn: &Connection, filter: HistoryFilter) -> Result<u64> {
  filter.validate()?;
  let (clause, values) = filter_clause(&filter)?;
  let removed = conn.execute(
    &format!("DELETE FROM history_entries WHERE {clause}"),
    params_from_iter(values.iter()),
  )?;
  debug!(entity = %filter.entity, removed, "deleted history entries");
  Ok(removed as u64)
}

pub fn delete_one(conn: &Connection, id: HistoryId) -> Result<()> {
  let removed = conn.execute("DELETE FROM history_entries WHERE id = ?1", rusqlite::params![id.0])?;
  if removed == 0 {
    return Err(Error::NotFound(RecordRef::History(id)));
  }
  Ok(())
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn query_entries(conn: &Connection, sql: &str, values: Vec<Value>) -> Result<Vec<HistoryEntry>> {
  let mut stmt = conn.prepare(sql)?;
  let raws = stmt
    .query_map(params_from_iter(values.iter()), RawHistory::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawHistory::into_entry).collect()
}

/// Build the `WHERE` body and positional parameters for a [`HistoryFilter`].
fn filter_clause(filter: &HistoryFilter) -> Result<(String, Vec<Value>)> {
  let mut conds = vec!["entity = ?"];
  let mut values: Vec<Value> = vec![filter.entity.clone().into()];

  if let Some(iso) = &filter.isolation {
    conds.push("isolation = ?");
    values.push(encode_map(iso)?.into());
  }
  if let Some(after) = filter.created_after {
    conds.push("created_at >= ?");
    values.push(encode_dt(after).into());
  }
  if let Some(before) = filter.created_before {
    conds.push("created_at < ?");
    values.push(encode_dt(before).into());
  }
  if filter.ingested_only {
    conds.push("ingested = 1");
  }

  Ok((conds.join(" AND "), values))
}
