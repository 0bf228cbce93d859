//! Profile-store operations over a plain [`rusqlite::Connection`].

use std::collections::HashMap;

use lore_core::{
  citation::RecordRef,
  index::VectorIndex,
  profile::{NewProfileEntry, ProfileEntry, ProfileId, ScoredProfileEntry, SimilarityQuery, WriteMode},
  scope::Scope,
  tagged::TaggedMap,
};
use rusqlite::{Connection, OptionalExtension as _, params_from_iter, types::Value};
use tracing::debug;

use crate::{
  Error, Result, citation, tx,
  encode::{PROFILE_COLUMNS, RawProfile, decode_dt, encode_dt, encode_embedding, encode_map, now},
};

/// Insert or update one entry and link its citations, all in one
/// transaction.
pub fn upsert(
  conn: &mut Connection,
  dim: usize,
  input: NewProfileEntry,
  mode: WriteMode,
) -> Result<ProfileEntry> {
  input.validate(dim)?;

  let metadata = encode_map(&input.metadata)?;
  let isolation = encode_map(&input.isolation)?;
  let embedding = encode_embedding(&input.embedding);

  let tx = tx::immediate(conn, "writing profile entry")?;

  let existing: Option<(i64, String)> = match mode {
    WriteMode::Insert => None,
    WriteMode::InsertOrUpdate => tx
      .query_row(
        "SELECT id, created_at FROM profile_entries
         WHERE entity = ?1 AND tag = ?2 AND feature = ?3 AND isolation = ?4
         ORDER BY updated_at DESC, id DESC
         LIMIT 1",
        rusqlite::params![input.entity, input.tag, input.feature, isolation],
        |r| Ok((r.get(0)?, r.get(1)?)),
      )
      .optional()?,
  };

  let at = now();
  let id = match existing {
    Some((id, created_at)) => {
      let updated_at = at.max(decode_dt(&created_at)?);
      tx.execute(
        "UPDATE profile_entries
         SET value = ?1, embedding = ?2, metadata = ?3, updated_at = ?4
         WHERE id = ?5",
        rusqlite::params![input.value, embedding, metadata, encode_dt(updated_at), id],
      )?;
      debug!(id, feature = %input.feature, "updated profile entry");
      ProfileId(id)
    }
    None => {
      let at_str = encode_dt(at);
      tx.execute(
        "INSERT INTO profile_entries (
           entity, tag, feature, value, created_at, updated_at,
           embedding, metadata, isolation
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6, ?7, ?8)",
        rusqlite::params![
          input.entity,
          input.tag,
          input.feature,
          input.value,
          at_str,
          embedding,
          metadata,
          isolation,
        ],
      )?;
      let id = ProfileId(tx.last_insert_rowid());
      debug!(%id, feature = %input.feature, "inserted profile entry");
      id
    }
  };

  for history in &input.citations {
    citation::link_in(&tx, id, *history)?;
  }

  let entry = get(&tx, id)?;
  tx.commit()?;
  Ok(entry)
}

pub fn get(conn: &Connection, id: ProfileId) -> Result<ProfileEntry> {
  conn
    .query_row(
      &format!("SELECT {PROFILE_COLUMNS} FROM profile_entries WHERE id = ?1"),
      rusqlite::params![id.0],
      RawProfile::from_row,
    )
    .optional()?
    .ok_or(Error::NotFound(RecordRef::Profile(id)))?
    .into_entry()
}

/// Every entry of a scope, most recently updated first.
pub fn list_scope(conn: &Connection, scope: &Scope) -> Result<Vec<ProfileEntry>> {
  scope.validate()?;
  query_entries(
    conn,
    &format!(
      "SELECT {PROFILE_COLUMNS} FROM profile_entries
       WHERE entity = ?1 AND isolation = ?2
       ORDER BY updated_at DESC, id DESC"
    ),
    vec![scope.entity.clone().into(), encode_map(&scope.isolation)?.into()],
  )
}

pub fn list_by_tag(conn: &Connection, scope: &Scope, tag: &str) -> Result<Vec<ProfileEntry>> {
  scope.validate()?;
  query_entries(
    conn,
    &format!(
      "SELECT {PROFILE_COLUMNS} FROM profile_entries
       WHERE entity = ?1 AND isolation = ?2 AND tag = ?3
       ORDER BY id"
    ),
    vec![
      scope.entity.clone().into(),
      encode_map(&scope.isolation)?.into(),
      tag.to_owned().into(),
    ],
  )
}

/// Narrow to the scope in SQL, rank with `index`, then apply the threshold
/// and the updated-at tie-break.
pub fn search(
  conn: &Connection,
  dim: usize,
  index: &dyn VectorIndex,
  query: SimilarityQuery,
) -> Result<Vec<ScoredProfileEntry>> {
  query.validate(dim)?;

  let candidates = list_scope(conn, &query.scope)?;
  let ranked = {
    let refs: Vec<_> = candidates.iter().map(|e| (e.id, &e.embedding)).collect();
    index.nearest(&query.embedding, &refs, query.top_k)
  };

  let mut by_id: HashMap<ProfileId, ProfileEntry> =
    candidates.into_iter().map(|e| (e.id, e)).collect();

  let mut hits = Vec::with_capacity(ranked.len());
  for n in ranked {
    if query.min_similarity.is_some_and(|min| n.similarity < min) {
      continue;
    }
    let Some(entry) = by_id.remove(&n.id) else {
      continue;
    };
    let citations = if query.include_citations {
      Some(citation::for_profile(conn, entry.id)?)
    } else {
      None
    };
    hits.push(ScoredProfileEntry { entry, similarity: n.similarity, citations });
  }

  hits.sort_by(|a, b| {
    b.similarity
      .total_cmp(&a.similarity)
      .then_with(|| b.entry.updated_at.cmp(&a.entry.updated_at))
      .then_with(|| b.entry.id.cmp(&a.entry.id))
  });
  hits.truncate(query.top_k);
  Ok(hits)
}

pub fn delete_one(conn: &Connection, id: ProfileId) -> Result<()> {
  let removed = conn.execute("DELETE FROM profile_entries WHERE id = ?1", rusqlite::params![id.0])?;
  if removed == 0 {
    return Err(Error::NotFound(RecordRef::Profile(id)));
  }
  debug!(%id, "deleted profile entry");
  Ok(())
}

pub fn delete_by_entity(
  conn: &Connection,
  entity: &str,
  isolation: Option<&TaggedMap>,
) -> Result<u64> {
  let removed = match isolation {
    Some(iso) => conn.execute(
      "DELETE FROM profile_entries WHERE entity = ?1 AND isolation = ?2",
      rusqlite::params![entity, encode_map(iso)?],
    )?,
    None => conn.execute(
      "DELETE FROM profile_entries WHERE entity = ?1",
      rusqlite::params![entity],
    )?,
  };
  debug!(entity, removed, "deleted profile entries for entity");
  Ok(removed as u64)
}

pub fn delete_feature(
  conn: &Connection,
  scope: &Scope,
  tag: &str,
  feature: &str,
  value: Option<&str>,
) -> Result<u64> {
  scope.validate()?;
  let mut sql = String::from(
    "DELETE FROM profile_entries
     WHERE entity = ?1 AND isolation = ?2 AND tag = ?3 AND feature = ?4",
  );
  let mut values: Vec<Value> = vec![
    scope.entity.clone().into(),
    encode_map(&scope.isolation)?.into(),
    tag.to_owned().into(),
    feature.to_owned().into(),
  ];
  if let Some(v) = value {
    sql.push_str(" AND value = ?5");
    values.push(v.to_owned().into());
  }
  let removed = conn.execute(&sql, params_from_iter(values.iter()))?;
  Ok(removed as u64)
}

fn query_entries(conn: &Connection, sql: &str, values: Vec<Value>) -> Result<Vec<ProfileEntry>> {
  let mut stmt = conn.prepare(sql)?;
  let raws = stmt
    .query_map(params_from_iter(values.iter()), RawProfile::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawProfile::into_entry).collect()
}
