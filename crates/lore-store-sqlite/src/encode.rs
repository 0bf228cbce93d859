//! Encoding and decoding helpers between Rust domain types and the plain
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 UTC strings with a fixed microsecond
//! width, so lexical order in SQL equals chronological order. Embeddings are
//! little-endian `f32` blobs. Tagged maps are canonical JSON.

use chrono::{DateTime, SecondsFormat, SubsecRound as _, Utc};
use lore_core::{
  embedding::Embedding,
  history::{HistoryEntry, HistoryId},
  profile::{ProfileEntry, ProfileId},
  tagged::TaggedMap,
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

/// The current time, truncated to the precision the store keeps.
pub fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Embedding ───────────────────────────────────────────────────────────────

pub fn encode_embedding(e: &Embedding) -> Vec<u8> {
  let mut bytes = Vec::with_capacity(e.dim() * 4);
  for x in e.as_slice() {
    bytes.extend_from_slice(&x.to_le_bytes());
  }
  bytes
}

pub fn decode_embedding(bytes: &[u8]) -> Result<Embedding> {
  if bytes.len() % 4 != 0 {
    return Err(Error::Decode {
      column: "embedding",
      reason: format!("{} bytes is not a whole number of f32s", bytes.len()),
    });
  }
  Ok(Embedding::new(
    bytes
      .chunks_exact(4)
      .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
      .collect(),
  ))
}

// ─── TaggedMap ───────────────────────────────────────────────────────────────

pub fn encode_map(map: &TaggedMap) -> Result<String> { Ok(map.to_json()?) }

pub fn decode_map(s: &str) -> Result<TaggedMap> { Ok(TaggedMap::from_json(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawHistory::from_row`].
pub const HISTORY_COLUMNS: &str = "id, entity, ingested, content, created_at, metadata, isolation";

/// Raw values read directly from a `history_entries` row.
pub struct RawHistory {
  pub id:         i64,
  pub entity:     String,
  pub ingested:   bool,
  pub content:    String,
  pub created_at: String,
  pub metadata:   String,
  pub isolation:  String,
}

impl RawHistory {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:         row.get(0)?,
      entity:     row.get(1)?,
      ingested:   row.get(2)?,
      content:    row.get(3)?,
      created_at: row.get(4)?,
      metadata:   row.get(5)?,
      isolation:  row.get(6)?,
    })
  }

  pub fn into_entry(self) -> Result<HistoryEntry> {
    Ok(HistoryEntry {
      id:         HistoryId(self.id),
      entity:     self.entity,
      ingested:   self.ingested,
      content:    self.content,
      created_at: decode_dt(&self.created_at)?,
      metadata:   decode_map(&self.metadata)?,
      isolation:  decode_map(&self.isolation)?,
    })
  }
}

/// Column list matching [`RawProfile::from_row`].
pub const PROFILE_COLUMNS: &str =
  "id, entity, tag, feature, value, created_at, updated_at, embedding, metadata, isolation";

/// Raw values read directly from a `profile_entries` row.
pub struct RawProfile {
  pub id:         i64,
  pub entity:     String,
  pub tag:        String,
  pub feature:    String,
  pub value:      String,
  pub created_at: String,
  pub updated_at: String,
  pub embedding:  Vec<u8>,
  pub metadata:   String,
  pub isolation:  String,
}

impl RawProfile {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:         row.get(0)?,
      entity:     row.get(1)?,
      tag:        row.get(2)?,
      feature:    row.get(3)?,
      value:      row.get(4)?,
      created_at: row.get(5)?,
      updated_at: row.get(6)?,
      embedding:  row.get(7)?,
      metadata:   row.get(8)?,
      isolation:  row.get(9)?,
    })
  }

  pub fn into_entry(self) -> Result<ProfileEntry> {
    Ok(ProfileEntry {
      id:         ProfileId(self.id),
      entity:     self.entity,
      tag:        self.tag,
      feature:    self.feature,
      value:      self.value,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
      embedding:  decode_embedding(&self.embedding)?,
      metadata:   decode_map(&self.metadata)?,
      isolation:  decode_map(&self.isolation)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_sort_lexically() {
    let a = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let b = a + chrono::Duration::microseconds(1500);
    let c = a + chrono::Duration::seconds(1);
    let (ea, eb, ec) = (encode_dt(a), encode_dt(b), encode_dt(c));

    assert_eq!(ea.len(), eb.len());
    assert!(ea < eb && eb < ec);
    assert_eq!(decode_dt(&eb).unwrap(), b);
  }

  #[test]
  fn embedding_bytes_roundtrip() {
    let e = Embedding::from(vec![0.25_f32, -1.5, 3.0]);
    let bytes = encode_embedding(&e);
    assert_eq!(bytes.len(), 12);
    assert_eq!(decode_embedding(&bytes).unwrap(), e);
  }

  #[test]
  fn truncated_embedding_blob_is_corrupt() {
    assert!(matches!(
      decode_embedding(&[0, 0, 0]),
      Err(Error::Decode { column: "embedding", .. })
    ));
  }
}
