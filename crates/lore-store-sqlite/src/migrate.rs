//! Migration runner and ledger operations.
//!
//! Each migration runs inside its own `BEGIN IMMEDIATE` transaction together
//! with the insert of its ledger row, so a migration either lands completely
//! (schema change + record) or not at all. The immediate lock also serialises
//! concurrent startups: the loser blocks for the busy timeout, then re-reads
//! the ledger inside the lock and skips what the winner applied.

use std::collections::HashSet;

use lore_core::migration::{MigrationRecord, MigrationStatus};
use rusqlite::{Connection, OptionalExtension as _};
use tracing::{debug, info};

use crate::{
  Error, Result,
  encode::{decode_dt, encode_dt, now},
  schema::{LEDGER, Migration},
  tx,
};

/// Apply every pending migration in `migrations`, returning the versions that
/// were applied by this call.
pub fn run(conn: &mut Connection, migrations: &[Migration]) -> Result<Vec<&'static str>> {
  check_order(migrations)?;
  conn.execute_batch(LEDGER)?;
  check_unknown(conn, migrations)?;

  let mut applied = Vec::new();
  for m in migrations {
    if apply_one(conn, m)? {
      applied.push(m.version);
    }
  }
  Ok(applied)
}

/// Apply one migration. Returns `false` if it was already recorded.
fn apply_one(conn: &mut Connection, m: &Migration) -> Result<bool> {
  let checksum = m.checksum();
  let tx = tx::immediate(conn, &format!("applying migration {}", m.version))?;

  match recorded_checksum(&tx, m.version)? {
    Some(existing) if existing == checksum => {
      debug!(version = m.version, "migration already applied");
      return Ok(false);
    }
    Some(_) => {
      return Err(Error::DuplicateVersion { version: m.version.to_owned() });
    }
    None => {}
  }

  tx.execute_batch(m.sql)?;
  insert_record(&tx, m.version, &checksum)?;
  tx.commit()?;

  info!(version = m.version, "applied migration");
  Ok(true)
}

fn check_order(migrations: &[Migration]) -> Result<()> {
  for w in migrations.windows(2) {
    if w[0].version >= w[1].version {
      return Err(Error::MigrationOrder {
        earlier: w[0].version.to_owned(),
        later:   w[1].version.to_owned(),
      });
    }
  }
  Ok(())
}

/// Fail if the database records a version this build has never heard of.
fn check_unknown(conn: &Connection, migrations: &[Migration]) -> Result<()> {
  let known: HashSet<&str> = migrations.iter().map(|m| m.version).collect();
  for record in applied(conn)? {
    if !known.contains(record.version.as_str()) {
      return Err(Error::UnknownVersion(record.version));
    }
  }
  Ok(())
}

fn recorded_checksum(conn: &Connection, version: &str) -> Result<Option<String>> {
  Ok(
    conn
      .query_row(
        "SELECT checksum FROM schema_migrations WHERE version = ?1",
        rusqlite::params![version],
        |r| r.get(0),
      )
      .optional()?,
  )
}

fn insert_record(conn: &Connection, version: &str, checksum: &str) -> Result<()> {
  conn.execute(
    "INSERT INTO schema_migrations (version, checksum, applied_at) VALUES (?1, ?2, ?3)",
    rusqlite::params![version, checksum, encode_dt(now())],
  )?;
  Ok(())
}

// ─── Ledger ──────────────────────────────────────────────────────────────────

pub fn is_applied(conn: &Connection, version: &str) -> Result<bool> {
  Ok(recorded_checksum(conn, version)?.is_some())
}

/// Record a version without running anything. Same checksum again is a
/// no-op; a different checksum is [`Error::DuplicateVersion`].
pub fn record_applied(conn: &mut Connection, version: &str, checksum: &str) -> Result<()> {
  let tx = tx::immediate(conn, &format!("recording migration {version}"))?;

  match recorded_checksum(&tx, version)? {
    Some(existing) if existing == checksum => return Ok(()),
    Some(_) => return Err(Error::DuplicateVersion { version: version.to_owned() }),
    None => insert_record(&tx, version, checksum)?,
  }
  tx.commit()?;
  Ok(())
}

pub fn applied(conn: &Connection) -> Result<Vec<MigrationRecord>> {
  let mut stmt = conn
    .prepare("SELECT version, checksum, applied_at FROM schema_migrations ORDER BY version")?;
  let rows = stmt
    .query_map([], |r| {
      Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  rows
    .into_iter()
    .map(|(version, checksum, at)| {
      Ok(MigrationRecord { version, checksum, applied_at: decode_dt(&at)? })
    })
    .collect()
}

/// Applied/pending state of every migration in `migrations`.
pub fn status(conn: &Connection, migrations: &[Migration]) -> Result<Vec<MigrationStatus>> {
  let records = applied(conn)?;
  Ok(
    migrations
      .iter()
      .map(|m| MigrationStatus {
        version:    m.version.to_owned(),
        checksum:   m.checksum(),
        applied_at: records
          .iter()
          .find(|r| r.version == m.version)
          .map(|r| r.applied_at),
      })
      .collect(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::schema::MIGRATIONS;

  fn conn() -> Connection { Connection::open_in_memory().unwrap() }

  fn table_exists(conn: &Connection, name: &str) -> bool {
    conn
      .query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        rusqlite::params![name],
        |_| Ok(()),
      )
      .optional()
      .unwrap()
      .is_some()
  }

  #[test]
  fn fresh_database_applies_everything_once() {
    let mut c = conn();
    let first = run(&mut c, MIGRATIONS).unwrap();
    assert_eq!(first.len(), MIGRATIONS.len());

    let second = run(&mut c, MIGRATIONS).unwrap();
    assert!(second.is_empty());
    assert_eq!(applied(&c).unwrap().len(), MIGRATIONS.len());
  }

  #[test]
  fn failed_migration_records_nothing_and_rolls_back() {
    let broken = [
      Migration { version: "0001_ok", sql: "CREATE TABLE t_ok (x INTEGER);" },
      Migration {
        version: "0002_broken",
        sql:     "CREATE TABLE t_half (x INTEGER); CREATE TABLOID nope;",
      },
    ];
    let mut c = conn();

    assert!(run(&mut c, &broken).is_err());
    assert!(is_applied(&c, "0001_ok").unwrap());
    assert!(!is_applied(&c, "0002_broken").unwrap());
    assert!(table_exists(&c, "t_ok"));
    assert!(!table_exists(&c, "t_half"));

    // The next startup retries the failed version and fails loudly again.
    assert!(run(&mut c, &broken).is_err());
    assert!(!is_applied(&c, "0002_broken").unwrap());
  }

  #[test]
  fn edited_migration_is_a_duplicate_version() {
    let mut c = conn();
    run(&mut c, &[Migration { version: "0001_a", sql: "CREATE TABLE a (x);" }]).unwrap();

    let err = run(&mut c, &[Migration { version: "0001_a", sql: "CREATE TABLE a (y);" }])
      .unwrap_err();
    assert!(matches!(err, Error::DuplicateVersion { ref version } if version == "0001_a"));
  }

  #[test]
  fn unknown_recorded_version_fails_loudly() {
    let mut c = conn();
    run(&mut c, MIGRATIONS).unwrap();
    record_applied(&mut c, "9999_future", "sha256:00").unwrap();

    let err = run(&mut c, MIGRATIONS).unwrap_err();
    assert!(matches!(err, Error::UnknownVersion(ref v) if v == "9999_future"));
  }

  #[test]
  fn misordered_list_is_rejected_before_touching_the_database() {
    let list = [
      Migration { version: "0002_b", sql: "CREATE TABLE b (x);" },
      Migration { version: "0001_a", sql: "CREATE TABLE a (x);" },
    ];
    let mut c = conn();
    assert!(matches!(run(&mut c, &list), Err(Error::MigrationOrder { .. })));
    assert!(!table_exists(&c, "schema_migrations"));
  }

  #[test]
  fn record_applied_twice_keeps_one_row() {
    let mut c = conn();
    c.execute_batch(LEDGER).unwrap();

    record_applied(&mut c, "v1", "sha256:aa").unwrap();
    assert!(is_applied(&c, "v1").unwrap());
    record_applied(&mut c, "v1", "sha256:aa").unwrap();
    assert!(is_applied(&c, "v1").unwrap());

    let count: i64 = c
      .query_row("SELECT COUNT(*) FROM schema_migrations WHERE version = 'v1'", [], |r| r.get(0))
      .unwrap();
    assert_eq!(count, 1);

    let err = record_applied(&mut c, "v1", "sha256:bb").unwrap_err();
    assert!(matches!(err, Error::DuplicateVersion { .. }));
  }

  #[test]
  fn status_reports_pending_versions() {
    let mut c = conn();
    run(&mut c, &MIGRATIONS[..1]).unwrap();

    let status = status(&c, MIGRATIONS).unwrap();
    assert!(status[0].is_applied());
    assert!(status[1..].iter().all(|s| !s.is_applied()));
  }
}
