//! Citations — provenance edges from a derived profile entry to the history
//! entries that justify it.
//!
//! The graph is many-to-many with at most one edge per pair. Edges are never
//! updated; they disappear only when either endpoint is deleted.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{history::HistoryId, profile::ProfileId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Citation {
  pub profile_id: ProfileId,
  pub history_id: HistoryId,
}

/// Which side(s) of a proposed citation edge do not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingEndpoint {
  Profile,
  History,
  Both,
}

impl MissingEndpoint {
  /// `None` when both endpoints exist.
  pub fn from_presence(profile_exists: bool, history_exists: bool) -> Option<Self> {
    match (profile_exists, history_exists) {
      (true, true) => None,
      (false, true) => Some(Self::Profile),
      (true, false) => Some(Self::History),
      (false, false) => Some(Self::Both),
    }
  }
}

impl fmt::Display for MissingEndpoint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Profile => "profile entry",
      Self::History => "history entry",
      Self::Both => "profile and history entries",
    })
  }
}

/// A record targeted by id; the payload of not-found errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RecordRef {
  Profile(ProfileId),
  History(HistoryId),
}

impl fmt::Display for RecordRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Profile(id) => write!(f, "profile entry {id}"),
      Self::History(id) => write!(f, "history entry {id}"),
    }
  }
}
