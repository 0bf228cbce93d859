//! [`TaggedMap`] — the typed open key/value map used for entry metadata and
//! isolation scopes.
//!
//! Values are restricted to booleans, integers, finite floats, and strings.
//! Keys are kept sorted, so the JSON form of a map is canonical: two equal
//! maps always serialise to the same string. Storage backends rely on this to
//! compare isolation scopes by plain string equality.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::{Result, ValidationError};

// ─── TagValue ────────────────────────────────────────────────────────────────

/// A single scalar value in a [`TaggedMap`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
  Bool(bool),
  Int(i64),
  Float(f64),
  Text(String),
}

impl TagValue {
  pub fn as_str(&self) -> Option<&str> {
    match self {
      Self::Text(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_i64(&self) -> Option<i64> {
    match self {
      Self::Int(i) => Some(*i),
      _ => None,
    }
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Self::Bool(b) => Some(*b),
      _ => None,
    }
  }
}

impl fmt::Display for TagValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Bool(b) => write!(f, "{b}"),
      Self::Int(i) => write!(f, "{i}"),
      Self::Float(x) => write!(f, "{x}"),
      Self::Text(s) => f.write_str(s),
    }
  }
}

impl From<bool> for TagValue {
  fn from(v: bool) -> Self { Self::Bool(v) }
}

impl From<i64> for TagValue {
  fn from(v: i64) -> Self { Self::Int(v) }
}

impl From<i32> for TagValue {
  fn from(v: i32) -> Self { Self::Int(v.into()) }
}

impl From<f64> for TagValue {
  fn from(v: f64) -> Self { Self::Float(v) }
}

impl From<&str> for TagValue {
  fn from(v: &str) -> Self { Self::Text(v.to_owned()) }
}

impl From<String> for TagValue {
  fn from(v: String) -> Self { Self::Text(v) }
}

// ─── TaggedMap ───────────────────────────────────────────────────────────────

/// An ordered string-keyed map of [`TagValue`]s. Empty by default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaggedMap(BTreeMap<String, TagValue>);

impl TaggedMap {
  pub fn new() -> Self { Self::default() }

  /// Builder-style insert.
  pub fn with(mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Self {
    self.insert(key, value);
    self
  }

  pub fn insert(
    &mut self,
    key: impl Into<String>,
    value: impl Into<TagValue>,
  ) -> Option<TagValue> {
    self.0.insert(key.into(), value.into())
  }

  pub fn get(&self, key: &str) -> Option<&TagValue> { self.0.get(key) }

  pub fn remove(&mut self, key: &str) -> Option<TagValue> { self.0.remove(key) }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &TagValue)> { self.0.iter() }

  /// `true` if every pair in `other` is also present, with an equal value, in
  /// `self`.
  pub fn contains(&self, other: &TaggedMap) -> bool {
    other.iter().all(|(k, v)| self.get(k) == Some(v))
  }

  /// Merge several maps, keeping only the keys on which every map that
  /// mentions them agrees. A key whose value differs between two inputs is
  /// dropped from the result entirely.
  pub fn merge_consistent<'a>(maps: impl IntoIterator<Item = &'a TaggedMap>) -> TaggedMap {
    let mut merged = BTreeMap::new();
    let mut conflicting = Vec::new();

    for map in maps {
      for (k, v) in map.iter() {
        match merged.get(k) {
          None => {
            merged.insert(k.clone(), v.clone());
          }
          Some(existing) if existing != v => conflicting.push(k.clone()),
          Some(_) => {}
        }
      }
    }

    for k in conflicting {
      merged.remove(&k);
    }
    TaggedMap(merged)
  }

  /// Reject floats that cannot survive a JSON round trip.
  pub fn validate(&self) -> Result<(), ValidationError> {
    for (k, v) in self.iter() {
      if let TagValue::Float(x) = v
        && !x.is_finite()
      {
        return Err(ValidationError::NonFiniteTag(k.clone()));
      }
    }
    Ok(())
  }

  /// Canonical JSON form (keys sorted, no whitespace).
  pub fn to_json(&self) -> Result<String> { Ok(serde_json::to_string(self)?) }

  pub fn from_json(s: &str) -> Result<Self> { Ok(serde_json::from_str(s)?) }
}

impl<K, V> FromIterator<(K, V)> for TaggedMap
where
  K: Into<String>,
  V: Into<TagValue>,
{
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
  }
}
