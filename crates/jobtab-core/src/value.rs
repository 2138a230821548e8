//! Application values and their storable primitive form.
//!
//! [`Value`] is what callers read from and write to a job handle. It is
//! dynamically typed because one row mixes timestamps, scalars and arbitrary
//! structured payloads. [`RawValue`] is what actually sits in a column and
//! mirrors the SQLite storage classes.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Row key of a job. Schedulers hand out numeric ids.
pub type JobId = i64;

/// Text layout used when a timestamp is stored without a serializing
/// transformer. Matches what SQLite date functions accept.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

// ─── Value ───────────────────────────────────────────────────────────────────

/// A decoded, application-level value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
  Null,
  Bool(bool),
  Integer(i64),
  Real(f64),
  Text(String),
  Bytes(Vec<u8>),
  Timestamp(NaiveDateTime),
  List(Vec<Value>),
  /// Fixed-size sequence; only the yaml and binary transformers keep it
  /// apart from a list.
  Tuple(Vec<Value>),
  /// Unordered collection without duplicates, kept in insertion order.
  Set(Vec<Value>),
  /// Key/value pairs. Keys may be any value, not only text.
  Map(Vec<(Value, Value)>),
}

impl Value {
  pub fn tuple<I, T>(items: I) -> Self
  where
    I: IntoIterator<Item = T>,
    T: Into<Value>,
  {
    Self::Tuple(items.into_iter().map(Into::into).collect())
  }

  /// Build a set, dropping repeated members.
  pub fn set<I, T>(items: I) -> Self
  where
    I: IntoIterator<Item = T>,
    T: Into<Value>,
  {
    let mut members: Vec<Value> = Vec::new();
    for item in items {
      let item = item.into();
      if !members.contains(&item) {
        members.push(item);
      }
    }
    Self::Set(members)
  }

  pub fn map<I, K, V>(entries: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<Value>,
    V: Into<Value>,
  {
    Self::Map(
      entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect(),
    )
  }

  pub fn is_null(&self) -> bool { matches!(self, Self::Null) }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Self::Bool(b) => Some(*b),
      Self::Integer(i) => Some(*i != 0),
      _ => None,
    }
  }

  pub fn as_i64(&self) -> Option<i64> {
    match self {
      Self::Integer(i) => Some(*i),
      Self::Bool(b) => Some(i64::from(*b)),
      _ => None,
    }
  }

  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Self::Real(f) => Some(*f),
      Self::Integer(i) => Some(*i as f64),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Self::Text(s) => Some(s),
      _ => None,
    }
  }

  /// Interpret the value as a timestamp. Text in the stored timestamp
  /// layout (or ISO 8601 with a `T` separator, or a bare date) is parsed,
  /// so timestamps read back through the identity transformer still work.
  pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
    match self {
      Self::Timestamp(ts) => Some(*ts),
      Self::Text(s) => parse_timestamp(s),
      _ => None,
    }
  }

  /// Members of a list, tuple or set.
  pub fn as_slice(&self) -> Option<&[Value]> {
    match self {
      Self::List(items) | Self::Tuple(items) | Self::Set(items) => Some(items),
      _ => None,
    }
  }

  /// Mutable access to the members of a list, tuple or set.
  pub fn as_vec_mut(&mut self) -> Option<&mut Vec<Value>> {
    match self {
      Self::List(items) | Self::Tuple(items) | Self::Set(items) => Some(items),
      _ => None,
    }
  }

  /// Look up `key` in a map.
  pub fn get(&self, key: &Value) -> Option<&Value> {
    match self {
      Self::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
      _ => None,
    }
  }

  /// Insert or replace `key` in a map. Returns `false` if `self` is not a
  /// map.
  pub fn insert(&mut self, key: impl Into<Value>, value: impl Into<Value>) -> bool {
    let Self::Map(entries) = self else {
      return false;
    };
    let key = key.into();
    let value = value.into();
    match entries.iter_mut().find(|(k, _)| *k == key) {
      Some((_, slot)) => *slot = value,
      None => entries.push((key, value)),
    }
    true
  }

  pub fn type_name(&self) -> &'static str {
    match self {
      Self::Null => "null",
      Self::Bool(_) => "bool",
      Self::Integer(_) => "integer",
      Self::Real(_) => "real",
      Self::Text(_) => "text",
      Self::Bytes(_) => "bytes",
      Self::Timestamp(_) => "timestamp",
      Self::List(_) => "list",
      Self::Tuple(_) => "tuple",
      Self::Set(_) => "set",
      Self::Map(_) => "map",
    }
  }

  fn fmt_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Text(s) => write!(f, "{s:?}"),
      Self::Timestamp(ts) => write!(f, "{:?}", format_timestamp(ts)),
      other => fmt::Display::fmt(other, f),
    }
  }
}

fn fmt_items(
  f: &mut fmt::Formatter<'_>,
  open: &str,
  items: &[Value],
  close: &str,
) -> fmt::Result {
  f.write_str(open)?;
  for (i, item) in items.iter().enumerate() {
    if i > 0 {
      f.write_str(", ")?;
    }
    item.fmt_nested(f)?;
  }
  f.write_str(close)
}

/// Renders top-level text verbatim and nested text quoted, so printing a
/// field behaves well in shell pipelines.
impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Null => f.write_str("null"),
      Self::Bool(b) => write!(f, "{b}"),
      Self::Integer(i) => write!(f, "{i}"),
      Self::Real(r) => write!(f, "{r:?}"),
      Self::Text(s) => f.write_str(s),
      Self::Bytes(b) => {
        f.write_str("b'")?;
        for byte in b {
          write!(f, "{}", std::ascii::escape_default(*byte))?;
        }
        f.write_str("'")
      }
      Self::Timestamp(ts) => f.write_str(&format_timestamp(ts)),
      Self::List(items) => fmt_items(f, "[", items, "]"),
      Self::Tuple(items) if items.len() == 1 => fmt_items(f, "(", items, ",)"),
      Self::Tuple(items) => fmt_items(f, "(", items, ")"),
      Self::Set(items) if items.is_empty() => f.write_str("set()"),
      Self::Set(items) => fmt_items(f, "{", items, "}"),
      Self::Map(entries) => {
        f.write_str("{")?;
        for (i, (k, v)) in entries.iter().enumerate() {
          if i > 0 {
            f.write_str(", ")?;
          }
          k.fmt_nested(f)?;
          f.write_str(": ")?;
          v.fmt_nested(f)?;
        }
        f.write_str("}")
      }
    }
  }
}

impl From<bool> for Value {
  fn from(b: bool) -> Self { Self::Bool(b) }
}

impl From<i32> for Value {
  fn from(i: i32) -> Self { Self::Integer(i.into()) }
}

impl From<i64> for Value {
  fn from(i: i64) -> Self { Self::Integer(i) }
}

impl From<f64> for Value {
  fn from(f: f64) -> Self { Self::Real(f) }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self { Self::Text(s.to_owned()) }
}

impl From<String> for Value {
  fn from(s: String) -> Self { Self::Text(s) }
}

impl From<NaiveDateTime> for Value {
  fn from(ts: NaiveDateTime) -> Self { Self::Timestamp(ts) }
}

impl From<Vec<Value>> for Value {
  fn from(items: Vec<Value>) -> Self { Self::List(items) }
}

impl<T: Into<Value>> From<Option<T>> for Value {
  fn from(opt: Option<T>) -> Self { opt.map_or(Self::Null, Into::into) }
}

impl<T: Into<Value>> FromIterator<T> for Value {
  fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
    Self::List(iter.into_iter().map(Into::into).collect())
  }
}

// ─── RawValue ────────────────────────────────────────────────────────────────

/// A primitive as held by a table column.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
  Null,
  Integer(i64),
  Real(f64),
  Text(String),
  Blob(Vec<u8>),
}

impl RawValue {
  pub fn is_null(&self) -> bool { matches!(self, Self::Null) }

  pub fn storage_class(&self) -> &'static str {
    match self {
      Self::Null => "null",
      Self::Integer(_) => "integer",
      Self::Real(_) => "real",
      Self::Text(_) => "text",
      Self::Blob(_) => "blob",
    }
  }
}

impl fmt::Display for RawValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Null => f.write_str("null"),
      Self::Integer(i) => write!(f, "{i}"),
      Self::Real(r) => write!(f, "{r:?}"),
      Self::Text(s) => f.write_str(s),
      Self::Blob(b) => write!(f, "<{} bytes>", b.len()),
    }
  }
}

impl From<i64> for RawValue {
  fn from(i: i64) -> Self { Self::Integer(i) }
}

impl From<f64> for RawValue {
  fn from(f: f64) -> Self { Self::Real(f) }
}

impl From<&str> for RawValue {
  fn from(s: &str) -> Self { Self::Text(s.to_owned()) }
}

impl From<String> for RawValue {
  fn from(s: String) -> Self { Self::Text(s) }
}

impl From<Vec<u8>> for RawValue {
  fn from(b: Vec<u8>) -> Self { Self::Blob(b) }
}

// ─── Timestamps ──────────────────────────────────────────────────────────────

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
  ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
  let s = s.trim();
  NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
    .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
    .ok()
    .or_else(|| {
      NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    })
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;

  fn sample_ts() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 9)
      .unwrap()
      .and_hms_micro_opt(14, 5, 7, 250_000)
      .unwrap()
  }

  #[test]
  fn set_drops_duplicates() {
    let set = Value::set([4, 5, 4, 6, 5]);
    assert_eq!(set, Value::Set(vec![4.into(), 5.into(), 6.into()]));
  }

  #[test]
  fn timestamp_text_parses_back() {
    let ts = sample_ts();
    let text = format_timestamp(&ts);
    assert_eq!(text, "2024-03-09 14:05:07.250");
    assert_eq!(Value::Text(text).as_timestamp(), Some(ts));
  }

  #[test]
  fn timestamp_parse_accepts_iso_and_dates() {
    assert_eq!(
      parse_timestamp("2024-03-09T14:05:07"),
      NaiveDate::from_ymd_opt(2024, 3, 9).unwrap().and_hms_opt(14, 5, 7),
    );
    assert_eq!(
      parse_timestamp("2024-03-09"),
      NaiveDate::from_ymd_opt(2024, 3, 9).unwrap().and_hms_opt(0, 0, 0),
    );
    assert_eq!(parse_timestamp("yesterday"), None);
  }

  #[test]
  fn map_insert_replaces_existing_key() {
    let mut map = Value::map([(7, "8")]);
    assert!(map.insert(7, "seven"));
    assert!(map.insert("k", 1));
    assert_eq!(map.get(&7.into()), Some(&Value::from("seven")));
    assert_eq!(map.get(&"k".into()), Some(&Value::Integer(1)));
    assert!(!Value::Null.insert(1, 2));
  }

  #[test]
  fn display_renders_nested_structures() {
    let v = Value::tuple([
      Value::from(1),
      Value::from(vec![Value::from(2), Value::from("two")]),
      Value::set([4]),
      Value::map([(7, "8")]),
    ]);
    assert_eq!(v.to_string(), r#"(1, [2, "two"], {4}, {7: "8"})"#);
    assert_eq!(Value::tuple([1]).to_string(), "(1,)");
    assert_eq!(Value::Set(vec![]).to_string(), "set()");
    assert_eq!(Value::from("plain").to_string(), "plain");
  }
}
