//! YAML codec. Structures without a native YAML form are carried as local
//! tags: `!tuple` (sequence), `!set` (mapping to nulls), `!binary` (base64)
//! and `!timestamp`. Maps and sets keyed by anything but a plain scalar are
//! written as sequences (`!map` of `[key, value]` pairs, `!set` of members)
//! since the emitter cannot start a mapping with a tagged or nested key.

use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use serde_yaml::{
  Mapping, Number, Value as Yaml,
  value::{Tag, TaggedValue},
};

use super::stored_text;
use crate::{
  Error, Result,
  transform::LogicalKind,
  value::{RawValue, Value, format_timestamp, parse_timestamp},
};

const TUPLE: &str = "tuple";
const SET: &str = "set";
const BINARY: &str = "binary";
const TIMESTAMP: &str = "timestamp";
const MAP: &str = "map";

fn decode_err(reason: impl Into<String>) -> Error {
  Error::Decode { kind: LogicalKind::Yaml, reason: reason.into() }
}

pub(super) fn to_storage(value: &Value) -> Result<RawValue> {
  let text = serde_yaml::to_string(&to_yaml(value)).map_err(|e| Error::Encode {
    kind:   LogicalKind::Yaml,
    reason: e.to_string(),
  })?;
  Ok(RawValue::Text(text))
}

pub(super) fn from_storage(raw: RawValue) -> Result<Value> {
  let text = stored_text(LogicalKind::Yaml, raw)?;
  let yaml: Yaml = serde_yaml::from_str(&text).map_err(|e| decode_err(e.to_string()))?;
  from_yaml(yaml)
}

fn tagged(tag: &str, value: Yaml) -> Yaml {
  Yaml::Tagged(Box::new(TaggedValue { tag: Tag::new(tag), value }))
}

fn to_yaml(value: &Value) -> Yaml {
  match value {
    Value::Null => Yaml::Null,
    Value::Bool(b) => Yaml::Bool(*b),
    Value::Integer(i) => Yaml::Number(Number::from(*i)),
    Value::Real(r) => Yaml::Number(Number::from(*r)),
    Value::Text(s) => Yaml::String(s.clone()),
    Value::Bytes(b) => tagged(BINARY, Yaml::String(B64.encode(b))),
    Value::Timestamp(ts) => tagged(TIMESTAMP, Yaml::String(format_timestamp(ts))),
    Value::List(items) => Yaml::Sequence(items.iter().map(to_yaml).collect()),
    Value::Tuple(items) => tagged(TUPLE, Yaml::Sequence(items.iter().map(to_yaml).collect())),
    Value::Set(items) if !items.iter().all(is_plain_key) => {
      tagged(SET, Yaml::Sequence(items.iter().map(to_yaml).collect()))
    }
    Value::Set(items) => {
      let mut members = Mapping::new();
      for item in items {
        members.insert(to_yaml(item), Yaml::Null);
      }
      tagged(SET, Yaml::Mapping(members))
    }
    Value::Map(entries) if !entries.iter().all(|(k, _)| is_plain_key(k)) => tagged(
      MAP,
      Yaml::Sequence(
        entries
          .iter()
          .map(|(k, v)| Yaml::Sequence(vec![to_yaml(k), to_yaml(v)]))
          .collect(),
      ),
    ),
    Value::Map(entries) => {
      let mut mapping = Mapping::new();
      for (k, v) in entries {
        mapping.insert(to_yaml(k), to_yaml(v));
      }
      Yaml::Mapping(mapping)
    }
  }
}

fn is_plain_key(key: &Value) -> bool {
  matches!(
    key,
    Value::Null | Value::Bool(_) | Value::Integer(_) | Value::Real(_) | Value::Text(_)
  )
}

fn from_yaml(yaml: Yaml) -> Result<Value> {
  Ok(match yaml {
    Yaml::Null => Value::Null,
    Yaml::Bool(b) => Value::Bool(b),
    Yaml::Number(n) => match n.as_i64() {
      Some(i) => Value::Integer(i),
      None => Value::Real(n.as_f64().unwrap_or(f64::NAN)),
    },
    Yaml::String(s) => Value::Text(s),
    Yaml::Sequence(items) => Value::List(from_items(items)?),
    Yaml::Mapping(mapping) => Value::Map(
      mapping
        .into_iter()
        .map(|(k, v)| Ok((from_yaml(k)?, from_yaml(v)?)))
        .collect::<Result<_>>()?,
    ),
    Yaml::Tagged(tagged) => from_tagged(*tagged)?,
  })
}

fn from_items(items: Vec<Yaml>) -> Result<Vec<Value>> { items.into_iter().map(from_yaml).collect() }

fn from_tagged(TaggedValue { tag, value }: TaggedValue) -> Result<Value> {
  let name = tag.to_string();
  match (name.trim_start_matches('!'), value) {
    (TUPLE, Yaml::Sequence(items)) => Ok(Value::Tuple(from_items(items)?)),
    (SET, Yaml::Mapping(members)) => Ok(Value::Set(
      members
        .into_iter()
        .map(|(k, _)| from_yaml(k))
        .collect::<Result<_>>()?,
    )),
    (SET, Yaml::Sequence(items)) => Ok(Value::set(from_items(items)?)),
    (MAP, Yaml::Sequence(pairs)) => pairs
      .into_iter()
      .map(|pair| match pair {
        Yaml::Sequence(kv) if kv.len() == 2 => {
          let mut kv = kv.into_iter();
          match (kv.next(), kv.next()) {
            (Some(k), Some(v)) => Ok((from_yaml(k)?, from_yaml(v)?)),
            _ => Err(decode_err("!map entry is not a [key, value] pair")),
          }
        }
        _ => Err(decode_err("!map entry is not a [key, value] pair")),
      })
      .collect::<Result<_>>()
      .map(Value::Map),
    (BINARY, Yaml::String(encoded)) => {
      let bytes = B64
        .decode(encoded.split_whitespace().collect::<String>())
        .map_err(|e| decode_err(e.to_string()))?;
      Ok(Value::Bytes(bytes))
    }
    (TIMESTAMP, Yaml::String(text)) => parse_timestamp(&text)
      .map(Value::Timestamp)
      .ok_or_else(|| decode_err(format!("bad timestamp {text:?}"))),
    (other, _) => Err(decode_err(format!("unsupported tag !{other}"))),
  }
}
