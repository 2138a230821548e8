//! JSON codec. Lossy: tuples and sets become arrays and map keys become
//! strings.

use serde_json::{Map, Number, Value as Json};

use super::stored_text;
use crate::{
  Error, Result,
  transform::LogicalKind,
  value::{RawValue, Value, format_timestamp},
};

fn encode_err(reason: impl Into<String>) -> Error {
  Error::Encode { kind: LogicalKind::Json, reason: reason.into() }
}

pub(super) fn to_storage(value: &Value) -> Result<RawValue> {
  Ok(RawValue::Text(to_json(value)?.to_string()))
}

pub(super) fn from_storage(raw: RawValue) -> Result<Value> {
  let text = stored_text(LogicalKind::Json, raw)?;
  let json: Json = serde_json::from_str(&text).map_err(|e| Error::Decode {
    kind:   LogicalKind::Json,
    reason: e.to_string(),
  })?;
  Ok(from_json(json))
}

fn to_json(value: &Value) -> Result<Json> {
  Ok(match value {
    Value::Null => Json::Null,
    Value::Bool(b) => Json::Bool(*b),
    Value::Integer(i) => Json::Number((*i).into()),
    Value::Real(r) => Json::Number(
      Number::from_f64(*r).ok_or_else(|| encode_err(format!("{r} is not a JSON number")))?,
    ),
    Value::Text(s) => Json::String(s.clone()),
    Value::Timestamp(ts) => Json::String(format_timestamp(ts)),
    Value::Bytes(_) => return Err(encode_err("bytes have no JSON representation")),
    Value::List(items) | Value::Tuple(items) | Value::Set(items) => {
      Json::Array(items.iter().map(to_json).collect::<Result<_>>()?)
    }
    Value::Map(entries) => {
      let mut object = Map::with_capacity(entries.len());
      for (k, v) in entries {
        object.insert(key_string(k)?, to_json(v)?);
      }
      Json::Object(object)
    }
  })
}

fn key_string(key: &Value) -> Result<String> {
  match key {
    Value::Text(s) => Ok(s.clone()),
    Value::Integer(i) => Ok(i.to_string()),
    Value::Real(r) => Ok(r.to_string()),
    Value::Bool(b) => Ok(b.to_string()),
    Value::Null => Ok("null".to_owned()),
    other => Err(encode_err(format!("a {} cannot be a JSON object key", other.type_name()))),
  }
}

fn from_json(json: Json) -> Value {
  match json {
    Json::Null => Value::Null,
    Json::Bool(b) => Value::Bool(b),
    Json::Number(n) => match n.as_i64() {
      Some(i) => Value::Integer(i),
      None => Value::Real(n.as_f64().unwrap_or(f64::NAN)),
    },
    Json::String(s) => Value::Text(s),
    Json::Array(items) => Value::List(items.into_iter().map(from_json).collect()),
    Json::Object(object) => Value::Map(
      object
        .into_iter()
        .map(|(k, v)| (Value::Text(k), from_json(v)))
        .collect(),
    ),
  }
}
