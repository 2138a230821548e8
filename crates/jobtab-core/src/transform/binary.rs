//! Binary codec: the whole value tree through bincode.

use crate::{
  Error, Result,
  transform::LogicalKind,
  value::{RawValue, Value},
};

pub(super) fn to_storage(value: &Value) -> Result<RawValue> {
  let bytes = bincode::serialize(value).map_err(|e| Error::Encode {
    kind:   LogicalKind::Binary,
    reason: e.to_string(),
  })?;
  Ok(RawValue::Blob(bytes))
}

pub(super) fn from_storage(raw: RawValue) -> Result<Value> {
  let RawValue::Blob(bytes) = raw else {
    return Err(Error::Decode {
      kind:   LogicalKind::Binary,
      reason: format!("expected a blob, found {}", raw.storage_class()),
    });
  };
  bincode::deserialize(&bytes)
    .map_err(|e| Error::Decode { kind: LogicalKind::Binary, reason: e.to_string() })
}
