//! Transformer registry: codecs between [`Value`] and [`RawValue`].
//!
//! Every field carries a logical kind that names how its values are
//! serialized for storage. The kind is resolved once into a [`Transformer`],
//! a stateless codec. Decoding assumes the stored bytes were produced by the
//! same kind; nothing sniffs the payload.

mod json;

#[cfg(feature = "binary")]
mod binary;
#[cfg(feature = "yaml")]
mod yaml;

use std::{fmt, str::FromStr};

use crate::{
  Error, Result,
  value::{RawValue, Value, format_timestamp},
};

// ─── Logical kinds ───────────────────────────────────────────────────────────

/// Serialization strategy declared for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LogicalKind {
  /// Scalars stored as-is.
  #[default]
  Identity,
  Json,
  Yaml,
  /// Exact binary encoding of the whole value tree. Also accepted under the
  /// token `pickle`.
  Binary,
}

impl LogicalKind {
  /// Token persisted in the metadata table.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Identity => "identity",
      Self::Json => "json",
      Self::Yaml => "yaml",
      Self::Binary => "binary",
    }
  }

  pub fn is_identity(self) -> bool { self == Self::Identity }
}

impl fmt::Display for LogicalKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for LogicalKind {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "identity" => Ok(Self::Identity),
      "json" => Ok(Self::Json),
      "yaml" => Ok(Self::Yaml),
      "binary" | "pickle" => Ok(Self::Binary),
      other => Err(Error::UnknownFieldType(other.to_owned())),
    }
  }
}

// ─── Transformers ────────────────────────────────────────────────────────────

/// A resolved codec. Obtain one through [`resolve`] or [`resolve_token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transformer {
  Identity,
  Json,
  #[cfg(feature = "yaml")]
  Yaml,
  #[cfg(feature = "binary")]
  Binary,
}

/// Map a logical kind to its transformer.
///
/// Fails with [`Error::UnavailableBackend`] when the kind's codec was not
/// compiled in.
pub fn resolve(kind: LogicalKind) -> Result<Transformer> {
  match kind {
    LogicalKind::Identity => Ok(Transformer::Identity),
    LogicalKind::Json => Ok(Transformer::Json),
    #[cfg(feature = "yaml")]
    LogicalKind::Yaml => Ok(Transformer::Yaml),
    #[cfg(feature = "binary")]
    LogicalKind::Binary => Ok(Transformer::Binary),
    #[allow(unreachable_patterns)]
    other => Err(Error::UnavailableBackend(other)),
  }
}

/// Map a logical-kind token, as found in schema definitions and the
/// metadata table, to its transformer. Unrecognised tokens are an error,
/// never an identity fallback.
pub fn resolve_token(token: &str) -> Result<Transformer> { resolve(token.parse()?) }

impl Transformer {
  pub fn kind(self) -> LogicalKind {
    match self {
      Self::Identity => LogicalKind::Identity,
      Self::Json => LogicalKind::Json,
      #[cfg(feature = "yaml")]
      Self::Yaml => LogicalKind::Yaml,
      #[cfg(feature = "binary")]
      Self::Binary => LogicalKind::Binary,
    }
  }

  /// Encode `value` for storage.
  pub fn to_storage(self, value: &Value) -> Result<RawValue> {
    match self {
      Self::Identity => identity_to_storage(value),
      Self::Json => json::to_storage(value),
      #[cfg(feature = "yaml")]
      Self::Yaml => yaml::to_storage(value),
      #[cfg(feature = "binary")]
      Self::Binary => binary::to_storage(value),
    }
  }

  /// Decode a stored primitive. A stored null always decodes to
  /// [`Value::Null`].
  pub fn from_storage(self, raw: RawValue) -> Result<Value> {
    if raw.is_null() {
      return Ok(Value::Null);
    }
    match self {
      Self::Identity => Ok(identity_from_storage(raw)),
      Self::Json => json::from_storage(raw),
      #[cfg(feature = "yaml")]
      Self::Yaml => yaml::from_storage(raw),
      #[cfg(feature = "binary")]
      Self::Binary => binary::from_storage(raw),
    }
  }
}

// ─── Identity ────────────────────────────────────────────────────────────────

fn identity_to_storage(value: &Value) -> Result<RawValue> {
  Ok(match value {
    Value::Null => RawValue::Null,
    Value::Bool(b) => RawValue::Integer(i64::from(*b)),
    Value::Integer(i) => RawValue::Integer(*i),
    Value::Real(r) => RawValue::Real(*r),
    Value::Text(s) => RawValue::Text(s.clone()),
    Value::Bytes(b) => RawValue::Blob(b.clone()),
    Value::Timestamp(ts) => RawValue::Text(format_timestamp(ts)),
    other => {
      return Err(Error::Encode {
        kind:   LogicalKind::Identity,
        reason: format!("a {} needs a serializing field type", other.type_name()),
      });
    }
  })
}

fn identity_from_storage(raw: RawValue) -> Value {
  match raw {
    RawValue::Null => Value::Null,
    RawValue::Integer(i) => Value::Integer(i),
    RawValue::Real(r) => Value::Real(r),
    RawValue::Text(s) => Value::Text(s),
    RawValue::Blob(b) => Value::Bytes(b),
  }
}

/// Stored text for the text-based codecs. Numbers are accepted as their
/// literal spelling since column affinity may have converted them.
fn stored_text(kind: LogicalKind, raw: RawValue) -> Result<String> {
  match raw {
    RawValue::Text(s) => Ok(s),
    RawValue::Blob(b) => String::from_utf8(b).map_err(|e| Error::Decode {
      kind,
      reason: e.to_string(),
    }),
    RawValue::Integer(i) => Ok(i.to_string()),
    RawValue::Real(r) => Ok(r.to_string()),
    RawValue::Null => Ok(String::new()),
  }
}
