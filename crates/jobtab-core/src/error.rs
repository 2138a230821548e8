//! Error types for `jobtab-core`.

use thiserror::Error;

use crate::transform::LogicalKind;

#[derive(Debug, Error)]
pub enum Error {
  /// The schema definition is malformed or uses an unrecognised container.
  #[error("schema format error: {0}")]
  Format(String),

  #[error("{0} support is not compiled in")]
  UnavailableBackend(LogicalKind),

  #[error("unknown field type: {0:?}")]
  UnknownFieldType(String),

  #[error("field {0:?} is null")]
  NullField(String),

  #[error("cannot encode value as {kind}: {reason}")]
  Encode { kind: LogicalKind, reason: String },

  #[error("cannot decode stored {kind} value: {reason}")]
  Decode { kind: LogicalKind, reason: String },

  #[error("{fields} fields given with {values} values")]
  MismatchedValues { fields: usize, values: usize },

  #[error("scheduler detection failed: {0}")]
  Detect(String),

  #[error("unsupported operation: {0}")]
  Unsupported(&'static str),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
