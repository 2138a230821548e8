//! Conversions between [`RawValue`] and rusqlite's value types.

use jobtab_core::RawValue;
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};

/// Binds a [`RawValue`] as a statement parameter without copying it.
pub struct Param<'a>(pub &'a RawValue);

impl ToSql for Param<'_> {
  fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
    Ok(ToSqlOutput::Borrowed(match self.0 {
      RawValue::Null => ValueRef::Null,
      RawValue::Integer(i) => ValueRef::Integer(*i),
      RawValue::Real(r) => ValueRef::Real(*r),
      RawValue::Text(s) => ValueRef::Text(s.as_bytes()),
      RawValue::Blob(b) => ValueRef::Blob(b),
    }))
  }
}

pub fn decode_raw(value: SqlValue) -> RawValue {
  match value {
    SqlValue::Null => RawValue::Null,
    SqlValue::Integer(i) => RawValue::Integer(i),
    SqlValue::Real(r) => RawValue::Real(r),
    SqlValue::Text(s) => RawValue::Text(s),
    SqlValue::Blob(b) => RawValue::Blob(b),
  }
}
