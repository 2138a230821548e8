//! The `RecordStore` trait and the no-op [`NullStore`].
//!
//! The trait is implemented by storage backends (e.g. `jobtab-store-sqlite`).
//! [`JobHandle`] and the command-line front end depend on this abstraction,
//! not on any concrete backend.

use std::collections::BTreeMap;

use crate::{
  Error, Result,
  handle::JobHandle,
  schema::Schema,
  transform::Transformer,
  value::{JobId, RawValue},
};

/// A table of job rows with typed fields.
///
/// Values cross this interface in their raw, stored form; encoding and
/// decoding through each field's [`Transformer`] is the job handle's job.
/// Writes join the store's pending transaction and become durable on
/// [`commit`](Self::commit).
pub trait RecordStore {
  type Error: std::error::Error + From<Error> + Send + Sync + 'static;

  // ── Provisioning ──────────────────────────────────────────────────────

  /// Create the table and its metadata for `schema`. Committed immediately.
  fn prepare(&self, schema: &Schema) -> Result<(), Self::Error>;

  /// Delete every row, or with `remove_tables` drop the table and its
  /// metadata altogether. Dropping tables that do not exist is not an error.
  fn clear(&self, remove_tables: bool) -> Result<(), Self::Error>;

  // ── Rows ──────────────────────────────────────────────────────────────

  /// Raw value of `field` for `job_id`. Fails if the job has no row.
  fn get_value(&self, job_id: JobId, field: &str) -> Result<RawValue, Self::Error>;

  /// Like [`get_value`](Self::get_value) but yields `None` when the job has
  /// no row.
  fn try_get_value(&self, job_id: JobId, field: &str) -> Result<Option<RawValue>, Self::Error>;

  /// Upsert one field of the job's row.
  fn set_value(&self, job_id: JobId, field: &str, value: RawValue) -> Result<(), Self::Error>;

  /// Upsert several fields at once; either all are written or none.
  fn set_values(
    &self,
    job_id: JobId,
    fields: &[&str],
    values: &[RawValue],
  ) -> Result<(), Self::Error>;

  /// [`set_values`](Self::set_values) taking a field → value map.
  fn update_values(
    &self,
    job_id: JobId,
    values: &BTreeMap<String, RawValue>,
  ) -> Result<(), Self::Error> {
    let fields: Vec<&str> = values.keys().map(String::as_str).collect();
    let raws: Vec<RawValue> = values.values().cloned().collect();
    self.set_values(job_id, &fields, &raws)
  }

  // ── Transformers ──────────────────────────────────────────────────────

  /// Transformer recorded for `field`. Fields without metadata use the
  /// identity transformer; an unrecognised recorded kind is an error.
  fn field_transformer(&self, field: &str) -> Result<Transformer, Self::Error>;

  // ── Durability ────────────────────────────────────────────────────────

  /// Make pending writes durable.
  fn commit(&self) -> Result<(), Self::Error>;

  // ── Handles ───────────────────────────────────────────────────────────

  /// A handle on one job's row. Does not touch storage.
  fn handler(&self, job_id: JobId) -> JobHandle<'_, Self> { JobHandle::new(self, job_id) }

  /// Run `body` against a handle for `job_id` and commit the handle on
  /// every exit path. An error from `body` takes precedence over one from
  /// the commit, which is then only logged.
  fn with_handler<T, F>(&self, job_id: JobId, body: F) -> Result<T, Self::Error>
  where
    Self: Sized,
    F: FnOnce(&mut JobHandle<'_, Self>) -> Result<T, Self::Error>,
  {
    let mut handle = self.handler(job_id);
    let outcome = body(&mut handle);
    let committed = handle.commit();
    match (outcome, committed) {
      (Ok(value), Ok(())) => Ok(value),
      (Ok(_), Err(e)) | (Err(e), Ok(())) => Err(e),
      (Err(e), Err(commit_err)) => {
        tracing::warn!(job_id, error = %commit_err, "commit after failed job scope also failed");
        Err(e)
      }
    }
  }
}

// ─── NullStore ───────────────────────────────────────────────────────────────

/// A store that keeps nothing: every read is null and every write is
/// discarded. Lets instrumented jobs run without a database.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

impl RecordStore for NullStore {
  type Error = Error;

  fn prepare(&self, _schema: &Schema) -> Result<()> {
    Err(Error::Unsupported("a null store cannot provision tables"))
  }

  fn clear(&self, _remove_tables: bool) -> Result<()> { Ok(()) }

  fn get_value(&self, _job_id: JobId, _field: &str) -> Result<RawValue> { Ok(RawValue::Null) }

  fn try_get_value(&self, _job_id: JobId, _field: &str) -> Result<Option<RawValue>> {
    Ok(Some(RawValue::Null))
  }

  fn set_value(&self, _job_id: JobId, _field: &str, _value: RawValue) -> Result<()> { Ok(()) }

  fn set_values(&self, _job_id: JobId, fields: &[&str], values: &[RawValue]) -> Result<()> {
    if fields.len() != values.len() {
      return Err(Error::MismatchedValues { fields: fields.len(), values: values.len() });
    }
    Ok(())
  }

  fn field_transformer(&self, _field: &str) -> Result<Transformer> { Ok(Transformer::Identity) }

  fn commit(&self) -> Result<()> { Ok(()) }
}
