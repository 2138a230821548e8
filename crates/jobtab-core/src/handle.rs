//! [`JobHandle`]: a map-like view of one job's row.
//!
//! Writes go straight to the store, encoded through the field's
//! transformer, and are also kept in the handle. Reads are served from the
//! handle first and fall back to the store, caching what they decode.
//! [`JobHandle::commit`] re-encodes everything the handle holds, writes it
//! as one batched upsert and asks the store to make it durable; that is how
//! staged values and in-place edits made through [`JobHandle::read_mut`]
//! reach storage. A handle dropped with such values still uncommitted
//! commits them on the way out.
//!
//! Two handles on the same job do not share state: each sees its own writes
//! immediately and the other's only once they are committed and it has not
//! cached the field yet.

use std::collections::{BTreeMap, btree_map::Entry};

use crate::{
  Error,
  store::RecordStore,
  value::{JobId, Value},
};

pub struct JobHandle<'s, S: RecordStore + ?Sized> {
  store:  &'s S,
  job_id: JobId,
  values: BTreeMap<String, Value>,
  /// Set when `values` holds something storage has not seen.
  dirty:  bool,
}

impl<'s, S: RecordStore + ?Sized> JobHandle<'s, S> {
  pub fn new(store: &'s S, job_id: JobId) -> Self {
    Self { store, job_id, values: BTreeMap::new(), dirty: false }
  }

  pub fn job_id(&self) -> JobId { self.job_id }

  /// Whether the handle holds staged or edited values not yet committed.
  pub fn is_dirty(&self) -> bool { self.dirty }

  /// Fetch and decode `field`; `None` when the job has no row or the
  /// stored value is null.
  fn load(store: &S, job_id: JobId, field: &str) -> Result<Option<Value>, S::Error> {
    let Some(raw) = store.try_get_value(job_id, field)? else {
      return Ok(None);
    };
    if raw.is_null() {
      return Ok(None);
    }
    Ok(Some(store.field_transformer(field)?.from_storage(raw)?))
  }

  /// Fetch and decode `field`, failing when it is null.
  fn load_required(store: &S, job_id: JobId, field: &str) -> Result<Value, S::Error> {
    let raw = store.get_value(job_id, field)?;
    if raw.is_null() {
      return Err(Error::NullField(field.to_owned()).into());
    }
    Ok(store.field_transformer(field)?.from_storage(raw)?)
  }

  /// Value of `field`. Fails with [`Error::NullField`] when nothing is
  /// stored.
  pub fn read(&mut self, field: &str) -> Result<&Value, S::Error> {
    match self.values.entry(field.to_owned()) {
      Entry::Occupied(e) => Ok(e.into_mut()),
      Entry::Vacant(e) => {
        let value = Self::load_required(self.store, self.job_id, field)?;
        Ok(e.insert(value))
      }
    }
  }

  /// Mutable access to `field`. Changes are persisted by the next
  /// [`commit`](Self::commit).
  pub fn read_mut(&mut self, field: &str) -> Result<&mut Value, S::Error> {
    let value = match self.values.entry(field.to_owned()) {
      Entry::Occupied(e) => e.into_mut(),
      Entry::Vacant(e) => {
        let value = Self::load_required(self.store, self.job_id, field)?;
        e.insert(value)
      }
    };
    self.dirty = true;
    Ok(value)
  }

  /// Encode and persist `value` right away, keeping it in the handle.
  pub fn write(&mut self, field: &str, value: impl Into<Value>) -> Result<(), S::Error> {
    let value = value.into();
    let raw = self.store.field_transformer(field)?.to_storage(&value)?;
    self.store.set_value(self.job_id, field, raw)?;
    self.values.insert(field.to_owned(), value);
    Ok(())
  }

  /// Keep `value` in the handle only; it reaches storage on commit.
  pub fn stage(&mut self, field: &str, value: impl Into<Value>) {
    self.values.insert(field.to_owned(), value.into());
    self.dirty = true;
  }

  /// Whether `field` holds a non-null value. Never decodes.
  pub fn contains(&self, field: &str) -> Result<bool, S::Error> {
    if let Some(value) = self.values.get(field) {
      return Ok(!value.is_null());
    }
    Ok(
      self
        .store
        .try_get_value(self.job_id, field)?
        .is_some_and(|raw| !raw.is_null()),
    )
  }

  /// Value of `field`, or `default` (not transformed) when nothing is
  /// stored.
  pub fn get_or_default(&self, field: &str, default: impl Into<Value>) -> Result<Value, S::Error> {
    if let Some(value) = self.values.get(field) {
      return Ok(value.clone());
    }
    Ok(Self::load(self.store, self.job_id, field)?.unwrap_or_else(|| default.into()))
  }

  /// [`get_or_default`](Self::get_or_default), keeping a non-null result
  /// in the handle so a later commit stores it.
  pub fn set_default(&mut self, field: &str, default: impl Into<Value>) -> Result<Value, S::Error> {
    if let Some(value) = self.values.get(field) {
      return Ok(value.clone());
    }
    let value = match Self::load(self.store, self.job_id, field)? {
      Some(stored) => stored,
      None => {
        let value = default.into();
        if !value.is_null() {
          self.dirty = true;
        }
        value
      }
    };
    if !value.is_null() {
      self.values.insert(field.to_owned(), value.clone());
    }
    Ok(value)
  }

  /// Write every value held by the handle as one batched upsert, forget
  /// them, and commit the store's pending transaction.
  pub fn commit(&mut self) -> Result<(), S::Error> {
    let mut encoded = BTreeMap::new();
    for (field, value) in &self.values {
      let raw = self.store.field_transformer(field)?.to_storage(value)?;
      encoded.insert(field.clone(), raw);
    }
    if !encoded.is_empty() {
      self.store.update_values(self.job_id, &encoded)?;
    }
    self.values.clear();
    self.dirty = false;
    self.store.commit()
  }
}

/// A handle still holding staged or edited values commits them when it goes
/// out of scope. Failures can only be logged here; call
/// [`JobHandle::commit`] to observe them.
impl<S: RecordStore + ?Sized> Drop for JobHandle<'_, S> {
  fn drop(&mut self) {
    if !self.dirty {
      return;
    }
    let fields = self.values.len();
    if let Err(e) = self.commit() {
      tracing::warn!(
        job_id = self.job_id,
        fields,
        error = %e,
        "failed to commit job handle on drop"
      );
    }
  }
}

#[cfg(test)]
mod tests {
  use std::cell::RefCell;

  use super::*;
  use crate::{
    Result,
    schema::Schema,
    transform::Transformer,
    value::RawValue,
  };

  /// One-row in-memory store recording calls, with `payload` stored as JSON.
  #[derive(Default)]
  struct MemStore {
    row:     RefCell<Option<BTreeMap<String, RawValue>>>,
    batches: RefCell<usize>,
    commits: RefCell<usize>,
  }

  impl RecordStore for MemStore {
    type Error = Error;

    fn prepare(&self, _schema: &Schema) -> Result<()> { Ok(()) }

    fn clear(&self, _remove_tables: bool) -> Result<()> {
      self.row.replace(None);
      Ok(())
    }

    fn get_value(&self, job_id: JobId, field: &str) -> Result<RawValue> {
      self
        .try_get_value(job_id, field)?
        .ok_or(Error::Unsupported("no row"))
    }

    fn try_get_value(&self, _job_id: JobId, field: &str) -> Result<Option<RawValue>> {
      Ok(
        self
          .row
          .borrow()
          .as_ref()
          .map(|row| row.get(field).cloned().unwrap_or(RawValue::Null)),
      )
    }

    fn set_value(&self, _job_id: JobId, field: &str, value: RawValue) -> Result<()> {
      self
        .row
        .borrow_mut()
        .get_or_insert_with(BTreeMap::new)
        .insert(field.to_owned(), value);
      Ok(())
    }

    fn set_values(&self, job_id: JobId, fields: &[&str], values: &[RawValue]) -> Result<()> {
      *self.batches.borrow_mut() += 1;
      for (field, value) in fields.iter().zip(values) {
        self.set_value(job_id, field, value.clone())?;
      }
      Ok(())
    }

    fn field_transformer(&self, field: &str) -> Result<Transformer> {
      Ok(if field == "payload" { Transformer::Json } else { Transformer::Identity })
    }

    fn commit(&self) -> Result<()> {
      *self.commits.borrow_mut() += 1;
      Ok(())
    }
  }

  fn payload() -> Value { Value::from(vec![Value::from(1), Value::from("two"), Value::from(3)]) }

  #[test]
  fn write_persists_through_transformer() {
    let store = MemStore::default();
    let mut h = store.handler(1);
    h.write("payload", payload()).unwrap();
    assert_eq!(
      store.get_value(1, "payload").unwrap(),
      RawValue::Text(r#"[1,"two",3]"#.into())
    );
    assert_eq!(h.read("payload").unwrap(), &payload());
  }

  #[test]
  fn read_decodes_and_caches() {
    let store = MemStore::default();
    store
      .set_value(1, "payload", RawValue::Text("[1,\"two\",3]".into()))
      .unwrap();
    let mut h = store.handler(1);
    assert_eq!(h.read("payload").unwrap(), &payload());

    // A later change in storage is not seen through the cached value.
    store
      .set_value(1, "payload", RawValue::Text("[]".into()))
      .unwrap();
    assert_eq!(h.read("payload").unwrap(), &payload());
  }

  #[test]
  fn read_of_null_field_fails() {
    let store = MemStore::default();
    store.set_value(1, "flag", RawValue::Null).unwrap();
    let err = store.handler(1).read("flag").unwrap_err();
    assert!(matches!(err, Error::NullField(ref f) if f == "flag"));
  }

  #[test]
  fn contains_checks_buffer_then_store() {
    let store = MemStore::default();
    let mut h = store.handler(1);
    assert!(!h.contains("flag").unwrap());
    h.stage("flag", Value::Null);
    assert!(!h.contains("flag").unwrap());
    h.stage("flag", 1);
    assert!(h.contains("flag").unwrap());

    store
      .set_value(1, "other", RawValue::Text("x".into()))
      .unwrap();
    assert!(store.handler(1).contains("other").unwrap());
  }

  #[test]
  fn get_or_default_returns_default_untransformed() {
    let store = MemStore::default();
    let h = store.handler(1);
    assert_eq!(h.get_or_default("payload", "fallback").unwrap(), Value::from("fallback"));
  }

  #[test]
  fn set_default_keeps_value_for_commit() {
    let store = MemStore::default();
    let mut h = store.handler(1);
    assert_eq!(h.set_default("flag", 9).unwrap(), Value::from(9));
    assert!(h.is_dirty());
    h.commit().unwrap();
    assert_eq!(store.get_value(1, "flag").unwrap(), RawValue::Integer(9));
  }

  #[test]
  fn staged_values_are_invisible_until_commit() {
    let store = MemStore::default();
    let mut h = store.handler(1);
    h.stage("payload", payload());
    assert_eq!(h.read("payload").unwrap(), &payload());
    assert!(!store.handler(1).contains("payload").unwrap());

    h.commit().unwrap();
    assert_eq!(store.handler(1).read("payload").unwrap(), &payload());
    assert_eq!(*store.batches.borrow(), 1);
  }

  #[test]
  fn read_mut_edits_reach_storage_on_commit() {
    let store = MemStore::default();
    let mut h = store.handler(1);
    h.write("payload", payload()).unwrap();
    h.read_mut("payload")
      .unwrap()
      .as_vec_mut()
      .unwrap()
      .push(Value::from(4));
    assert!(h.is_dirty());
    h.commit().unwrap();
    assert!(!h.is_dirty());

    let stored = store.handler(1).read("payload").unwrap().clone();
    assert_eq!(stored.as_slice().unwrap().len(), 4);
  }

  #[test]
  fn dropping_a_dirty_handle_commits_it() {
    let store = MemStore::default();
    {
      let mut h = store.handler(1);
      h.write("flag", 1).unwrap();
      h.stage("payload", payload());
    }
    assert_eq!(
      store.get_value(1, "payload").unwrap(),
      RawValue::Text(r#"[1,"two",3]"#.into())
    );

    {
      let mut h = store.handler(1);
      *h.read_mut("flag").unwrap() = Value::from(5);
    }
    assert_eq!(store.get_value(1, "flag").unwrap(), RawValue::Integer(5));
    assert_eq!(*store.commits.borrow(), 2);
  }

  #[test]
  fn dropping_a_clean_handle_does_not_commit() {
    let store = MemStore::default();
    {
      let mut h = store.handler(1);
      h.write("flag", 1).unwrap();
      assert!(!h.is_dirty());
    }
    assert_eq!(*store.commits.borrow(), 0);
  }

  #[test]
  fn empty_commit_only_flushes() {
    let store = MemStore::default();
    store.handler(1).commit().unwrap();
    assert_eq!(*store.batches.borrow(), 0);
    assert_eq!(*store.commits.borrow(), 1);
  }

  #[test]
  fn with_handler_commits_even_when_body_fails() {
    let store = MemStore::default();
    let result: Result<()> = store.with_handler(1, |h| {
      h.stage("flag", 3);
      Err(Error::Unsupported("boom"))
    });
    assert!(result.is_err());
    assert_eq!(store.get_value(1, "flag").unwrap(), RawValue::Integer(3));
    assert_eq!(*store.commits.borrow(), 1);
  }
}
