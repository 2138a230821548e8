//! [`SqliteStore`], the SQLite implementation of [`RecordStore`].

use std::{collections::HashMap, path::Path, time::Duration};

use jobtab_core::{JobId, RawValue, RecordStore, Schema, Transformer, detect, schema::ID_COLUMN};
use parking_lot::Mutex;
use rusqlite::{Connection, ErrorCode, OptionalExtension as _, types::ToSql};
use tracing::{debug, trace, warn};

use crate::{
  Error, Result,
  encode::{Param, decode_raw},
  sql,
};

const SAVEPOINT: &str = "jobtab_write";

/// Connection settings.
#[derive(Debug, Clone)]
pub struct StoreOptions {
  /// How long to wait on a database locked by another writer. `None`
  /// fails immediately.
  pub busy_timeout: Option<Duration>,
}

impl Default for StoreOptions {
  fn default() -> Self { Self { busy_timeout: Some(Duration::from_secs(5)) } }
}

/// Lazily loaded view of the table's catalog.
#[derive(Default)]
struct Catalog {
  /// Physical columns in table order, `id` included.
  columns:      Option<Vec<String>>,
  /// Recorded kind tokens per field, as read from the metadata table.
  kinds:        Option<HashMap<String, String>>,
  transformers: HashMap<String, Transformer>,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// One table of job rows in a SQLite database.
///
/// Writes open a transaction if none is pending; it stays open until
/// [`commit`](RecordStore::commit), [`rollback`](Self::rollback),
/// [`close`](Self::close) or drop.
pub struct SqliteStore {
  pub(crate) conn: Connection,
  table:           String,
  catalog:         Mutex<Catalog>,
}

impl SqliteStore {
  /// Open (or create) the database at `path` and bind to `table`.
  pub fn open(path: impl AsRef<Path>, table: impl Into<String>) -> Result<Self> {
    Self::open_with(path, table, &StoreOptions::default())
  }

  pub fn open_with(
    path: impl AsRef<Path>,
    table: impl Into<String>,
    options: &StoreOptions,
  ) -> Result<Self> {
    let conn = Connection::open(path.as_ref())?;
    if let Some(timeout) = options.busy_timeout {
      conn.busy_timeout(timeout)?;
    }
    let store = Self::from_connection(conn, table.into());
    debug!(path = %path.as_ref().display(), table = %store.table, "opened store");
    Ok(store)
  }

  /// Open the database at `path` from inside a scheduled job, bound to the
  /// table named after the job. Returns the store and the job's id, ready
  /// for [`RecordStore::handler`].
  pub fn open_for_job(path: impl AsRef<Path>) -> Result<(Self, JobId)> {
    Self::open_for_job_with(path, &StoreOptions::default(), |key| {
      std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    })
  }

  pub(crate) fn open_for_job_with(
    path: impl AsRef<Path>,
    options: &StoreOptions,
    env: impl Fn(&str) -> Option<String>,
  ) -> Result<(Self, JobId)> {
    let job_id = detect::job_id_from(&env)?;
    let table = detect::table_name_from(&env)?;
    Ok((Self::open_with(path, table, options)?, job_id))
  }

  /// Open an in-memory store, mostly for tests.
  pub fn open_in_memory(table: impl Into<String>) -> Result<Self> {
    Ok(Self::from_connection(Connection::open_in_memory()?, table.into()))
  }

  fn from_connection(conn: Connection, table: String) -> Self {
    Self { conn, table, catalog: Mutex::new(Catalog::default()) }
  }

  pub fn table(&self) -> &str { &self.table }

  /// Physical columns of the table, `id` excluded.
  pub fn fields(&self) -> Result<Vec<String>> {
    let mut catalog = self.catalog.lock();
    let columns = self.columns(&mut catalog)?;
    Ok(columns.iter().filter(|c| *c != ID_COLUMN).cloned().collect())
  }

  /// Whether writes are pending.
  pub fn in_transaction(&self) -> bool { !self.conn.is_autocommit() }

  /// Discard pending writes.
  pub fn rollback(&self) -> Result<()> {
    if self.in_transaction() {
      self.conn.execute_batch("ROLLBACK")?;
      debug!(table = %self.table, "rolled back");
    }
    self.invalidate();
    Ok(())
  }

  /// Commit pending writes and close the connection.
  pub fn close(self) -> Result<()> { self.commit_pending() }

  // ── Transactions ──────────────────────────────────────────────────────

  fn begin(&self) -> Result<()> {
    if self.conn.is_autocommit() {
      trace!("BEGIN");
      self.conn.execute_batch("BEGIN")?;
    }
    Ok(())
  }

  fn commit_pending(&self) -> Result<()> {
    if self.in_transaction() {
      self.conn.execute_batch("COMMIT")?;
      debug!(table = %self.table, "committed");
    }
    Ok(())
  }

  /// Run `f` inside a savepoint so it applies entirely or not at all,
  /// leaving earlier pending writes untouched.
  fn atomically<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
    self.conn.execute_batch(&format!("SAVEPOINT {SAVEPOINT}"))?;
    match f(&self.conn) {
      Ok(value) => {
        self.conn.execute_batch(&format!("RELEASE {SAVEPOINT}"))?;
        Ok(value)
      }
      Err(e) => {
        if let Err(undo) = self
          .conn
          .execute_batch(&format!("ROLLBACK TO {SAVEPOINT}; RELEASE {SAVEPOINT}"))
        {
          warn!(error = %undo, "failed to roll back savepoint");
        }
        Err(e)
      }
    }
  }

  // ── Catalog ───────────────────────────────────────────────────────────

  fn invalidate(&self) { *self.catalog.lock() = Catalog::default(); }

  fn table_exists(&self, name: &str) -> Result<bool> {
    Ok(
      self
        .conn
        .query_row(sql::TABLE_EXISTS, [name], |_| Ok(()))
        .optional()?
        .is_some(),
    )
  }

  /// Columns of the table, loaded on first use. An absent table is not
  /// cached so a later `prepare` is picked up.
  fn columns<'c>(&self, catalog: &'c mut Catalog) -> Result<&'c [String]> {
    let columns = match catalog.columns.take() {
      Some(columns) => columns,
      None => {
        let mut stmt = self.conn.prepare(sql::TABLE_COLUMNS)?;
        let columns = stmt
          .query_map([&self.table], |row| row.get::<_, String>(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        if columns.is_empty() {
          return Err(Error::NotPrepared(self.table.clone()));
        }
        debug!(table = %self.table, columns = columns.len(), "loaded columns");
        columns
      }
    };
    Ok(catalog.columns.insert(columns))
  }

  /// Fail with `UnknownField` unless every name is a data column.
  fn check_fields(&self, fields: &[&str]) -> Result<()> {
    let mut catalog = self.catalog.lock();
    let columns = self.columns(&mut catalog)?;
    match fields
      .iter()
      .find(|f| **f == ID_COLUMN || !columns.iter().any(|c| c == *f))
    {
      Some(unknown) => Err(Error::UnknownField {
        table: self.table.clone(),
        field: (*unknown).to_owned(),
      }),
      None => Ok(()),
    }
  }

  fn load_kinds(&self) -> Result<HashMap<String, String>> {
    if !self.table_exists(&sql::metadata_table(&self.table))? {
      return Ok(HashMap::new());
    }
    let mut stmt = self.conn.prepare(&sql::select_metadata(&self.table))?;
    let kinds = stmt
      .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
      .collect::<rusqlite::Result<HashMap<_, _>>>()?;
    debug!(table = %self.table, kinds = kinds.len(), "loaded field metadata");
    Ok(kinds)
  }

  // ── Writes ────────────────────────────────────────────────────────────

  /// Insert a new row. Fails with [`Error::JobExists`] when the row is
  /// already there.
  pub(crate) fn insert_values(
    &self,
    job_id: JobId,
    fields: &[&str],
    values: &[RawValue],
  ) -> Result<()> {
    let statement = sql::insert_fields(&self.table, fields);
    trace!(%statement, job_id);
    let params: Vec<Param<'_>> = values.iter().map(Param).collect();
    let mut bound: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();
    bound.push(&job_id);
    self
      .conn
      .execute(&statement, bound.as_slice())
      .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(ref failure, _)
          if failure.code == ErrorCode::ConstraintViolation
            && matches!(
              failure.extended_code,
              rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY | rusqlite::ffi::SQLITE_CONSTRAINT_ROWID
            ) =>
        {
          Error::JobExists(job_id)
        }
        e => Error::Database(e),
      })?;
    Ok(())
  }

  fn upsert(&self, job_id: JobId, fields: &[&str], values: &[RawValue]) -> Result<()> {
    let statement = sql::update_fields(&self.table, fields);
    trace!(%statement, job_id);
    let params: Vec<Param<'_>> = values.iter().map(Param).collect();
    let mut bound: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();
    bound.push(&job_id);
    if self.conn.execute(&statement, bound.as_slice())? == 0 {
      self.insert_values(job_id, fields, values)?;
    }
    Ok(())
  }
}

impl RecordStore for SqliteStore {
  type Error = Error;

  fn prepare(&self, schema: &Schema) -> Result<()> {
    for name in [self.table.clone(), sql::metadata_table(&self.table)] {
      if self.table_exists(&name)? {
        return Err(Error::AlreadyExists(name));
      }
    }
    let opened = !self.in_transaction();
    self.begin()?;
    let created = self.atomically(|conn| {
      conn.execute_batch(&sql::create_table(&self.table, schema))?;
      conn.execute_batch(&sql::create_metadata_table(&self.table))?;
      let mut insert = conn.prepare(&sql::insert_metadata(&self.table))?;
      for (field, kind) in schema.declared_kinds() {
        insert.execute(rusqlite::params![field, kind.as_str()])?;
      }
      Ok(())
    });
    if let Err(e) = created {
      // Only close a transaction this call opened; earlier writes stay pending.
      if opened && let Err(undo) = self.conn.execute_batch("ROLLBACK") {
        warn!(error = %undo, "failed to roll back failed prepare");
      }
      return Err(e);
    }
    self.commit_pending()?;
    self.invalidate();
    debug!(table = %self.table, fields = schema.fields().len(), "prepared table");
    Ok(())
  }

  fn clear(&self, remove_tables: bool) -> Result<()> {
    if remove_tables {
      self.begin()?;
      self.atomically(|conn| {
        conn.execute_batch(&sql::drop_table(&self.table))?;
        conn.execute_batch(&sql::drop_table(&sql::metadata_table(&self.table)))?;
        Ok(())
      })?;
      self.invalidate();
      debug!(table = %self.table, "dropped tables");
    } else {
      if !self.table_exists(&self.table)? {
        return Err(Error::NotPrepared(self.table.clone()));
      }
      self.begin()?;
      let removed = self.conn.execute(&sql::delete_rows(&self.table), [])?;
      debug!(table = %self.table, removed, "cleared rows");
    }
    Ok(())
  }

  fn get_value(&self, job_id: JobId, field: &str) -> Result<RawValue> {
    self
      .try_get_value(job_id, field)?
      .ok_or(Error::UnknownJob(job_id))
  }

  fn try_get_value(&self, job_id: JobId, field: &str) -> Result<Option<RawValue>> {
    self.check_fields(&[field])?;
    let statement = sql::select_field(&self.table, field);
    trace!(%statement, job_id);
    let value = self
      .conn
      .query_row(&statement, [job_id], |row| row.get(0))
      .optional()?;
    Ok(value.map(decode_raw))
  }

  fn set_value(&self, job_id: JobId, field: &str, value: RawValue) -> Result<()> {
    self.set_values(job_id, &[field], std::slice::from_ref(&value))
  }

  fn set_values(&self, job_id: JobId, fields: &[&str], values: &[RawValue]) -> Result<()> {
    if fields.len() != values.len() {
      return Err(
        jobtab_core::Error::MismatchedValues { fields: fields.len(), values: values.len() }.into(),
      );
    }
    if fields.is_empty() {
      return Ok(());
    }
    self.check_fields(fields)?;
    self.begin()?;
    self.atomically(|_| self.upsert(job_id, fields, values))
  }

  fn field_transformer(&self, field: &str) -> Result<Transformer> {
    let mut catalog = self.catalog.lock();
    if let Some(transformer) = catalog.transformers.get(field) {
      return Ok(*transformer);
    }
    if catalog.kinds.is_none() {
      catalog.kinds = Some(self.load_kinds()?);
    }
    let transformer = match catalog.kinds.as_ref().and_then(|k| k.get(field)) {
      Some(token) => jobtab_core::transform::resolve_token(token)?,
      None => Transformer::Identity,
    };
    catalog.transformers.insert(field.to_owned(), transformer);
    Ok(transformer)
  }

  fn commit(&self) -> Result<()> { self.commit_pending() }
}

impl Drop for SqliteStore {
  fn drop(&mut self) {
    if let Err(e) = self.commit_pending() {
      warn!(table = %self.table, error = %e, "failed to commit pending writes on close");
    }
  }
}
