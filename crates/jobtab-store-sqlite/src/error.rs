//! Error type for `jobtab-store-sqlite`.

use jobtab_core::JobId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("{0}")]
  Core(#[from] jobtab_core::Error),

  #[error("database error: {0}")]
  Database(#[from] rusqlite::Error),

  #[error("table {table:?} has no field {field:?}")]
  UnknownField { table: String, field: String },

  #[error("no row for job {0}")]
  UnknownJob(JobId),

  #[error("table {0:?} already exists")]
  AlreadyExists(String),

  /// The insert half of an upsert lost a race with another writer.
  #[error("row for job {0} was created by another writer")]
  JobExists(JobId),

  #[error("table {0:?} has not been prepared")]
  NotPrepared(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
