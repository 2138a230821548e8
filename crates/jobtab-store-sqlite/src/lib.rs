//! SQLite backend for jobtab.
//!
//! Each logical table is one SQLite table keyed by job id, plus a
//! `<table>_tamd` companion table recording the logical kind of every field
//! that is not stored as-is.

mod encode;
mod sql;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{SqliteStore, StoreOptions};
