//! Core types for jobtab, a typed record store for batch jobs.
//!
//! A table holds one row per job; each column is a declared field whose
//! values cross the storage boundary through a [`Transformer`]. This crate
//! defines the value model, the transformer registry, schemas, the
//! [`RecordStore`] abstraction and the per-job [`JobHandle`]. It has no
//! database dependency; backends live in their own crates.

pub mod detect;
pub mod error;
pub mod handle;
pub mod schema;
pub mod store;
pub mod transform;
pub mod value;

pub use error::{Error, Result};
pub use handle::JobHandle;
pub use schema::{DefinitionFormat, FieldDef, Schema};
pub use store::{NullStore, RecordStore};
pub use transform::{LogicalKind, Transformer};
pub use value::{JobId, RawValue, Value};
