//! SQL text for the per-table statements.
//!
//! Table and column names come from schemas and the command line, so they
//! are spliced into statements; [`quote_ident`] is the only place that
//! happens. Column types are checked by schema validation before they get
//! here. Values are always bound as parameters.

use jobtab_core::{Schema, schema::ID_COLUMN};

/// Suffix of the companion table holding field kinds.
const METADATA_SUFFIX: &str = "_tamd";

/// Quote `name` as an SQL identifier.
pub fn quote_ident(name: &str) -> String { format!("\"{}\"", name.replace('"', "\"\"")) }

pub fn metadata_table(table: &str) -> String { format!("{table}{METADATA_SUFFIX}") }

pub const TABLE_EXISTS: &str =
  "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 LIMIT 1";

pub const TABLE_COLUMNS: &str = "SELECT name FROM pragma_table_info(?1)";

pub fn create_table(table: &str, schema: &Schema) -> String {
  let mut columns = vec![format!("{} INTEGER PRIMARY KEY", quote_ident(ID_COLUMN))];
  columns.extend(
    schema
      .fields()
      .iter()
      .map(|f| format!("{} {}", quote_ident(&f.name), f.physical_type)),
  );
  format!("CREATE TABLE {} ({})", quote_ident(table), columns.join(", "))
}

pub fn create_metadata_table(table: &str) -> String {
  format!(
    "CREATE TABLE {} (field TEXT, type TEXT)",
    quote_ident(&metadata_table(table))
  )
}

pub fn insert_metadata(table: &str) -> String {
  format!(
    "INSERT INTO {} (field, type) VALUES (?1, ?2)",
    quote_ident(&metadata_table(table))
  )
}

pub fn select_metadata(table: &str) -> String {
  format!(
    "SELECT field, type FROM {} WHERE type IS NOT NULL",
    quote_ident(&metadata_table(table))
  )
}

pub fn drop_table(table: &str) -> String { format!("DROP TABLE IF EXISTS {}", quote_ident(table)) }

pub fn delete_rows(table: &str) -> String { format!("DELETE FROM {}", quote_ident(table)) }

pub fn select_field(table: &str, field: &str) -> String {
  format!(
    "SELECT {} FROM {} WHERE {} = ?1",
    quote_ident(field),
    quote_ident(table),
    quote_ident(ID_COLUMN)
  )
}

/// `UPDATE` of `fields` for one row. Parameters: the field values in order,
/// then the job id.
pub fn update_fields(table: &str, fields: &[&str]) -> String {
  let assignments: Vec<String> = fields
    .iter()
    .enumerate()
    .map(|(i, f)| format!("{} = ?{}", quote_ident(f), i + 1))
    .collect();
  format!(
    "UPDATE {} SET {} WHERE {} = ?{}",
    quote_ident(table),
    assignments.join(", "),
    quote_ident(ID_COLUMN),
    fields.len() + 1
  )
}

/// `INSERT` of `fields` plus the id. Same parameters as [`update_fields`].
pub fn insert_fields(table: &str, fields: &[&str]) -> String {
  let columns: Vec<String> = fields
    .iter()
    .copied()
    .chain([ID_COLUMN])
    .map(quote_ident)
    .collect();
  let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
  format!(
    "INSERT INTO {} ({}) VALUES ({})",
    quote_ident(table),
    columns.join(", "),
    placeholders.join(", ")
  )
}
