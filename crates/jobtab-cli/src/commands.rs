//! Subcommands, generic over the record store so `--dry-run` can swap in a
//! [`NullStore`](jobtab_core::NullStore).

use std::{
  collections::BTreeMap,
  io::{Read as _, Write},
  path::{Path, PathBuf},
};

use anyhow::{Context as _, Result, bail};
use chrono::NaiveDateTime;
use clap::{Subcommand, ValueEnum};
use jobtab_core::{JobId, LogicalKind, RawValue, RecordStore, Schema, Value, detect, transform};
use tracing::debug;

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Create the table described by a schema file (.json, .yaml or .yml).
  Init { schema: PathBuf },

  /// Delete every row of the table.
  Clear {
    /// Drop the table and its metadata instead; `init` is needed again
    /// before the table can be used.
    #[arg(short, long)]
    remove_tables: bool,
  },

  /// Print the value of a field.
  Get {
    field: String,
    /// Row to read; detected from the scheduler when absent.
    #[arg(short, long)]
    jobid: Option<JobId>,
  },

  /// Store text in a field as-is. A value of `-` reads standard input.
  Set {
    field: String,
    value: String,
    #[arg(short, long)]
    jobid: Option<JobId>,
  },

  /// Set several fields from a mapping of field names to values. A source
  /// of `-` reads standard input.
  #[command(name = "setdict")]
  SetDict {
    source: String,
    /// Document format; inferred from the file suffix, JSON for stdin.
    #[arg(short, long, value_enum)]
    dialect: Option<Dialect>,
    #[arg(short, long)]
    jobid: Option<JobId>,
  },

  /// Set a field to the current local time.
  #[command(name = "setnow")]
  SetNow {
    field: String,
    #[arg(short, long)]
    jobid: Option<JobId>,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Dialect {
  Json,
  Yaml,
}

impl Dialect {
  fn infer(source: &str) -> Self {
    if source.ends_with(".yaml") || source.ends_with(".yml") { Self::Yaml } else { Self::Json }
  }

  fn kind(self) -> LogicalKind {
    match self {
      Self::Json => LogicalKind::Json,
      Self::Yaml => LogicalKind::Yaml,
    }
  }
}

fn job(explicit: Option<JobId>) -> Result<JobId> {
  match explicit {
    Some(id) => Ok(id),
    None => detect::job_id().context("no --jobid given"),
  }
}

fn read_stdin() -> Result<String> {
  let mut text = String::new();
  std::io::stdin()
    .read_to_string(&mut text)
    .context("reading standard input")?;
  Ok(text)
}

pub fn run<S: RecordStore>(store: &S, command: Command, out: &mut impl Write) -> Result<()> {
  match command {
    Command::Init { schema } => init(store, &schema),
    Command::Clear { remove_tables } => {
      store.clear(remove_tables).context("clearing table")?;
      store.commit()?;
      Ok(())
    }
    Command::Get { field, jobid } => get(store, job(jobid)?, &field, out),
    Command::Set { field, value, jobid } => {
      let value = if value == "-" { read_stdin()? } else { value };
      set(store, job(jobid)?, &field, value)
    }
    Command::SetDict { source, dialect, jobid } => {
      let (document, dialect) = if source == "-" {
        (read_stdin()?, dialect.unwrap_or(Dialect::Json))
      } else {
        let text = std::fs::read_to_string(&source).with_context(|| format!("reading {source}"))?;
        (text, dialect.unwrap_or_else(|| Dialect::infer(&source)))
      };
      set_dict(store, job(jobid)?, &document, dialect)
    }
    Command::SetNow { field, jobid } => {
      set_now(store, job(jobid)?, &field, chrono::Local::now().naive_local())
    }
  }
}

fn init<S: RecordStore>(store: &S, path: &Path) -> Result<()> {
  let schema =
    Schema::from_file(path).with_context(|| format!("loading schema {}", path.display()))?;
  store.prepare(&schema).context("creating table")?;
  Ok(())
}

fn get<S: RecordStore>(store: &S, job_id: JobId, field: &str, out: &mut impl Write) -> Result<()> {
  let raw = store.get_value(job_id, field)?;
  let value = store.field_transformer(field)?.from_storage(raw)?;
  writeln!(out, "{value}")?;
  Ok(())
}

fn set<S: RecordStore>(store: &S, job_id: JobId, field: &str, text: String) -> Result<()> {
  store.set_value(job_id, field, RawValue::Text(text))?;
  store.commit()?;
  Ok(())
}

fn set_now<S: RecordStore>(store: &S, job_id: JobId, field: &str, now: NaiveDateTime) -> Result<()> {
  store.with_handler(job_id, |h| h.write(field, now))?;
  Ok(())
}

/// Parse `document` as a mapping and write every entry, encoded through
/// its field's transformer, as one batched upsert.
fn set_dict<S: RecordStore>(
  store: &S,
  job_id: JobId,
  document: &str,
  dialect: Dialect,
) -> Result<()> {
  let kind = dialect.kind();
  let parsed = transform::resolve(kind)?
    .from_storage(RawValue::Text(document.to_owned()))
    .with_context(|| format!("parsing {kind} document"))?;
  let entries = match parsed {
    Value::Map(entries) => entries,
    other => bail!("expected a mapping of field names to values, found {}", other.type_name()),
  };

  let mut encoded = BTreeMap::new();
  for (key, value) in entries {
    let field = match key {
      Value::Text(field) => field,
      other => bail!("field names must be text, found {}", other.type_name()),
    };
    let raw = store
      .field_transformer(&field)?
      .to_storage(&value)
      .with_context(|| format!("encoding field {field:?}"))?;
    encoded.insert(field, raw);
  }
  debug!(job_id, fields = encoded.len(), "writing fields");
  store.update_values(job_id, &encoded)?;
  store.commit()?;
  Ok(())
}
