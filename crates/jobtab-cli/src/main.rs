//! `jobtab`: record per-job values in a SQLite table.
//!
//! # Usage
//!
//! ```
//! jobtab -t sweep init schema.json
//! jobtab -t sweep set -j 17 flag 1
//! jobtab setdict results.yaml        # job id and table from SLURM/PBS
//! jobtab get -j 17 payload
//! ```

mod commands;
mod settings;

use std::{io, path::PathBuf, time::Duration};

use anyhow::Context as _;
use clap::Parser;
use jobtab_core::{NullStore, detect};
use jobtab_store_sqlite::{SqliteStore, StoreOptions};
use settings::{Settings, expand_tilde};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::commands::Command;

#[derive(Parser)]
#[command(name = "jobtab", author, version, about = "Record per-job values in a SQLite table")]
struct Cli {
  /// Path to the database file [default: ~/jobtab.db].
  #[arg(short, long, value_name = "FILE")]
  database: Option<PathBuf>,

  /// Table to work with; detected from the scheduler's job name when
  /// absent.
  #[arg(short, long)]
  table: Option<String>,

  /// Path to a TOML settings file.
  #[arg(long, value_name = "FILE", default_value = "jobtab.toml")]
  config: PathBuf,

  /// Run against a store that keeps nothing.
  #[arg(long)]
  dry_run: bool,

  /// Log what is being done to stderr.
  #[arg(short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();

  let level = if cli.verbose { LevelFilter::DEBUG } else { LevelFilter::WARN };
  tracing_subscriber::fmt()
    .with_writer(io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy(),
    )
    .init();

  let settings = Settings::load(&cli.config)
    .with_context(|| format!("failed to read settings from {}", cli.config.display()))?;
  let mut out = io::stdout().lock();

  if cli.dry_run {
    tracing::info!("dry run: nothing will be stored");
    return commands::run(&NullStore, cli.command, &mut out);
  }

  // Flags override the file and environment.
  let database = expand_tilde(&cli.database.unwrap_or(settings.database));
  let table = match cli.table.or(settings.table) {
    Some(table) => table,
    None => detect::table_name().context("no --table given")?,
  };
  let options = StoreOptions {
    busy_timeout: (settings.busy_timeout_ms > 0)
      .then(|| Duration::from_millis(settings.busy_timeout_ms)),
  };

  let store = SqliteStore::open_with(&database, table, &options)
    .with_context(|| format!("failed to open database at {}", database.display()))?;
  commands::run(&store, cli.command, &mut out)?;
  store.close().context("failed to commit pending writes")
}
