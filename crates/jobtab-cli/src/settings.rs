//! Layered settings: built-in defaults, then an optional TOML file, then
//! `JOBTAB_*` environment variables. Command-line flags are applied on top
//! by the caller.

use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
  pub database:        PathBuf,
  #[serde(default)]
  pub table:           Option<String>,
  /// Lock wait in milliseconds; `0` fails immediately on a locked database.
  pub busy_timeout_ms: u64,
}

impl Settings {
  pub fn load(config_file: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .set_default("database", "~/jobtab.db")?
      .set_default("busy_timeout_ms", 5000_i64)?
      .add_source(config::File::from(config_file).required(false))
      .add_source(config::Environment::with_prefix("JOBTAB"))
      .build()?
      .try_deserialize()
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn file_values_override_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("jobtab.toml");
    std::fs::write(&file, "database = \"/tmp/runs.db\"\ntable = \"sweep\"\n").unwrap();

    let settings = Settings::load(&file).unwrap();
    assert_eq!(settings.database, Path::new("/tmp/runs.db"));
    assert_eq!(settings.table.as_deref(), Some("sweep"));
  }

  #[test]
  fn missing_file_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    Settings::load(&dir.path().join("absent.toml")).unwrap();
  }

  #[test]
  fn tilde_is_expanded_only_at_the_start() {
    assert_eq!(expand_tilde(Path::new("/a/~/b")), Path::new("/a/~/b"));
    if let Ok(home) = std::env::var("HOME") {
      assert_eq!(expand_tilde(Path::new("~/x.db")), Path::new(&home).join("x.db"));
    }
  }
}
