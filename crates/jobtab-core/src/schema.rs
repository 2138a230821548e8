//! Table schemas: declared fields, their column types and logical kinds.
//!
//! A schema definition is a JSON or YAML document:
//!
//! ```json
//! {
//!   "fields": [["start", "timestamp"], ["flag", "integer"], ["payload", "text"]],
//!   "metadata": {"payload": "json"}
//! }
//! ```
//!
//! Fields absent from `metadata` use the identity transformer. A schema is
//! immutable once loaded; only its effects (table layout, metadata rows) are
//! persisted.

use std::{collections::BTreeMap, path::Path};

use serde::Deserialize;

use crate::{
  Error, Result,
  transform::{self, LogicalKind},
};

/// Name of the implicit primary-key column.
pub const ID_COLUMN: &str = "id";

/// Container encoding of a schema definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionFormat {
  Json,
  Yaml,
}

impl DefinitionFormat {
  /// Pick the format from a file suffix (`.json`, `.yaml`, `.yml`).
  pub fn from_path(path: &Path) -> Result<Self> {
    match path.extension().and_then(|e| e.to_str()) {
      Some("json") => Ok(Self::Json),
      Some("yaml" | "yml") => Ok(Self::Yaml),
      _ => Err(Error::Format(format!(
        "unrecognised schema file type: {}",
        path.display()
      ))),
    }
  }
}

/// A declared column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
  pub name:          String,
  /// Column type handed to the database at table creation.
  pub physical_type: String,
}

#[derive(Debug, Clone)]
pub struct Schema {
  fields:   Vec<FieldDef>,
  metadata: BTreeMap<String, LogicalKind>,
}

/// Wire shape of a definition document.
#[derive(Deserialize)]
struct Definition {
  fields:   Vec<(String, String)>,
  #[serde(default)]
  metadata: BTreeMap<String, String>,
}

impl Schema {
  /// Build and validate a schema from field declarations and logical kinds.
  pub fn new<F, N, T, M>(fields: F, metadata: M) -> Result<Self>
  where
    F: IntoIterator<Item = (N, T)>,
    N: Into<String>,
    T: Into<String>,
    M: IntoIterator<Item = (N, LogicalKind)>,
  {
    let fields: Vec<FieldDef> = fields
      .into_iter()
      .map(|(name, ty)| FieldDef { name: name.into(), physical_type: ty.into() })
      .collect();
    let metadata = metadata
      .into_iter()
      .map(|(name, kind)| (name.into(), kind))
      .collect();

    let schema = Self { fields, metadata };
    schema.validate()?;
    Ok(schema)
  }

  /// Parse a definition document.
  pub fn load(text: &str, format: DefinitionFormat) -> Result<Self> {
    let def: Definition = match format {
      DefinitionFormat::Json => {
        serde_json::from_str(text).map_err(|e| Error::Format(e.to_string()))?
      }
      DefinitionFormat::Yaml => parse_yaml(text)?,
    };

    let metadata = def
      .metadata
      .into_iter()
      .map(|(name, token)| Ok((name, token.parse::<LogicalKind>()?)))
      .collect::<Result<Vec<_>>>()?;
    Self::new(def.fields, metadata)
  }

  /// Read a definition file, choosing the format from its suffix.
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let format = DefinitionFormat::from_path(path)?;
    let text = std::fs::read_to_string(path)?;
    Self::load(&text, format)
  }

  pub fn fields(&self) -> &[FieldDef] { &self.fields }

  pub fn field(&self, name: &str) -> Option<&FieldDef> {
    self.fields.iter().find(|f| f.name == name)
  }

  /// Logical kind of `field`; identity unless declared otherwise.
  pub fn kind_of(&self, field: &str) -> LogicalKind {
    self.metadata.get(field).copied().unwrap_or_default()
  }

  /// Fields whose kind differs from identity, in name order. These are the
  /// rows of the metadata table.
  pub fn declared_kinds(&self) -> impl Iterator<Item = (&str, LogicalKind)> {
    self
      .metadata
      .iter()
      .filter(|(_, kind)| !kind.is_identity())
      .map(|(name, kind)| (name.as_str(), *kind))
  }

  fn validate(&self) -> Result<()> {
    if self.fields.is_empty() {
      return Err(Error::Format("schema declares no fields".into()));
    }

    for (i, field) in self.fields.iter().enumerate() {
      if field.name.is_empty() {
        return Err(Error::Format(format!("field #{i} has an empty name")));
      }
      if field.name.eq_ignore_ascii_case(ID_COLUMN) {
        return Err(Error::Format(format!(
          "field name {:?} is reserved for the job id",
          field.name
        )));
      }
      if self.fields[..i].iter().any(|f| f.name.eq_ignore_ascii_case(&field.name)) {
        return Err(Error::Format(format!("duplicate field {:?}", field.name)));
      }
      if !is_valid_type_name(&field.physical_type) {
        return Err(Error::Format(format!(
          "field {:?} has invalid column type {:?}",
          field.name, field.physical_type
        )));
      }
    }

    for (name, kind) in &self.metadata {
      if self.field(name).is_none() {
        return Err(Error::Format(format!("metadata names undeclared field {name:?}")));
      }
      transform::resolve(*kind)?;
    }

    Ok(())
  }
}

/// Column types are spliced into DDL, so only plain type names such as
/// `integer`, `varchar(32)` or `decimal(10, 2)` are allowed. Parentheses
/// must balance and commas may only appear inside them, otherwise a type
/// could close the column definition and start another.
fn is_valid_type_name(ty: &str) -> bool {
  if ty.trim().is_empty() {
    return false;
  }
  let mut depth = 0usize;
  for c in ty.chars() {
    match c {
      '(' => depth += 1,
      ')' => match depth.checked_sub(1) {
        Some(d) => depth = d,
        None => return false,
      },
      ',' if depth == 0 => return false,
      c if c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | ',') => {}
      _ => return false,
    }
  }
  depth == 0
}

#[cfg(feature = "yaml")]
fn parse_yaml(text: &str) -> Result<Definition> {
  serde_yaml::from_str(text).map_err(|e| Error::Format(e.to_string()))
}

#[cfg(not(feature = "yaml"))]
fn parse_yaml(_text: &str) -> Result<Definition> {
  Err(Error::UnavailableBackend(LogicalKind::Yaml))
}

#[cfg(test)]
mod tests {
  use super::*;

  const JSON_DEF: &str = r#"{
    "fields": [["start", "timestamp"], ["flag", "integer"], ["payload", "text"]],
    "metadata": {"payload": "json"}
  }"#;

  #[test]
  fn load_json_definition() {
    let schema = Schema::load(JSON_DEF, DefinitionFormat::Json).unwrap();
    let names: Vec<_> = schema.fields().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["start", "flag", "payload"]);
    assert_eq!(schema.field("flag").unwrap().physical_type, "integer");
    assert_eq!(schema.kind_of("payload"), LogicalKind::Json);
    assert_eq!(schema.kind_of("start"), LogicalKind::Identity);
  }

  #[cfg(feature = "yaml")]
  #[test]
  fn load_yaml_definition() {
    let yaml = "
fields:
  - [start, timestamp]
  - [blob, blob]
metadata:
  blob: pickle
";
    let schema = Schema::load(yaml, DefinitionFormat::Yaml).unwrap();
    assert_eq!(schema.fields().len(), 2);
    assert_eq!(schema.kind_of("blob"), LogicalKind::Binary);
  }

  #[test]
  fn metadata_is_optional() {
    let schema =
      Schema::load(r#"{"fields": [["a", "integer"]]}"#, DefinitionFormat::Json).unwrap();
    assert_eq!(schema.declared_kinds().count(), 0);
  }

  #[test]
  fn identity_entries_are_not_declared_kinds() {
    let schema = Schema::new(
      [("a", "text"), ("b", "text")],
      [("a", LogicalKind::Identity), ("b", LogicalKind::Json)],
    )
    .unwrap();
    let kinds: Vec<_> = schema.declared_kinds().collect();
    assert_eq!(kinds, [("b", LogicalKind::Json)]);
  }

  #[test]
  fn unknown_suffix_is_a_format_error() {
    let err = DefinitionFormat::from_path(Path::new("schema.toml")).unwrap_err();
    assert!(matches!(err, Error::Format(_)));
  }

  #[test]
  fn malformed_document_is_a_format_error() {
    let err = Schema::load("{\"fields\": 3}", DefinitionFormat::Json).unwrap_err();
    assert!(matches!(err, Error::Format(_)));
  }

  #[test]
  fn unknown_kind_is_rejected() {
    let err = Schema::load(
      r#"{"fields": [["g", "text"]], "metadata": {"g": "xml"}}"#,
      DefinitionFormat::Json,
    )
    .unwrap_err();
    assert!(matches!(err, Error::UnknownFieldType(ref t) if t == "xml"));
  }

  #[test]
  fn rejects_duplicates_reserved_names_and_odd_types() {
    for fields in [
      vec![("a", "text"), ("A", "integer")],
      vec![("id", "integer")],
      vec![("a", "text); DROP TABLE x; --")],
      vec![("", "text")],
      vec![("a", "integer, extra text")],
      vec![("a", "decimal(10, 2")],
      vec![("a", "decimal)10, 2(")],
      vec![("a", "integer), (b text")],
    ] {
      let err = Schema::new(fields, []).unwrap_err();
      assert!(matches!(err, Error::Format(_)), "{err}");
    }
  }

  #[test]
  fn metadata_for_undeclared_field_is_rejected() {
    let err = Schema::new([("a", "text")], [("b", LogicalKind::Json)]).unwrap_err();
    assert!(matches!(err, Error::Format(_)));
  }

  #[test]
  fn accepts_parameterised_types() {
    Schema::new([("price", "decimal(10, 2)"), ("name", "varchar(32)")], []).unwrap();
  }
}
