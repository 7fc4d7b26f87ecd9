//! Workflow manifest access.
//!
//! The manifest is a TOML (default) or JSON document at the root of the
//! source tree. Besides free-form metadata it carries `name`, `version` and a
//! `variables` table whose entries are either a bare string or a table with
//! `value` and an optional `export` flag. Names listed in the top-level
//! `variablesdontexport` array are non-exportable too.
//!
//! Rewrites keep the document's key order and every field this module does
//! not touch. TOML documents also keep their comments and the inline or
//! table form of each variable.

pub mod editor;
pub mod sanitize;

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use toml_edit::{DocumentMut, InlineTable, Item, TableLike, Value};

use crate::error::{ErrorContext, PackError, Result};

pub use editor::{SetVariable, VariableEditor, VariableOp};
pub use sanitize::{sanitize, SanitizeReport};

pub const DEFAULT_MANIFEST: &str = "workflow.toml";
pub const VARIABLES_KEY: &str = "variables";
pub const DONT_EXPORT_KEY: &str = "variablesdontexport";

type JsonMap = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Toml,
    Json,
}

impl ManifestFormat {
    /// `.json` selects JSON, anything else TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ManifestFormat::Json,
            _ => ManifestFormat::Toml,
        }
    }
}

/// A manifest variable as seen by the exporter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Variable {
    pub name: String,
    pub value: String,
    /// Explicit `export` flag, if the entry has one
    pub export: Option<bool>,
    /// Listed in `variablesdontexport`
    pub listed_dont_export: bool,
}

impl Variable {
    /// A missing flag means exportable.
    pub fn is_exportable(&self) -> bool {
        self.export != Some(false) && !self.listed_dont_export
    }
}

#[derive(Debug, Clone)]
enum Document {
    Toml(DocumentMut),
    Json(JsonMap),
}

#[derive(Debug, Clone)]
pub struct WorkflowManifest {
    path: Option<PathBuf>,
    document: Document,
}

impl WorkflowManifest {
    /// Read and parse the manifest at `path`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_io_context(|| format!("reading manifest {}", path.display()))?;

        let mut manifest = Self::parse(&content, ManifestFormat::from_path(path))
            .map_err(|e| match e {
                PackError::Parse { message, .. } => PackError::Parse {
                    path: Some(path.to_path_buf()),
                    message,
                },
                other => other,
            })?;
        manifest.path = Some(path.to_path_buf());
        Ok(manifest)
    }

    pub fn parse(content: &str, format: ManifestFormat) -> Result<Self> {
        let document = match format {
            ManifestFormat::Toml => {
                let doc = content.parse::<DocumentMut>().map_err(|e| PackError::Parse {
                    path: None,
                    message: e.to_string(),
                })?;
                Document::Toml(doc)
            }
            ManifestFormat::Json => {
                let value: serde_json::Value =
                    serde_json::from_str(content).map_err(|e| PackError::Parse {
                        path: None,
                        message: e.to_string(),
                    })?;
                match value {
                    serde_json::Value::Object(map) => Document::Json(map),
                    _ => {
                        return Err(PackError::Parse {
                            path: None,
                            message: "top level must be an object".to_string(),
                        })
                    }
                }
            }
        };

        let manifest = Self { path: None, document };
        manifest.variables()?;
        Ok(manifest)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn format(&self) -> ManifestFormat {
        match self.document {
            Document::Toml(_) => ManifestFormat::Toml,
            Document::Json(_) => ManifestFormat::Json,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.top_level_str("name")
    }

    pub fn version(&self) -> Option<&str> {
        self.top_level_str("version")
    }

    pub fn bundle_id(&self) -> Option<&str> {
        self.top_level_str("bundleid")
    }

    /// `<name>-<version>`, validated for use as a file name
    pub fn archive_stem(&self) -> Result<String> {
        let name = required_component("name", self.name())?;
        let version = required_component("version", self.version())?;
        Ok(format!("{}-{}", name, version))
    }

    /// Variables in document order
    pub fn variables(&self) -> Result<Vec<Variable>> {
        let dont_export = self.dont_export_list()?;

        let mut variables = Vec::new();
        match &self.document {
            Document::Toml(doc) => {
                let Some(table) = toml_variables(doc)? else {
                    return Ok(variables);
                };
                for (name, entry) in table.iter() {
                    let (value, export) = if let Some(s) = entry.as_str() {
                        (s.to_string(), None)
                    } else if let Some(t) = entry.as_table_like() {
                        let value = match t.get("value") {
                            None => String::new(),
                            Some(item) => item
                                .as_str()
                                .map(str::to_string)
                                .ok_or_else(|| bad_variable(name, "value must be a string"))?,
                        };
                        let export = match t.get("export") {
                            None => None,
                            Some(item) => Some(
                                item.as_bool()
                                    .ok_or_else(|| bad_variable(name, "export must be a boolean"))?,
                            ),
                        };
                        (value, export)
                    } else {
                        return Err(bad_variable(name, "must be a string or a table"));
                    };
                    variables.push(Variable {
                        listed_dont_export: dont_export.iter().any(|n| n == name),
                        name: name.to_string(),
                        value,
                        export,
                    });
                }
            }
            Document::Json(doc) => {
                let Some(map) = json_variables(doc)? else {
                    return Ok(variables);
                };
                for (name, entry) in map {
                    let (value, export) = match entry {
                        serde_json::Value::String(s) => (s.clone(), None),
                        serde_json::Value::Object(o) => {
                            let value = match o.get("value") {
                                None => String::new(),
                                Some(serde_json::Value::String(s)) => s.clone(),
                                Some(_) => return Err(bad_variable(name, "value must be a string")),
                            };
                            let export = match o.get("export") {
                                None => None,
                                Some(serde_json::Value::Bool(b)) => Some(*b),
                                Some(_) => return Err(bad_variable(name, "export must be a boolean")),
                            };
                            (value, export)
                        }
                        _ => return Err(bad_variable(name, "must be a string or an object")),
                    };
                    variables.push(Variable {
                        listed_dont_export: dont_export.contains(name),
                        name: name.clone(),
                        value,
                        export,
                    });
                }
            }
        }
        Ok(variables)
    }

    pub fn variable(&self, name: &str) -> Result<Option<Variable>> {
        Ok(self.variables()?.into_iter().find(|v| v.name == name))
    }

    /// Set a variable's value.
    ///
    /// With `exportable` of `None` an existing flag is kept and a new entry is
    /// written as a bare value. With `Some(_)` the entry gets an explicit flag
    /// and the name is dropped from `variablesdontexport`.
    pub fn set_variable(&mut self, name: &str, value: &str, exportable: Option<bool>) -> Result<()> {
        if name.is_empty() {
            return Err(PackError::invalid_argument("variable name", "", "must not be empty"));
        }

        match &mut self.document {
            Document::Toml(doc) => {
                let table = toml_variables_mut(doc)?;
                let existing_table = table.get(name).is_some_and(Item::is_table_like);
                if existing_table {
                    if let Some(entry) = table.get_mut(name).and_then(Item::as_table_like_mut) {
                        set_toml_value(entry, "value", Value::from(value));
                        if let Some(flag) = exportable {
                            set_toml_value(entry, "export", Value::from(flag));
                        }
                    }
                } else if let Some(flag) = exportable {
                    let mut entry = InlineTable::new();
                    entry.insert("value", Value::from(value));
                    entry.insert("export", Value::from(flag));
                    match table.get_mut(name) {
                        Some(item) => replace_toml_value(item, Value::InlineTable(entry)),
                        None => {
                            table.insert(name, Item::Value(Value::InlineTable(entry)));
                        }
                    }
                } else {
                    set_toml_value(table, name, Value::from(value));
                }
            }
            Document::Json(doc) => {
                let map = json_variables_mut(doc)?;
                let entry = match (map.get(name), exportable) {
                    (_, Some(flag)) => serde_json::json!({ "value": value, "export": flag }),
                    (Some(serde_json::Value::Object(existing)), None) => {
                        let mut o = existing.clone();
                        o.insert("value".to_string(), serde_json::Value::String(value.to_string()));
                        serde_json::Value::Object(o)
                    }
                    (_, None) => serde_json::Value::String(value.to_string()),
                };
                map.insert(name.to_string(), entry);
            }
        }

        if exportable.is_some() {
            self.unlist_dont_export(name)?;
        }
        Ok(())
    }

    /// Remove a variable. Returns whether it existed.
    pub fn remove_variable(&mut self, name: &str) -> Result<bool> {
        let removed = match &mut self.document {
            Document::Toml(doc) => doc
                .get_mut(VARIABLES_KEY)
                .and_then(Item::as_table_like_mut)
                .is_some_and(|table| table.remove(name).is_some()),
            Document::Json(doc) => match doc.get_mut(VARIABLES_KEY) {
                Some(serde_json::Value::Object(map)) => map.shift_remove(name).is_some(),
                _ => false,
            },
        };
        self.unlist_dont_export(name)?;
        Ok(removed)
    }

    /// Replace a variable's value with `""`, keeping its form and flag.
    pub(crate) fn clear_value(&mut self, name: &str) -> Result<()> {
        match &mut self.document {
            Document::Toml(doc) => {
                let table = toml_variables_mut(doc)?;
                match table.get_mut(name) {
                    Some(item) if item.is_table_like() => {
                        if let Some(entry) = item.as_table_like_mut() {
                            set_toml_value(entry, "value", Value::from(""));
                        }
                    }
                    Some(item) => replace_toml_value(item, Value::from("")),
                    None => {}
                }
            }
            Document::Json(doc) => {
                let map = json_variables_mut(doc)?;
                match map.get_mut(name) {
                    Some(serde_json::Value::Object(o)) => {
                        o.insert("value".to_string(), serde_json::Value::String(String::new()));
                    }
                    Some(other) => *other = serde_json::Value::String(String::new()),
                    None => {}
                }
            }
        }
        Ok(())
    }

    /// Serialize the document in its own format
    pub fn render(&self) -> Result<String> {
        match &self.document {
            Document::Toml(doc) => Ok(doc.to_string()),
            Document::Json(doc) => serde_json::to_string_pretty(doc)
                .map(|mut s| {
                    s.push('\n');
                    s
                })
                .map_err(|e| PackError::Parse {
                    path: self.path.clone(),
                    message: format!("serializing manifest: {}", e),
                }),
        }
    }

    /// Write back to the path the manifest was loaded from
    pub fn save(&self) -> Result<()> {
        let path = self.path.clone().ok_or_else(|| {
            PackError::invalid_argument("manifest path", "", "manifest was not loaded from a file")
        })?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = self.render()?;
        fs::write(path, content).with_io_context(|| format!("writing manifest {}", path.display()))
    }

    fn top_level_str(&self, key: &str) -> Option<&str> {
        match &self.document {
            Document::Toml(doc) => doc.get(key).and_then(|v| v.as_str()),
            Document::Json(doc) => doc.get(key).and_then(|v| v.as_str()),
        }
    }

    fn dont_export_list(&self) -> Result<Vec<String>> {
        let invalid = || PackError::Parse {
            path: self.path.clone(),
            message: format!("'{}' must be an array of strings", DONT_EXPORT_KEY),
        };

        match &self.document {
            Document::Toml(doc) => match doc.get(DONT_EXPORT_KEY) {
                None => Ok(Vec::new()),
                Some(item) => item
                    .as_array()
                    .ok_or_else(invalid)?
                    .iter()
                    .map(|v| v.as_str().map(str::to_string).ok_or_else(invalid))
                    .collect(),
            },
            Document::Json(doc) => match doc.get(DONT_EXPORT_KEY) {
                None => Ok(Vec::new()),
                Some(serde_json::Value::Array(items)) => items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string).ok_or_else(invalid))
                    .collect(),
                Some(_) => Err(invalid()),
            },
        }
    }

    fn unlist_dont_export(&mut self, name: &str) -> Result<()> {
        match &mut self.document {
            Document::Toml(doc) => {
                if let Some(items) = doc.get_mut(DONT_EXPORT_KEY).and_then(Item::as_array_mut) {
                    items.retain(|v| v.as_str() != Some(name));
                }
            }
            Document::Json(doc) => {
                if let Some(serde_json::Value::Array(items)) = doc.get_mut(DONT_EXPORT_KEY) {
                    items.retain(|v| v.as_str() != Some(name));
                }
            }
        }
        Ok(())
    }
}

fn required_component<'a>(field: &str, value: Option<&'a str>) -> Result<&'a str> {
    let value = match value.map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => return Err(PackError::manifest(field, "is missing or empty")),
    };

    if value.contains(['/', '\\', '\0']) || value == "." || value == ".." {
        return Err(PackError::manifest(
            field,
            format!("'{}' cannot be used in a file name", value),
        ));
    }
    Ok(value)
}

fn bad_variable(name: &str, reason: &str) -> PackError {
    PackError::Parse {
        path: None,
        message: format!("variable '{}': {}", name, reason),
    }
}

fn not_a_table() -> PackError {
    PackError::Parse {
        path: None,
        message: format!("'{}' must be a table", VARIABLES_KEY),
    }
}

fn toml_variables(doc: &DocumentMut) -> Result<Option<&dyn TableLike>> {
    match doc.get(VARIABLES_KEY) {
        None => Ok(None),
        Some(item) => item.as_table_like().map(Some).ok_or_else(not_a_table),
    }
}

fn toml_variables_mut(doc: &mut DocumentMut) -> Result<&mut dyn TableLike> {
    doc.entry(VARIABLES_KEY)
        .or_insert(toml_edit::table())
        .as_table_like_mut()
        .ok_or_else(not_a_table)
}

/// Swap in `value`, keeping the whitespace and trailing comment around the old one
fn replace_toml_value(item: &mut Item, mut value: Value) {
    if let Some(old) = item.as_value() {
        *value.decor_mut() = old.decor().clone();
    }
    *item = Item::Value(value);
}

fn set_toml_value(table: &mut dyn TableLike, key: &str, value: Value) {
    match table.get_mut(key) {
        Some(item) => replace_toml_value(item, value),
        None => {
            table.insert(key, Item::Value(value));
        }
    }
}

fn json_variables(doc: &JsonMap) -> Result<Option<&JsonMap>> {
    match doc.get(VARIABLES_KEY) {
        None => Ok(None),
        Some(serde_json::Value::Object(o)) => Ok(Some(o)),
        Some(_) => Err(PackError::Parse {
            path: None,
            message: format!("'{}' must be an object", VARIABLES_KEY),
        }),
    }
}

fn json_variables_mut(doc: &mut JsonMap) -> Result<&mut JsonMap> {
    let entry = doc
        .entry(VARIABLES_KEY.to_string())
        .or_insert_with(|| serde_json::Value::Object(JsonMap::new()));
    match entry {
        serde_json::Value::Object(o) => Ok(o),
        _ => Err(PackError::Parse {
            path: None,
            message: format!("'{}' must be an object", VARIABLES_KEY),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML_MANIFEST: &str = r#"
name = "Demo"
version = "1.2.0"
bundleid = "com.example.demo"
variablesdontexport = ["LEGACY"]

[variables]
GREETING = "hello"
LEGACY = "old-token"

[variables.API_KEY]
value = "secret"
export = false

[variables.REGION]
value = "eu"
export = true
"#;

    const JSON_MANIFEST: &str = r#"{
  "name": "Demo",
  "version": "1.2.0",
  "variables": {
    "API_KEY": { "value": "secret", "export": false },
    "GREETING": "hello"
  }
}"#;

    #[test]
    fn test_toml_fields_and_variables() {
        let manifest = WorkflowManifest::parse(TOML_MANIFEST, ManifestFormat::Toml).unwrap();
        assert_eq!(manifest.name(), Some("Demo"));
        assert_eq!(manifest.version(), Some("1.2.0"));
        assert_eq!(manifest.bundle_id(), Some("com.example.demo"));
        assert_eq!(manifest.archive_stem().unwrap(), "Demo-1.2.0");

        let vars = manifest.variables().unwrap();
        let names: Vec<_> = vars.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["GREETING", "LEGACY", "API_KEY", "REGION"]);

        let exportable: Vec<_> = vars.iter().map(|v| v.is_exportable()).collect();
        assert_eq!(exportable, vec![true, false, false, true]);
        assert_eq!(vars[0].export, None);
    }

    #[test]
    fn test_json_variables() {
        let manifest = WorkflowManifest::parse(JSON_MANIFEST, ManifestFormat::Json).unwrap();
        let vars = manifest.variables().unwrap();
        assert_eq!(vars[0].name, "API_KEY");
        assert!(!vars[0].is_exportable());
        assert!(vars[1].is_exportable());
    }

    #[test]
    fn test_parse_errors() {
        for (content, format) in [
            ("name = ", ManifestFormat::Toml),
            ("[1, 2]", ManifestFormat::Json),
            ("{ not json", ManifestFormat::Json),
            ("variables = 3", ManifestFormat::Toml),
            ("[variables]\nX = 3", ManifestFormat::Toml),
            ("[variables.X]\nvalue = 'a'\nexport = 'no'", ManifestFormat::Toml),
            ("variablesdontexport = 'X'", ManifestFormat::Toml),
        ] {
            let err = WorkflowManifest::parse(content, format).unwrap_err();
            assert_eq!(err.kind(), "ParseError", "content: {}", content);
        }
    }

    #[test]
    fn test_archive_stem_validation() {
        for content in [
            "version = '1.0'",
            "name = ''\nversion = '1.0'",
            "name = 'Demo'\nversion = '   '",
            "name = 'a/b'\nversion = '1.0'",
            "name = 'a\\b'\nversion = '1.0'",
            "name = \"a\\u0000b\"\nversion = '1.0'",
            "name = '..'\nversion = '1.0'",
            "name = 'Demo'\nversion = 1.0",
        ] {
            let manifest = WorkflowManifest::parse(content, ManifestFormat::Toml).unwrap();
            let err = manifest.archive_stem().unwrap_err();
            assert_eq!(err.kind(), "ManifestError", "content: {}", content);
        }
    }

    #[test]
    fn test_set_and_remove_variable() {
        let mut manifest = WorkflowManifest::parse(TOML_MANIFEST, ManifestFormat::Toml).unwrap();

        manifest.set_variable("GREETING", "hi", None).unwrap();
        manifest.set_variable("API_KEY", "rotated", None).unwrap();
        manifest.set_variable("LEGACY", "kept", Some(true)).unwrap();
        manifest.set_variable("NEW", "n", Some(false)).unwrap();
        assert!(manifest.remove_variable("REGION").unwrap());
        assert!(!manifest.remove_variable("REGION").unwrap());

        let reparsed =
            WorkflowManifest::parse(&manifest.render().unwrap(), ManifestFormat::Toml).unwrap();
        let greeting = reparsed.variable("GREETING").unwrap().unwrap();
        assert_eq!((greeting.value.as_str(), greeting.export), ("hi", None));

        let api_key = reparsed.variable("API_KEY").unwrap().unwrap();
        assert_eq!((api_key.value.as_str(), api_key.export), ("rotated", Some(false)));

        let legacy = reparsed.variable("LEGACY").unwrap().unwrap();
        assert!(legacy.is_exportable());
        assert!(!legacy.listed_dont_export);

        assert!(!reparsed.variable("NEW").unwrap().unwrap().is_exportable());
        assert!(reparsed.variable("REGION").unwrap().is_none());
        assert_eq!(reparsed.bundle_id(), Some("com.example.demo"));
    }

    #[test]
    fn test_toml_edits_keep_layout() {
        let content = "# demo workflow\nname = \"Demo\"\nversion = \"1\"\n\n[variables]\nTOKEN = { value = \"t\", export = false }\nOPEN = \"o\" # shown to users\n";
        let mut manifest = WorkflowManifest::parse(content, ManifestFormat::Toml).unwrap();
        manifest.set_variable("OPEN", "p", None).unwrap();
        manifest.set_variable("TOKEN", "u", None).unwrap();
        manifest.set_variable("EXTRA", "e", Some(false)).unwrap();

        let rendered = manifest.render().unwrap();
        assert!(rendered.starts_with("# demo workflow\n"));
        assert!(rendered.contains("TOKEN = { value = \"u\", export = false }\n"), "{}", rendered);
        assert!(rendered.contains("OPEN = \"p\" # shown to users\n"), "{}", rendered);

        let names: Vec<_> = manifest.variables().unwrap().into_iter().map(|v| v.name).collect();
        assert_eq!(names, vec!["TOKEN", "OPEN", "EXTRA"]);
    }

    #[test]
    fn test_empty_variable_name_rejected() {
        let mut manifest = WorkflowManifest::parse(TOML_MANIFEST, ManifestFormat::Toml).unwrap();
        let err = manifest.set_variable("", "x", None).unwrap_err();
        assert_eq!(err.kind(), "InvalidArgument");
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ManifestFormat::from_path(Path::new("info.json")), ManifestFormat::Json);
        assert_eq!(ManifestFormat::from_path(Path::new("workflow.toml")), ManifestFormat::Toml);
        assert_eq!(ManifestFormat::from_path(Path::new("manifest")), ManifestFormat::Toml);
    }
}
