//! Source connectors shipped with the command-line tool.
//!
//! `json_file` reads table exports of the form
//! `{ "tables": [ { "name", "properties", "columns": [{ "name", "dataType" }] } ] }`
//! from a single file or from every `*.json` file beneath a directory.

use std::fs;
use std::path::{Path, PathBuf};

use ingestion::{DiscoveredEntity, EntityType, Error, SourceConfig, SourceConnector, SourceRegistry};
use serde_json::{Map, Value};
use walkdir::WalkDir;

/// Connector registry for a run: the library defaults plus `json_file`.
pub fn registry() -> SourceRegistry {
    let mut registry = SourceRegistry::with_defaults();
    registry.register("json_file", JsonFileSource::from_config);
    registry
}

/// Tables read from JSON export files.
#[derive(Debug)]
pub struct JsonFileSource {
    name: String,
    path: PathBuf,
    tables: Option<Vec<DiscoveredEntity>>,
}

impl JsonFileSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            tables: None,
        }
    }

    /// Constructor registered under the `json_file` tag; reads the `path` property.
    pub fn from_config(config: &SourceConfig) -> ingestion::Result<Box<dyn SourceConnector>> {
        let path = config
            .properties
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::source(&config.name, "missing string property 'path'"))?;
        let path = shellexpand::tilde(path).into_owned();
        Ok(Box::new(Self::new(&config.name, path)))
    }

    /// Files to read, in a stable order.
    fn files(&self) -> ingestion::Result<Vec<PathBuf>> {
        if self.path.is_file() {
            return Ok(vec![self.path.clone()]);
        }
        if !self.path.is_dir() {
            return Err(self.error(format!("{} does not exist", self.path.display())));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.path).sort_by_file_name() {
            let entry = entry.map_err(|e| self.error(e.to_string()))?;
            if entry.file_type().is_file() && is_json(entry.path()) {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    fn read(&self, path: &Path) -> ingestion::Result<Vec<DiscoveredEntity>> {
        let content = fs::read_to_string(path)
            .map_err(|e| self.error(format!("could not read {}: {e}", path.display())))?;
        let document: Value = serde_json::from_str(&content)
            .map_err(|e| self.error(format!("invalid JSON in {}: {e}", path.display())))?;
        DiscoveredEntity::parse_tables(&document)
            .map_err(|e| self.error(format!("{}: {e}", path.display())))
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::source(&self.name, message)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
        && !path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with('.'))
}

impl SourceConnector for JsonFileSource {
    fn source_type(&self) -> &str {
        "json_file"
    }

    fn connect(&mut self) -> ingestion::Result<()> {
        let mut tables = Vec::new();
        for file in self.files()? {
            log::debug!("Reading {}", file.display());
            tables.extend(self.read(&file)?);
        }
        log::debug!("Source '{}' holds {} tables", self.name, tables.len());
        self.tables = Some(tables);
        Ok(())
    }

    fn disconnect(&mut self) -> ingestion::Result<()> {
        self.tables = None;
        Ok(())
    }

    fn discover(
        &self,
        entity_type: EntityType,
        options: &Map<String, Value>,
    ) -> ingestion::Result<Vec<DiscoveredEntity>> {
        let tables = self
            .tables
            .as_ref()
            .ok_or_else(|| self.error("discover called before connect"))?;
        if entity_type != EntityType::Table {
            return Ok(Vec::new());
        }
        // `min_columns` drops exports too small to be worth cataloguing
        let min_columns = options.get("min_columns").and_then(Value::as_u64).unwrap_or(0);
        Ok(tables
            .iter()
            .filter(|t| t.shape.as_ref().map_or(0, |s| s.len() as u64) >= min_columns)
            .cloned()
            .collect())
    }
}
