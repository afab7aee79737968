//! Source connectors and discovery.
//!
//! A discovery declaration names a configured source. Before resolution
//! the engine asks that source's connector for the entities it can see,
//! filters them by name, and turns each survivor into a concrete
//! declaration.

use std::collections::HashMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::schema::StructuralShape;
use crate::types::{DiscoveryRef, EntityType};

/// A configured source instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Name used by discovery declarations.
    pub name: String,
    /// Connector tag in the [`SourceRegistry`].
    #[serde(rename = "type")]
    pub source_type: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// A raw entity seen by a source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DiscoveredEntity {
    pub name: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default, rename = "columns", skip_serializing_if = "Option::is_none")]
    pub shape: Option<StructuralShape>,
}

impl DiscoveredEntity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_shape(mut self, shape: StructuralShape) -> Self {
        self.shape = Some(shape);
        self
    }

    /// Parse the `{ "tables": [...] }` document format shared by the
    /// in-memory and file-backed connectors.
    ///
    /// # Errors
    ///
    /// Fails if `tables` is present but not a list of entities.
    pub fn parse_tables(document: &Value) -> Result<Vec<Self>> {
        match document.get("tables") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(tables) => Ok(serde_json::from_value(tables.clone())?),
        }
    }
}

/// Name filter compiled from a discovery reference.
///
/// Patterns match at the start of the name, as with an anchored regex.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryFilter {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl DiscoveryFilter {
    /// Compile the include and exclude patterns of a discovery reference.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if either pattern does not compile.
    pub fn from_ref(discovery: &DiscoveryRef) -> Result<Self> {
        Ok(Self {
            include: discovery.include_pattern.as_deref().map(compile).transpose()?,
            exclude: discovery.exclude_pattern.as_deref().map(compile).transpose()?,
        })
    }

    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.include.as_ref().is_none_or(|re| re.is_match(name))
            && !self.exclude.as_ref().is_some_and(|re| re.is_match(name))
    }
}

/// Compile a pattern anchored at the start of the input.
///
/// # Errors
///
/// Returns [`Error::InvalidPattern`] for an invalid regex.
pub fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{pattern})")).map_err(|source| Error::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// A connection to an external data source.
pub trait SourceConnector: fmt::Debug {
    /// Connector tag, e.g. `json_file`.
    fn source_type(&self) -> &str;

    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Entities of `entity_type` visible in the source.
    ///
    /// `options` are the connector-specific `filter` settings of the
    /// discovery declaration.
    fn discover(
        &self,
        entity_type: EntityType,
        options: &Map<String, Value>,
    ) -> Result<Vec<DiscoveredEntity>>;
}

/// Builds a connector from its configuration.
pub type SourceConstructor = fn(&SourceConfig) -> Result<Box<dyn SourceConnector>>;

/// Explicit mapping from source type tag to connector constructor.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    constructors: HashMap<String, SourceConstructor>,
}

impl SourceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in `memory` connector.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("memory", MemorySource::from_config);
        registry
    }

    pub fn register(&mut self, source_type: impl Into<String>, constructor: SourceConstructor) {
        self.constructors.insert(source_type.into(), constructor);
    }

    #[must_use]
    pub fn contains(&self, source_type: &str) -> bool {
        self.constructors.contains_key(source_type)
    }

    /// Registered tags, sorted.
    #[must_use]
    pub fn registered_types(&self) -> Vec<&str> {
        let mut types: Vec<_> = self.constructors.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Construct the connector for a configured source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SourceNotRegistered`] for an unknown tag, or the
    /// constructor's own error.
    pub fn create(&self, config: &SourceConfig) -> Result<Box<dyn SourceConnector>> {
        let constructor = self
            .constructors
            .get(&config.source_type)
            .ok_or_else(|| Error::SourceNotRegistered(config.source_type.clone()))?;
        constructor(config)
    }
}

/// Source whose entities are given inline.
///
/// Built from a source config whose properties hold a `tables` list; only
/// table discovery returns anything.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    tables: Vec<DiscoveredEntity>,
}

impl MemorySource {
    #[must_use]
    pub fn new(tables: Vec<DiscoveredEntity>) -> Self {
        Self { tables }
    }

    /// Constructor registered under the `memory` tag.
    ///
    /// # Errors
    ///
    /// Fails if the `tables` property is malformed.
    pub fn from_config(config: &SourceConfig) -> Result<Box<dyn SourceConnector>> {
        let document = Value::Object(config.properties.clone());
        let tables = DiscoveredEntity::parse_tables(&document)
            .map_err(|e| Error::source(&config.name, e.to_string()))?;
        Ok(Box::new(Self::new(tables)))
    }
}

impl SourceConnector for MemorySource {
    fn source_type(&self) -> &str {
        "memory"
    }

    fn discover(
        &self,
        entity_type: EntityType,
        _options: &Map<String, Value>,
    ) -> Result<Vec<DiscoveredEntity>> {
        if entity_type == EntityType::Table {
            Ok(self.tables.clone())
        } else {
            Ok(Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn memory_config(tables: Value) -> SourceConfig {
        let mut properties = Map::new();
        properties.insert("tables".into(), tables);
        SourceConfig {
            name: "inline".into(),
            source_type: "memory".into(),
            properties,
        }
    }

    #[test]
    fn test_patterns_are_anchored_at_start() {
        let filter = DiscoveryFilter::from_ref(&DiscoveryRef::new("s").include("orders")).unwrap();
        assert!(filter.matches("orders"));
        assert!(filter.matches("orders_2024"));
        assert!(!filter.matches("old_orders"));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let discovery = DiscoveryRef::new("s").include("sales_.*").exclude(".*_tmp");
        let filter = DiscoveryFilter::from_ref(&discovery).unwrap();
        assert!(filter.matches("sales_eu"));
        assert!(!filter.matches("sales_eu_tmp"));
        assert!(!filter.matches("hr_people"));
    }

    #[test]
    fn test_no_patterns_matches_everything() {
        let filter = DiscoveryFilter::default();
        assert!(filter.matches("anything"));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = DiscoveryFilter::from_ref(&DiscoveryRef::new("s").include("(")).unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { .. }));
    }

    #[test]
    fn test_registry_creates_memory_source() {
        let registry = SourceRegistry::with_defaults();
        assert_eq!(registry.registered_types(), vec!["memory"]);

        let config = memory_config(json!([
            { "name": "orders", "columns": [{ "name": "id", "dataType": "BIGINT" }] },
            { "name": "customers", "properties": { "description": "CRM export" } }
        ]));
        let source = registry.create(&config).unwrap();
        assert_eq!(source.source_type(), "memory");

        let tables = source.discover(EntityType::Table, &Map::new()).unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].shape.as_ref().unwrap().len(), 1);
        assert_eq!(tables[1].properties["description"], "CRM export");
        assert!(source.discover(EntityType::Database, &Map::new()).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_source_type() {
        let registry = SourceRegistry::new();
        let mut config = memory_config(json!([]));
        config.source_type = "s3".into();
        assert!(matches!(registry.create(&config), Err(Error::SourceNotRegistered(_))));
    }

    #[test]
    fn test_malformed_tables_is_source_error() {
        let err = MemorySource::from_config(&memory_config(json!("nope"))).unwrap_err();
        assert!(matches!(err, Error::Source { .. }));
    }
}
