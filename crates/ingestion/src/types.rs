//! Core data types shared across the ingestion engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::idempotency::IdempotencyMode;
use crate::schema::StructuralShape;

/// The kind of catalog entity a declaration describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    DatabaseService,
    Database,
    DatabaseSchema,
    Table,
    MlModelService,
    MlModel,
}

impl EntityType {
    /// Every built-in entity type, leaf-first.
    pub const ALL: [Self; 6] = [
        Self::DatabaseService,
        Self::Database,
        Self::DatabaseSchema,
        Self::Table,
        Self::MlModelService,
        Self::MlModel,
    ];

    /// The configuration tag for this type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DatabaseService => "database_service",
            Self::Database => "database",
            Self::DatabaseSchema => "database_schema",
            Self::Table => "table",
            Self::MlModelService => "ml_model_service",
            Self::MlModel => "ml_model",
        }
    }

    /// The entity types this type structurally depends on.
    #[must_use]
    pub const fn parent_types(&self) -> &'static [Self] {
        match self {
            Self::DatabaseService | Self::MlModelService => &[],
            Self::Database => &[Self::DatabaseService],
            Self::DatabaseSchema => &[Self::Database],
            Self::Table => &[Self::Database, Self::DatabaseSchema],
            Self::MlModel => &[Self::MlModelService],
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| {
                let known: Vec<_> = Self::ALL.iter().map(Self::as_str).collect();
                format!("unknown entity type '{s}' (expected one of: {})", known.join(", "))
            })
    }
}

/// Identity of an entity within one run: its type plus fully-qualified name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub entity_type: EntityType,
    pub fqn: String,
}

impl EntityKey {
    pub fn new(entity_type: EntityType, fqn: impl Into<String>) -> Self {
        Self {
            entity_type,
            fqn: fqn.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.fqn)
    }
}

/// Reference to a configured source that should expand into declarations.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiscoveryRef {
    /// Name of a configured source.
    pub source: String,
    /// Only names matching this pattern are kept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_pattern: Option<String>,
    /// Names matching this pattern are dropped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_pattern: Option<String>,
    /// Connector-specific options.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub filter: Map<String, Value>,
}

impl DiscoveryRef {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.include_pattern = Some(pattern.into());
        self
    }

    #[must_use]
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_pattern = Some(pattern.into());
        self
    }
}

/// One unit of work: an entity the run should make exist in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDeclaration {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery: Option<DiscoveryRef>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
    /// Per-entity idempotency override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency: Option<IdempotencyMode>,
    /// Structural shape extracted by a source connector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<StructuralShape>,
}

impl EntityDeclaration {
    /// Declare an entity by name.
    pub fn named(entity_type: EntityType, name: impl Into<String>) -> Self {
        Self {
            entity_type,
            name: Some(name.into()),
            discovery: None,
            properties: Map::new(),
            idempotency: None,
            shape: None,
        }
    }

    /// Declare a set of entities to be discovered from a source.
    pub fn discovered(entity_type: EntityType, discovery: DiscoveryRef) -> Self {
        Self {
            entity_type,
            name: None,
            discovery: Some(discovery),
            properties: Map::new(),
            idempotency: None,
            shape: None,
        }
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_idempotency(mut self, mode: IdempotencyMode) -> Self {
        self.idempotency = Some(mode);
        self
    }

    #[must_use]
    pub fn with_shape(mut self, shape: StructuralShape) -> Self {
        self.shape = Some(shape);
        self
    }

    /// Human-readable label used in logs and validation messages.
    #[must_use]
    pub fn label(&self) -> String {
        match (&self.name, &self.discovery) {
            (Some(name), _) => format!("{}:{name}", self.entity_type),
            (None, Some(discovery)) => {
                format!("{}:<discovered from {}>", self.entity_type, discovery.source)
            }
            (None, None) => format!("{}:<unnamed>", self.entity_type),
        }
    }

    /// The declared name, or a validation error if there is none.
    pub fn require_name(&self) -> Result<&str> {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::validation(self.label(), "missing entity name"))
    }

    /// A string property, if present.
    ///
    /// Non-string values are reported as validation errors rather than
    /// silently ignored.
    pub fn property_str(&self, key: &str) -> Result<Option<&str>> {
        match self.properties.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(Error::validation(
                self.label(),
                format!("property '{key}' must be a string"),
            )),
        }
    }

    /// A required, non-empty string property.
    pub fn require_str(&self, key: &str) -> Result<&str> {
        match self.property_str(key)? {
            Some(s) if !s.is_empty() => Ok(s),
            _ => Err(Error::validation(
                self.label(),
                format!("missing required property '{key}'"),
            )),
        }
    }
}

/// A catalog entity: either a built candidate or what the catalog returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntity {
    pub entity_type: EntityType,
    pub fqn: String,
    pub name: String,
    /// Request body in the catalog's own format.
    pub payload: Value,
    #[serde(default)]
    pub shape: StructuralShape,
}

impl CatalogEntity {
    #[must_use]
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.entity_type, self.fqn.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_round_trips_through_tag() {
        for t in EntityType::ALL {
            assert_eq!(t.as_str().parse::<EntityType>().unwrap(), t);
        }
        assert!("warehouse".parse::<EntityType>().is_err());
    }

    #[test]
    fn test_entity_type_serde_uses_snake_case() {
        let json = serde_json::to_string(&EntityType::DatabaseSchema).unwrap();
        assert_eq!(json, "\"database_schema\"");
        let parsed: EntityType = serde_json::from_str("\"ml_model_service\"").unwrap();
        assert_eq!(parsed, EntityType::MlModelService);
    }

    #[test]
    fn test_parent_types() {
        assert!(EntityType::DatabaseService.parent_types().is_empty());
        assert_eq!(
            EntityType::Table.parent_types(),
            &[EntityType::Database, EntityType::DatabaseSchema]
        );
    }

    #[test]
    fn test_entity_key_display() {
        let key = EntityKey::new(EntityType::Table, "svc.db.public.users");
        assert_eq!(key.to_string(), "table:svc.db.public.users");
    }

    #[test]
    fn test_require_str() {
        let decl = EntityDeclaration::named(EntityType::Database, "analytics")
            .with_property("service", "warehouse")
            .with_property("port", 5432);

        assert_eq!(decl.require_str("service").unwrap(), "warehouse");
        assert!(decl.require_str("missing").is_err());

        let err = decl.require_str("port").unwrap_err();
        assert!(err.to_string().contains("must be a string"));
    }

    #[test]
    fn test_declaration_deserializes_from_config_shape() {
        let decl: EntityDeclaration = serde_json::from_value(serde_json::json!({
            "type": "table",
            "discovery": { "source": "lake", "include_pattern": "orders_.*" },
            "properties": { "service": "s3" },
            "idempotency": "update"
        }))
        .unwrap();

        assert_eq!(decl.entity_type, EntityType::Table);
        assert!(decl.name.is_none());
        assert_eq!(decl.discovery.unwrap().include_pattern.as_deref(), Some("orders_.*"));
        assert_eq!(decl.idempotency, Some(IdempotencyMode::Update));
    }

    #[test]
    fn test_label() {
        let named = EntityDeclaration::named(EntityType::Table, "users");
        assert_eq!(named.label(), "table:users");

        let discovered =
            EntityDeclaration::discovered(EntityType::Table, DiscoveryRef::new("lake"));
        assert_eq!(discovered.label(), "table:<discovered from lake>");
    }
}
