//! Entity handlers: per-type rules for naming, parents and payloads.
//!
//! A handler knows how to turn an [`EntityDeclaration`] of its type into a
//! fully-qualified name, the keys of the entities it structurally depends
//! on, and the candidate [`CatalogEntity`] to send to the catalog.
//! [`HandlerRegistry`] maps type tags to handlers and is owned by the engine;
//! there is no process-wide registry.

mod database;
mod ml_model;
mod schema;
mod service;
mod table;

use std::collections::HashMap;
use std::fmt;

use serde_json::{Map, Value};

pub use database::DatabaseHandler;
pub use ml_model::MlModelHandler;
pub use schema::DatabaseSchemaHandler;
pub use service::ServiceHandler;
pub use table::{TableHandler, normalize_data_type};

use crate::error::{Error, Result};
use crate::schema::StructuralShape;
use crate::types::{CatalogEntity, EntityDeclaration, EntityKey, EntityType};

/// Capability set for one entity type.
pub trait EntityHandler: Send + Sync + fmt::Debug {
    /// The type this handler is registered for.
    fn entity_type(&self) -> EntityType;

    /// Fully-qualified name of the declared entity.
    fn fqn(&self, decl: &EntityDeclaration) -> Result<String>;

    /// Keys of the entities this one requires to exist first.
    fn dependencies(&self, decl: &EntityDeclaration) -> Result<Vec<EntityKey>>;

    /// Check the declaration's properties without building anything.
    fn validate(&self, decl: &EntityDeclaration) -> Result<()> {
        decl.require_name()?;
        self.fqn(decl).map(|_| ())
    }

    /// Build the candidate entity.
    fn build(&self, decl: &EntityDeclaration) -> Result<CatalogEntity>;

    /// Whether this type has a structural shape worth comparing.
    fn supports_schema(&self) -> bool {
        false
    }

    fn key(&self, decl: &EntityDeclaration) -> Result<EntityKey> {
        Ok(EntityKey::new(self.entity_type(), self.fqn(decl)?))
    }
}

/// Explicit mapping from entity type to handler.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<EntityType, Box<dyn EntityHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with every built-in handler.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(ServiceHandler::new(EntityType::DatabaseService)));
        registry.register(Box::new(DatabaseHandler));
        registry.register(Box::new(DatabaseSchemaHandler));
        registry.register(Box::new(TableHandler));
        registry.register(Box::new(ServiceHandler::new(EntityType::MlModelService)));
        registry.register(Box::new(MlModelHandler));
        registry
    }

    /// Register a handler, returning the one it replaces.
    pub fn register(&mut self, handler: Box<dyn EntityHandler>) -> Option<Box<dyn EntityHandler>> {
        self.handlers.insert(handler.entity_type(), handler)
    }

    /// Handler for an entity type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandlerNotRegistered`] for an unknown type.
    pub fn get(&self, entity_type: EntityType) -> Result<&dyn EntityHandler> {
        self.handlers
            .get(&entity_type)
            .map(|handler| handler.as_ref())
            .ok_or(Error::HandlerNotRegistered(entity_type))
    }

    #[must_use]
    pub fn contains(&self, entity_type: EntityType) -> bool {
        self.handlers.contains_key(&entity_type)
    }

    /// Registered types, sorted.
    #[must_use]
    pub fn registered_types(&self) -> Vec<EntityType> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort();
        types
    }
}

/// Join name segments into a fully-qualified name.
fn join_fqn(segments: &[&str]) -> String {
    segments.join(".")
}

/// Common payload fields: name plus optional description.
fn base_payload(decl: &EntityDeclaration) -> Result<Map<String, Value>> {
    let mut payload = Map::new();
    payload.insert("name".into(), Value::String(decl.require_name()?.to_string()));
    if let Some(description) = decl.property_str("description")? {
        payload.insert("description".into(), Value::String(description.to_string()));
    }
    Ok(payload)
}

/// Read a list of `{name, dataType}` objects from a property.
///
/// `data_type` normalizes or rejects each entry's type; it receives `None`
/// when the entry has no `dataType`.
fn parse_field_list(
    decl: &EntityDeclaration,
    property: &str,
    data_type: impl Fn(Option<&str>) -> std::result::Result<String, String>,
) -> Result<Option<(StructuralShape, Vec<Value>)>> {
    let items = match decl.properties.get(property) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(Error::validation(
                decl.label(),
                format!("'{property}' must be a list"),
            ));
        }
    };

    let mut shape = StructuralShape::new();
    let mut entries = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let Value::Object(fields) = item else {
            return Err(Error::validation(
                decl.label(),
                format!("entry {idx} of '{property}' must be an object"),
            ));
        };
        let name = fields
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                let message = format!("entry {idx} of '{property}' missing 'name'");
                Error::validation(decl.label(), message)
            })?;
        let declared = fields.get("dataType").and_then(Value::as_str);
        let normalized = data_type(declared)
            .map_err(|msg| Error::validation(decl.label(), format!("'{name}': {msg}")))?;

        let mut entry = fields.clone();
        entry.insert("dataType".into(), Value::String(normalized.clone()));
        shape.push(name, normalized);
        entries.push(Value::Object(entry));
    }
    Ok(Some((shape, entries)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_with_defaults_covers_all_types() {
        let registry = HandlerRegistry::with_defaults();
        assert_eq!(registry.registered_types(), EntityType::ALL.to_vec());
    }

    #[test]
    fn test_empty_registry_reports_missing_handler() {
        let registry = HandlerRegistry::new();
        assert!(!registry.contains(EntityType::Table));
        let err = registry.get(EntityType::Table).unwrap_err();
        assert!(matches!(err, Error::HandlerNotRegistered(EntityType::Table)));
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = HandlerRegistry::with_defaults();
        let previous = registry.register(Box::new(TableHandler));
        assert!(previous.is_some());
    }

    #[test]
    fn test_base_payload() {
        let decl = EntityDeclaration::named(EntityType::Database, "sales")
            .with_property("description", "Sales data");
        let payload = base_payload(&decl).unwrap();
        assert_eq!(payload["name"], "sales");
        assert_eq!(payload["description"], "Sales data");
    }

    #[test]
    fn test_parse_field_list_rejects_non_list() {
        let decl = EntityDeclaration::named(EntityType::Table, "t").with_property("columns", "id");
        let err = parse_field_list(&decl, "columns", |t| Ok(t.unwrap_or("X").to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("must be a list"));
    }
}
