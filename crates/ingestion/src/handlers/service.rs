//! Service handlers (database and ML model services).

use serde_json::{Value, json};

use super::{EntityHandler, base_payload};
use crate::error::Result;
use crate::schema::StructuralShape;
use crate::types::{CatalogEntity, EntityDeclaration, EntityKey, EntityType};

/// Top-level service entity. Services have no parents.
#[derive(Debug)]
pub struct ServiceHandler {
    entity_type: EntityType,
}

impl ServiceHandler {
    #[must_use]
    pub const fn new(entity_type: EntityType) -> Self {
        Self { entity_type }
    }
}

impl EntityHandler for ServiceHandler {
    fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    fn fqn(&self, decl: &EntityDeclaration) -> Result<String> {
        decl.require_name().map(str::to_string)
    }

    fn dependencies(&self, _decl: &EntityDeclaration) -> Result<Vec<EntityKey>> {
        Ok(Vec::new())
    }

    fn validate(&self, decl: &EntityDeclaration) -> Result<()> {
        decl.require_name()?;
        decl.require_str("service_type")?;
        Ok(())
    }

    fn build(&self, decl: &EntityDeclaration) -> Result<CatalogEntity> {
        self.validate(decl)?;
        let mut payload = base_payload(decl)?;
        payload.insert(
            "serviceType".into(),
            Value::String(decl.require_str("service_type")?.to_string()),
        );
        let connection = decl.properties.get("connection").cloned().unwrap_or_else(|| json!({}));
        payload.insert("connection".into(), json!({ "config": connection }));

        let name = decl.require_name()?.to_string();
        Ok(CatalogEntity {
            entity_type: self.entity_type,
            fqn: name.clone(),
            name,
            payload: Value::Object(payload),
            shape: StructuralShape::new(),
        })
    }
}
