use serde_json::Value;

use super::{EntityHandler, base_payload, join_fqn};
use crate::error::Result;
use crate::schema::StructuralShape;
use crate::types::{CatalogEntity, EntityDeclaration, EntityKey, EntityType};

/// Database schema, parented by the database `service.database`.
#[derive(Debug)]
pub struct DatabaseSchemaHandler;

impl DatabaseSchemaHandler {
    fn database_fqn(decl: &EntityDeclaration) -> Result<String> {
        Ok(join_fqn(&[decl.require_str("service")?, decl.require_str("database")?]))
    }
}

impl EntityHandler for DatabaseSchemaHandler {
    fn entity_type(&self) -> EntityType {
        EntityType::DatabaseSchema
    }

    fn fqn(&self, decl: &EntityDeclaration) -> Result<String> {
        Ok(join_fqn(&[&Self::database_fqn(decl)?, decl.require_name()?]))
    }

    fn dependencies(&self, decl: &EntityDeclaration) -> Result<Vec<EntityKey>> {
        Ok(vec![EntityKey::new(EntityType::Database, Self::database_fqn(decl)?)])
    }

    fn build(&self, decl: &EntityDeclaration) -> Result<CatalogEntity> {
        let fqn = self.fqn(decl)?;
        let mut payload = base_payload(decl)?;
        payload.insert("database".into(), Value::String(Self::database_fqn(decl)?));

        Ok(CatalogEntity {
            entity_type: EntityType::DatabaseSchema,
            fqn,
            name: decl.require_name()?.to_string(),
            payload: Value::Object(payload),
            shape: StructuralShape::new(),
        })
    }
}
