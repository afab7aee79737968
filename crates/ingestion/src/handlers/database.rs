use serde_json::Value;

use super::{EntityHandler, base_payload, join_fqn};
use crate::error::Result;
use crate::schema::StructuralShape;
use crate::types::{CatalogEntity, EntityDeclaration, EntityKey, EntityType};

/// Database, parented by a database service named in `service`.
#[derive(Debug)]
pub struct DatabaseHandler;

impl EntityHandler for DatabaseHandler {
    fn entity_type(&self) -> EntityType {
        EntityType::Database
    }

    fn fqn(&self, decl: &EntityDeclaration) -> Result<String> {
        Ok(join_fqn(&[decl.require_str("service")?, decl.require_name()?]))
    }

    fn dependencies(&self, decl: &EntityDeclaration) -> Result<Vec<EntityKey>> {
        Ok(vec![EntityKey::new(
            EntityType::DatabaseService,
            decl.require_str("service")?,
        )])
    }

    fn build(&self, decl: &EntityDeclaration) -> Result<CatalogEntity> {
        let fqn = self.fqn(decl)?;
        let mut payload = base_payload(decl)?;
        payload.insert("service".into(), Value::String(decl.require_str("service")?.to_string()));

        Ok(CatalogEntity {
            entity_type: EntityType::Database,
            fqn,
            name: decl.require_name()?.to_string(),
            payload: Value::Object(payload),
            shape: StructuralShape::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_fqn_and_parent() {
        let decl = EntityDeclaration::named(EntityType::Database, "sales")
            .with_property("service", "warehouse");

        assert_eq!(DatabaseHandler.fqn(&decl).unwrap(), "warehouse.sales");
        assert_eq!(
            DatabaseHandler.dependencies(&decl).unwrap(),
            vec![EntityKey::new(EntityType::DatabaseService, "warehouse")]
        );
    }

    #[test]
    fn test_database_without_service_is_invalid() {
        let decl = EntityDeclaration::named(EntityType::Database, "sales");
        assert!(DatabaseHandler.validate(&decl).is_err());
        assert!(DatabaseHandler.build(&decl).is_err());
    }

    #[test]
    fn test_database_payload_names_service() {
        let decl = EntityDeclaration::named(EntityType::Database, "sales")
            .with_property("service", "warehouse");
        let entity = DatabaseHandler.build(&decl).unwrap();
        assert_eq!(entity.payload["service"], "warehouse");
        assert_eq!(entity.name, "sales");
    }
}
