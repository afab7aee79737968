use serde_json::Value;

use super::{EntityHandler, base_payload, join_fqn, parse_field_list};
use crate::error::Result;
use crate::types::{CatalogEntity, EntityDeclaration, EntityKey, EntityType};

const FEATURE_TYPES: &[&str] = &["numerical", "categorical"];

fn feature_type(declared: Option<&str>) -> std::result::Result<String, String> {
    let declared = declared.unwrap_or("numerical").to_ascii_lowercase();
    if FEATURE_TYPES.contains(&declared.as_str()) {
        Ok(declared)
    } else {
        Err(format!("invalid feature type '{declared}'"))
    }
}

/// ML model, parented by an ML model service. Its features are its shape.
#[derive(Debug)]
pub struct MlModelHandler;

impl EntityHandler for MlModelHandler {
    fn entity_type(&self) -> EntityType {
        EntityType::MlModel
    }

    fn fqn(&self, decl: &EntityDeclaration) -> Result<String> {
        Ok(join_fqn(&[decl.require_str("service")?, decl.require_name()?]))
    }

    fn dependencies(&self, decl: &EntityDeclaration) -> Result<Vec<EntityKey>> {
        Ok(vec![EntityKey::new(
            EntityType::MlModelService,
            decl.require_str("service")?,
        )])
    }

    fn validate(&self, decl: &EntityDeclaration) -> Result<()> {
        self.fqn(decl)?;
        parse_field_list(decl, "mlFeatures", feature_type).map(|_| ())
    }

    fn build(&self, decl: &EntityDeclaration) -> Result<CatalogEntity> {
        let fqn = self.fqn(decl)?;
        let (shape, features) =
            parse_field_list(decl, "mlFeatures", feature_type)?.unwrap_or_default();

        let mut payload = base_payload(decl)?;
        payload.insert("service".into(), Value::String(decl.require_str("service")?.to_string()));
        payload.insert(
            "algorithm".into(),
            Value::String(decl.property_str("algorithm")?.unwrap_or("mlmodel").to_string()),
        );
        payload.insert("mlFeatures".into(), Value::Array(features));

        Ok(CatalogEntity {
            entity_type: EntityType::MlModel,
            fqn,
            name: decl.require_name()?.to_string(),
            payload: Value::Object(payload),
            shape,
        })
    }

    fn supports_schema(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::StructuralShape;
    use serde_json::json;

    fn model() -> EntityDeclaration {
        EntityDeclaration::named(EntityType::MlModel, "churn").with_property("service", "mlflow")
    }

    #[test]
    fn test_model_fqn_and_parent() {
        assert_eq!(MlModelHandler.fqn(&model()).unwrap(), "mlflow.churn");
        assert_eq!(
            MlModelHandler.dependencies(&model()).unwrap(),
            vec![EntityKey::new(EntityType::MlModelService, "mlflow")]
        );
    }

    #[test]
    fn test_features_form_shape() {
        let decl = model().with_property(
            "mlFeatures",
            json!([
                { "name": "tenure" },
                { "name": "plan", "dataType": "Categorical" }
            ]),
        );

        let entity = MlModelHandler.build(&decl).unwrap();
        assert_eq!(
            entity.shape,
            StructuralShape::new()
                .with_field("tenure", "numerical")
                .with_field("plan", "categorical")
        );
        assert_eq!(entity.payload["algorithm"], "mlmodel");
    }

    #[test]
    fn test_model_without_features_has_empty_shape() {
        let entity = MlModelHandler
            .build(&model().with_property("algorithm", "xgboost"))
            .unwrap();
        assert!(entity.shape.is_empty());
        assert_eq!(entity.payload["algorithm"], "xgboost");
    }

    #[test]
    fn test_invalid_feature_type() {
        let decl =
            model().with_property("mlFeatures", json!([{ "name": "x", "dataType": "vector" }]));
        assert!(MlModelHandler.validate(&decl).is_err());
    }
}
