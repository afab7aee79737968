//! HTTP catalog client.
//!
//! Talks to a metadata catalog's REST API: entities are looked up by
//! fully-qualified name under a per-type collection, created with `POST`
//! and updated with `PUT` (create-or-update) on the same collection.

use std::time::Duration;

use serde_json::Value;

use crate::catalog::Catalog;
use crate::error::{CatalogError, CatalogResult};
use crate::schema::StructuralShape;
use crate::types::{CatalogEntity, EntityType};

/// Connection settings for [`HttpCatalog`].
#[derive(Debug, Clone)]
pub struct HttpCatalogConfig {
    /// Base URL, e.g. `http://localhost:8585`.
    pub host: String,
    pub api_version: String,
    pub timeout: Duration,
    /// Bearer token; requests are unauthenticated without one.
    pub jwt_token: Option<String>,
}

impl HttpCatalogConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            api_version: "v1".to_string(),
            timeout: Duration::from_secs(30),
            jwt_token: None,
        }
    }
}

/// Catalog reached over HTTP.
pub struct HttpCatalog {
    agent: ureq::Agent,
    api_base: String,
    auth_header: Option<String>,
}

impl HttpCatalog {
    #[must_use]
    pub fn new(config: &HttpCatalogConfig) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(agent_config),
            api_base: format!(
                "{}/api/{}",
                config.host.trim_end_matches('/'),
                config.api_version
            ),
            auth_header: config.jwt_token.as_ref().map(|t| format!("Bearer {t}")),
        }
    }

    /// Get the API base URL.
    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn collection_url(&self, entity_type: EntityType) -> String {
        format!("{}/{}", self.api_base, collection(entity_type))
    }

    fn entity_url(&self, entity_type: EntityType, fqn: &str) -> String {
        format!("{}/name/{}", self.collection_url(entity_type), encode_segment(fqn))
    }

    fn authorize<B>(&self, request: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        let request = request.header("Accept", "application/json");
        match &self.auth_header {
            Some(value) => request.header("Authorization", value.as_str()),
            None => request,
        }
    }

    /// Fetch an entity as raw JSON; `None` when the catalog answers 404.
    fn fetch(
        &self,
        entity_type: EntityType,
        fqn: &str,
        fields: Option<&str>,
    ) -> CatalogResult<Option<Value>> {
        let mut request = self.authorize(self.agent.get(&self.entity_url(entity_type, fqn)));
        if let Some(fields) = fields {
            request = request.query("fields", fields);
        }
        match request.call() {
            Ok(mut response) => Ok(Some(response.body_mut().read_json()?)),
            Err(ureq::Error::StatusCode(404)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn send(&self, method: &str, entity: &CatalogEntity) -> CatalogResult<CatalogEntity> {
        let url = self.collection_url(entity.entity_type);
        log::debug!("{method} {url} ({})", entity.fqn);
        let request = if method == "PUT" {
            self.agent.put(&url)
        } else {
            self.agent.post(&url)
        };
        let result = self.authorize(request).send_json(&entity.payload);
        let body: Value = match result {
            Ok(mut response) => response.body_mut().read_json()?,
            Err(ureq::Error::StatusCode(409)) => {
                return Err(CatalogError::AlreadyExists {
                    fqn: entity.fqn.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        Ok(entity_from_response(entity.entity_type, &body, &entity.fqn))
    }
}

/// REST collection for an entity type.
const fn collection(entity_type: EntityType) -> &'static str {
    match entity_type {
        EntityType::DatabaseService => "services/databaseServices",
        EntityType::Database => "databases",
        EntityType::DatabaseSchema => "databaseSchemas",
        EntityType::Table => "tables",
        EntityType::MlModelService => "services/mlmodelServices",
        EntityType::MlModel => "mlmodels",
    }
}

/// Payload field that carries an entity type's structural shape.
const fn shape_field(entity_type: EntityType) -> Option<&'static str> {
    match entity_type {
        EntityType::Table => Some("columns"),
        EntityType::MlModel => Some("mlFeatures"),
        _ => None,
    }
}

fn entity_from_response(
    entity_type: EntityType,
    body: &Value,
    fallback_fqn: &str,
) -> CatalogEntity {
    let text = |key: &str| body.get(key).and_then(Value::as_str).map(str::to_string);
    CatalogEntity {
        entity_type,
        fqn: text("fullyQualifiedName").unwrap_or_else(|| fallback_fqn.to_string()),
        name: text("name").unwrap_or_default(),
        shape: shape_field(entity_type)
            .map(|field| StructuralShape::from_json_list(body.get(field)))
            .unwrap_or_default(),
        payload: body.clone(),
    }
}

/// Percent-encode everything outside the RFC 3986 unreserved set, so an FQN
/// with spaces, slashes or quotes stays a single path segment.
fn encode_segment(segment: &str) -> String {
    use std::fmt::Write as _;

    let mut encoded = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            encoded.push(char::from(byte));
        } else {
            let _ = write!(encoded, "%{byte:02X}");
        }
    }
    encoded
}

impl Catalog for HttpCatalog {
    fn exists(&self, entity_type: EntityType, fqn: &str) -> CatalogResult<bool> {
        Ok(self.fetch(entity_type, fqn, None)?.is_some())
    }

    fn get_structural_shape(
        &self,
        entity_type: EntityType,
        fqn: &str,
    ) -> CatalogResult<StructuralShape> {
        let Some(field) = shape_field(entity_type) else {
            return Ok(StructuralShape::new());
        };
        let body = self
            .fetch(entity_type, fqn, Some(field))?
            .ok_or_else(|| CatalogError::NotFound {
                fqn: fqn.to_string(),
            })?;
        Ok(StructuralShape::from_json_list(body.get(field)))
    }

    fn create(&self, entity: &CatalogEntity) -> CatalogResult<CatalogEntity> {
        self.send("POST", entity)
    }

    fn update(&self, fqn: &str, entity: &CatalogEntity) -> CatalogResult<CatalogEntity> {
        log::trace!("update {fqn}");
        self.send("PUT", entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog() -> HttpCatalog {
        HttpCatalog::new(&HttpCatalogConfig::new("http://localhost:8585/"))
    }

    #[test]
    fn test_api_base_strips_trailing_slash() {
        assert_eq!(catalog().api_base(), "http://localhost:8585/api/v1");
    }

    #[test]
    fn test_entity_url() {
        let c = catalog();
        assert_eq!(
            c.entity_url(EntityType::Table, "svc.db.public.users"),
            "http://localhost:8585/api/v1/tables/name/svc.db.public.users"
        );
        assert_eq!(
            c.collection_url(EntityType::DatabaseService),
            "http://localhost:8585/api/v1/services/databaseServices"
        );
        assert_eq!(
            c.collection_url(EntityType::MlModelService),
            "http://localhost:8585/api/v1/services/mlmodelServices"
        );
    }

    #[test]
    fn test_entity_url_encodes_fqn() {
        let c = catalog();
        assert_eq!(
            c.entity_url(EntityType::Table, "svc.db.my table/x#1"),
            "http://localhost:8585/api/v1/tables/name/svc.db.my%20table%2Fx%231"
        );
        assert_eq!(
            c.entity_url(EntityType::Table, "svc.db.\"a.b\"?q"),
            "http://localhost:8585/api/v1/tables/name/svc.db.%22a.b%22%3Fq"
        );
        assert_eq!(encode_segment("naïve"), "na%C3%AFve");
    }

    #[test]
    fn test_bearer_header() {
        let mut config = HttpCatalogConfig::new("https://catalog.example.com");
        config.jwt_token = Some("abc".into());
        let c = HttpCatalog::new(&config);
        assert_eq!(c.auth_header.as_deref(), Some("Bearer abc"));
        assert!(catalog().auth_header.is_none());
    }

    #[test]
    fn test_entity_from_response_reads_columns() {
        let body = json!({
            "name": "users",
            "fullyQualifiedName": "svc.db.public.users",
            "columns": [
                { "name": "id", "dataType": "BIGINT" },
                { "name": "email", "dataType": "STRING" }
            ]
        });
        let entity = entity_from_response(EntityType::Table, &body, "ignored");
        assert_eq!(entity.fqn, "svc.db.public.users");
        assert_eq!(entity.name, "users");
        assert_eq!(entity.shape.len(), 2);
    }

    #[test]
    fn test_entity_from_response_falls_back_to_request_fqn() {
        let entity = entity_from_response(EntityType::Database, &json!({}), "svc.db");
        assert_eq!(entity.fqn, "svc.db");
        assert!(entity.shape.is_empty());
    }
}
