//! Catalog client trait and implementations.
//!
//! The executor only talks to the catalog through [`Catalog`]. The main
//! implementation is [`http::HttpCatalog`]; [`MemoryCatalog`] keeps entities
//! in memory for tests and local runs.
//!
//! # Testing
//!
//! ```
//! use ingestion::catalog::{Catalog, CatalogOperation, MemoryCatalog};
//! use ingestion::{CatalogError, EntityType};
//!
//! let catalog = MemoryCatalog::new();
//! catalog.fail_next(CatalogOperation::Exists, "warehouse", CatalogError::unavailable("down"));
//!
//! assert!(catalog.exists(EntityType::DatabaseService, "warehouse").is_err());
//! assert!(!catalog.exists(EntityType::DatabaseService, "warehouse").unwrap());
//! ```

pub mod http;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{CatalogError, CatalogResult};
use crate::schema::StructuralShape;
use crate::types::{CatalogEntity, EntityKey, EntityType};

/// Catalog round-trips needed by the executor.
///
/// Every call may fail with a [`CatalogError`] whose category tells the
/// retry policy whether another attempt is worthwhile.
pub trait Catalog: Send + Sync {
    /// Whether an entity with this fully-qualified name exists.
    fn exists(&self, entity_type: EntityType, fqn: &str) -> CatalogResult<bool>;

    /// The structural shape of an existing entity.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if the entity does not exist.
    fn get_structural_shape(
        &self,
        entity_type: EntityType,
        fqn: &str,
    ) -> CatalogResult<StructuralShape>;

    /// Create an entity and return what the catalog stored.
    fn create(&self, entity: &CatalogEntity) -> CatalogResult<CatalogEntity>;

    /// Replace the entity at `fqn` and return what the catalog stored.
    fn update(&self, fqn: &str, entity: &CatalogEntity) -> CatalogResult<CatalogEntity>;
}

/// Catalog operations, for call logs and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogOperation {
    Exists,
    GetShape,
    Create,
    Update,
}

impl CatalogOperation {
    #[must_use]
    pub const fn is_write(&self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }
}

impl fmt::Display for CatalogOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Exists => "exists",
            Self::GetShape => "get_shape",
            Self::Create => "create",
            Self::Update => "update",
        };
        f.write_str(s)
    }
}

/// One call observed by [`MemoryCatalog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogCall {
    pub operation: CatalogOperation,
    pub key: EntityKey,
}

/// In-memory catalog.
///
/// Entities can be seeded up front, every call is logged, and failures can
/// be scripted per operation and fully-qualified name.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    entities: Mutex<BTreeMap<EntityKey, CatalogEntity>>,
    calls: Mutex<Vec<CatalogCall>>,
    failures: Mutex<HashMap<(CatalogOperation, String), VecDeque<CatalogError>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryCatalog {
    /// Create a new empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an entity as if it had been created by an earlier run.
    pub fn seed(&self, entity: CatalogEntity) {
        lock(&self.entities).insert(entity.key(), entity);
    }

    /// Make the next `operation` on `fqn` fail with `error`.
    ///
    /// Queued failures are consumed one per call, in order.
    pub fn fail_next(
        &self,
        operation: CatalogOperation,
        fqn: impl Into<String>,
        error: CatalogError,
    ) {
        lock(&self.failures)
            .entry((operation, fqn.into()))
            .or_default()
            .push_back(error);
    }

    /// A stored entity.
    #[must_use]
    pub fn get(&self, entity_type: EntityType, fqn: &str) -> Option<CatalogEntity> {
        lock(&self.entities)
            .get(&EntityKey::new(entity_type, fqn))
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.entities).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.entities).is_empty()
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<CatalogCall> {
        lock(&self.calls).clone()
    }

    /// Number of create and update calls made so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| c.operation.is_write())
            .count()
    }

    fn observe(
        &self,
        operation: CatalogOperation,
        entity_type: EntityType,
        fqn: &str,
    ) -> CatalogResult<()> {
        lock(&self.calls).push(CatalogCall {
            operation,
            key: EntityKey::new(entity_type, fqn),
        });
        let scripted = lock(&self.failures)
            .get_mut(&(operation, fqn.to_string()))
            .and_then(VecDeque::pop_front);
        scripted.map_or(Ok(()), Err)
    }
}

impl Catalog for MemoryCatalog {
    fn exists(&self, entity_type: EntityType, fqn: &str) -> CatalogResult<bool> {
        self.observe(CatalogOperation::Exists, entity_type, fqn)?;
        Ok(lock(&self.entities).contains_key(&EntityKey::new(entity_type, fqn)))
    }

    fn get_structural_shape(
        &self,
        entity_type: EntityType,
        fqn: &str,
    ) -> CatalogResult<StructuralShape> {
        self.observe(CatalogOperation::GetShape, entity_type, fqn)?;
        lock(&self.entities)
            .get(&EntityKey::new(entity_type, fqn))
            .map(|e| e.shape.clone())
            .ok_or_else(|| CatalogError::NotFound {
                fqn: fqn.to_string(),
            })
    }

    fn create(&self, entity: &CatalogEntity) -> CatalogResult<CatalogEntity> {
        self.observe(CatalogOperation::Create, entity.entity_type, &entity.fqn)?;
        let mut entities = lock(&self.entities);
        let key = entity.key();
        if entities.contains_key(&key) {
            return Err(CatalogError::AlreadyExists {
                fqn: entity.fqn.clone(),
            });
        }
        entities.insert(key, entity.clone());
        Ok(entity.clone())
    }

    fn update(&self, fqn: &str, entity: &CatalogEntity) -> CatalogResult<CatalogEntity> {
        self.observe(CatalogOperation::Update, entity.entity_type, fqn)?;
        let mut entities = lock(&self.entities);
        let key = EntityKey::new(entity.entity_type, fqn);
        match entities.get_mut(&key) {
            Some(existing) => {
                *existing = entity.clone();
                Ok(entity.clone())
            }
            None => Err(CatalogError::NotFound {
                fqn: fqn.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(fqn: &str, shape: StructuralShape) -> CatalogEntity {
        CatalogEntity {
            entity_type: EntityType::Table,
            fqn: fqn.to_string(),
            name: fqn.rsplit('.').next().unwrap().to_string(),
            payload: serde_json::json!({}),
            shape,
        }
    }

    #[test]
    fn test_memory_catalog_new() {
        let catalog = MemoryCatalog::new();
        assert!(catalog.is_empty());
        assert!(!catalog.exists(EntityType::Table, "a.b.c.d").unwrap());
    }

    #[test]
    fn test_create_then_exists() {
        let catalog = MemoryCatalog::new();
        let entity = table("s.d.sc.t", StructuralShape::new().with_field("id", "INT"));
        catalog.create(&entity).unwrap();

        assert!(catalog.exists(EntityType::Table, "s.d.sc.t").unwrap());
        assert!(!catalog.exists(EntityType::Database, "s.d.sc.t").unwrap());
        assert_eq!(
            catalog.get_structural_shape(EntityType::Table, "s.d.sc.t").unwrap(),
            entity.shape
        );
    }

    #[test]
    fn test_create_existing_conflicts() {
        let catalog = MemoryCatalog::new();
        let entity = table("s.d.sc.t", StructuralShape::new());
        catalog.seed(entity.clone());

        let err = catalog.create(&entity).unwrap_err();
        assert!(matches!(err, CatalogError::AlreadyExists { .. }));
    }

    #[test]
    fn test_update_replaces_shape() {
        let catalog = MemoryCatalog::new();
        catalog.seed(table("s.d.sc.t", StructuralShape::new().with_field("id", "INT")));

        let updated = table(
            "s.d.sc.t",
            StructuralShape::new().with_field("id", "INT").with_field("name", "STRING"),
        );
        catalog.update("s.d.sc.t", &updated).unwrap();

        let stored = catalog.get(EntityType::Table, "s.d.sc.t").unwrap();
        assert_eq!(stored.shape.len(), 2);
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let catalog = MemoryCatalog::new();
        let err = catalog
            .update("s.d.sc.t", &table("s.d.sc.t", StructuralShape::new()))
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { .. }));
    }

    #[test]
    fn test_scripted_failures_are_consumed_in_order() {
        let catalog = MemoryCatalog::new();
        catalog.fail_next(CatalogOperation::Exists, "svc", CatalogError::unavailable("one"));
        catalog.fail_next(CatalogOperation::Exists, "svc", CatalogError::rejected("svc", "two"));

        let first = catalog.exists(EntityType::DatabaseService, "svc").unwrap_err();
        let second = catalog.exists(EntityType::DatabaseService, "svc").unwrap_err();
        assert!(first.is_retryable());
        assert!(!second.is_retryable());
        assert!(!catalog.exists(EntityType::DatabaseService, "svc").unwrap());
    }

    #[test]
    fn test_calls_are_logged() {
        let catalog = MemoryCatalog::new();
        let entity = table("s.d.sc.t", StructuralShape::new());
        catalog.exists(EntityType::Table, "s.d.sc.t").unwrap();
        catalog.create(&entity).unwrap();

        let ops: Vec<_> = catalog.calls().iter().map(|c| c.operation).collect();
        assert_eq!(ops, vec![CatalogOperation::Exists, CatalogOperation::Create]);
        assert_eq!(catalog.write_count(), 1);
    }
}
