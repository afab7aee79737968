//! # Ingestion
//!
//! Dependency-ordered, idempotent ingestion of structural metadata into a
//! catalog.
//!
//! Declarations describe entities (services, databases, schemas, tables,
//! ML models) that should exist in the catalog. The engine works out which
//! entities depend on which, orders them, and drives each one through a
//! create / update / skip / fail decision while recording an audit event
//! for every entity.
//!
//! ## Core Concepts
//!
//! - **EntityDeclaration**: one entity the run should make exist
//! - **ExecutionOrder**: declarations sorted so parents precede children
//! - **IdempotencyMode**: what to do when the entity already exists
//! - **SchemaDelta**: structural difference between catalog and candidate
//! - **ExecutionContext**: run-scoped cache of processed entities
//! - **IngestionEngine**: expands, resolves and executes a whole run
//!
//! ## Example
//!
//! ```
//! use ingestion::catalog::MemoryCatalog;
//! use ingestion::{EngineOptions, EntityDeclaration, EntityType, IngestionEngine};
//!
//! let engine = IngestionEngine::new(MemoryCatalog::new(), EngineOptions::default());
//!
//! let report = engine.run_simple(vec![
//!     EntityDeclaration::named(EntityType::Database, "sales")
//!         .with_property("service", "warehouse"),
//!     EntityDeclaration::named(EntityType::DatabaseService, "warehouse")
//!         .with_property("service_type", "Postgres"),
//! ])?;
//!
//! assert_eq!(report.summary.created, 2);
//! assert_eq!(report.events[0].fqn, "warehouse");
//! # Ok::<(), ingestion::Error>(())
//! ```
//!
//! ## Extension Points
//!
//! - [`catalog::Catalog`]: where entities are written
//! - [`handlers::EntityHandler`]: per-type naming, parents and payloads
//! - [`source::SourceConnector`]: discovery of entities from a data source
//! - [`AuditSink`] and [`ProgressCallback`]: observers of a run

pub mod audit;
pub mod catalog;
pub mod context;
pub mod engine;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod idempotency;
pub mod resolver;
pub mod retry;
pub mod schema;
pub mod source;
pub mod summary;
pub mod types;

// Re-export main types at crate root
pub use audit::{
    AuditEvent, AuditLog, AuditSink, Failure, FailureKind, NoAudit, NoProgress, Outcome,
    ProgressCallback,
};
pub use context::ExecutionContext;
pub use engine::{EngineOptions, Expansion, IngestionEngine, Plan, RunReport};
pub use error::{CatalogError, CatalogResult, Error, ErrorCategory, Result};
pub use executor::EntityExecutor;
pub use handlers::{EntityHandler, HandlerRegistry};
pub use idempotency::{Action, IdempotencyMode};
pub use resolver::{ExecutionOrder, PlannedEntity};
pub use retry::RetryConfig;
pub use schema::{Field, SchemaDelta, StructuralShape, TypeChange};
pub use source::{DiscoveredEntity, SourceConfig, SourceConnector, SourceRegistry};
pub use summary::{RunCounters, RunSummary};
pub use types::{CatalogEntity, DiscoveryRef, EntityDeclaration, EntityKey, EntityType};
