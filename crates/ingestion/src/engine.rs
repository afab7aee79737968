//! Ingestion engine - sequencing and aggregation for a whole run
//!
//! The engine expands discovery declarations, resolves the execution order
//! once, then drives the [`EntityExecutor`] over it one entity at a time.
//! It makes no catalog calls of its own. Only a dependency cycle or a
//! duplicated entity stops a run before it starts; every other failure is
//! confined to one entity, or to the subtree below an entity whose
//! dependency was missing.

use std::collections::HashSet;
use std::time::Instant;

use crate::audit::{AuditEvent, AuditLog, AuditSink, NoAudit, NoProgress, ProgressCallback};
use crate::catalog::Catalog;
use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::executor::EntityExecutor;
use crate::handlers::HandlerRegistry;
use crate::idempotency::IdempotencyMode;
use crate::resolver::ExecutionOrder;
use crate::retry::RetryConfig;
use crate::source::{DiscoveryFilter, SourceConfig, SourceRegistry};
use crate::summary::RunSummary;
use crate::types::{DiscoveryRef, EntityDeclaration, EntityKey};

/// Options for a run.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Make every decision but write nothing
    pub dry_run: bool,
    /// Idempotency mode for entities without an override
    pub default_idempotency: Option<IdempotencyMode>,
    /// Retry policy for catalog calls
    pub retry: RetryConfig,
}

/// Declarations after discovery, plus the sources that failed.
#[derive(Debug, Clone, Default)]
pub struct Expansion {
    pub declarations: Vec<EntityDeclaration>,
    pub errors: Vec<String>,
}

/// Resolved order for a run, without executing anything.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub order: ExecutionOrder,
    pub discovery_errors: Vec<String>,
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub summary: RunSummary,
    /// Audit events in execution order.
    pub events: Vec<AuditEvent>,
}

impl RunReport {
    /// Events for entities that failed, blocked ones included.
    pub fn failures(&self) -> impl Iterator<Item = &AuditEvent> {
        self.events.iter().filter(|e| e.failure.is_some())
    }
}

/// Top-level orchestrator.
pub struct IngestionEngine<C: Catalog> {
    catalog: C,
    handlers: HandlerRegistry,
    sources: SourceRegistry,
    source_configs: Vec<SourceConfig>,
    options: EngineOptions,
}

impl<C: Catalog> IngestionEngine<C> {
    /// Create an engine with the built-in handlers and source connectors.
    pub fn new(catalog: C, options: EngineOptions) -> Self {
        Self {
            catalog,
            handlers: HandlerRegistry::with_defaults(),
            sources: SourceRegistry::with_defaults(),
            source_configs: Vec::new(),
            options,
        }
    }

    #[must_use]
    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    /// Connector registry and the configured source instances.
    #[must_use]
    pub fn with_sources(mut self, registry: SourceRegistry, configs: Vec<SourceConfig>) -> Self {
        self.sources = registry;
        self.source_configs = configs;
        self
    }

    pub const fn catalog(&self) -> &C {
        &self.catalog
    }

    pub const fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Replace discovery declarations with what their sources report.
    ///
    /// A source that fails is logged and reported; its declaration
    /// contributes nothing and the remaining declarations are kept.
    pub fn expand(&self, declarations: Vec<EntityDeclaration>) -> Expansion {
        let mut expansion = Expansion::default();
        for decl in declarations {
            let Some(discovery) = decl.discovery.clone() else {
                expansion.declarations.push(decl);
                continue;
            };
            match self.discover(&decl, &discovery) {
                Ok(found) => {
                    log::info!(
                        "Discovered {} {} entities from source '{}'",
                        found.len(),
                        decl.entity_type,
                        discovery.source
                    );
                    expansion.declarations.extend(found);
                }
                Err(e) => {
                    log::error!("Discovery from source '{}' failed: {e}", discovery.source);
                    expansion.errors.push(format!("{}: {e}", discovery.source));
                }
            }
        }
        expansion
    }

    fn discover(
        &self,
        template: &EntityDeclaration,
        discovery: &DiscoveryRef,
    ) -> Result<Vec<EntityDeclaration>> {
        let config = self
            .source_configs
            .iter()
            .find(|c| c.name == discovery.source)
            .ok_or_else(|| Error::UnknownSource(discovery.source.clone()))?;
        let filter = DiscoveryFilter::from_ref(discovery)?;

        let mut connector = self.sources.create(config)?;
        connector.connect()?;
        let discovered = connector.discover(template.entity_type, &discovery.filter);
        if let Err(e) = connector.disconnect() {
            log::warn!("Failed to disconnect from source '{}': {e}", config.name);
        }

        Ok(discovered?
            .into_iter()
            .filter(|entity| filter.matches(&entity.name))
            .map(|entity| {
                let mut properties = template.properties.clone();
                properties.extend(entity.properties);
                EntityDeclaration {
                    entity_type: template.entity_type,
                    name: Some(entity.name),
                    discovery: None,
                    properties,
                    idempotency: template.idempotency,
                    shape: entity.shape,
                }
            })
            .collect())
    }

    /// Expand and resolve without executing anything.
    ///
    /// # Errors
    ///
    /// Fails on a dependency cycle or a duplicated entity.
    pub fn plan(&self, declarations: Vec<EntityDeclaration>) -> Result<Plan> {
        let expansion = self.expand(declarations);
        let order = ExecutionOrder::resolve(expansion.declarations, &self.handlers)?;
        Ok(Plan {
            order,
            discovery_errors: expansion.errors,
        })
    }

    /// Run every declaration to a terminal state.
    ///
    /// # Errors
    ///
    /// Fails before any entity executes on a dependency cycle or a
    /// duplicated entity. Entity failures are reported in the returned
    /// report instead.
    pub fn run<P, A>(
        &self,
        declarations: Vec<EntityDeclaration>,
        progress: &mut P,
        audit: &mut A,
    ) -> Result<RunReport>
    where
        P: ProgressCallback,
        A: AuditSink,
    {
        let started = Instant::now();
        let Plan {
            order,
            discovery_errors,
        } = self.plan(declarations)?;

        if self.options.dry_run {
            log::warn!("Dry run: no changes will be written to the catalog");
        }
        log::info!("Processing {} entities", order.len());

        let executor = EntityExecutor::new(&self.catalog, &self.handlers, &self.options.retry)
            .with_default_mode(self.options.default_idempotency);
        let mut ctx = ExecutionContext::new(self.options.dry_run);
        let mut log = AuditLog::new();
        let mut blocked: HashSet<EntityKey> = HashSet::new();

        progress.on_run_start(order.len());
        for planned in &order {
            progress.on_entity_start(&planned.key);

            let blocker = planned.dependencies.iter().find(|dep| blocked.contains(*dep));
            let event = if let Some(blocker) = blocker {
                log::warn!("Skipping {}: dependency {blocker} is missing", planned.key);
                ctx.record_blocked(planned.key.clone())?;
                blocked.insert(planned.key.clone());
                AuditEvent::blocked(&planned.key, blocker)
            } else {
                let event = executor.execute(&mut ctx, planned)?;
                if event.failure_kind().is_some_and(|kind| !kind.is_optimistic()) {
                    blocked.insert(planned.key.clone());
                }
                event
            };

            let event = log.append(event);
            audit.on_event(event);
            progress.on_entity_complete(event);
        }
        progress.on_run_complete();

        let mut summary =
            RunSummary::from_counters(ctx.counters(), self.options.dry_run, started.elapsed());
        summary.discovery_errors = discovery_errors;
        summary.audit_log = audit.on_complete(&summary);

        log::info!(
            "Run complete: {} created, {} updated, {} skipped, {} failed in {:.2}s",
            summary.created,
            summary.updated,
            summary.skipped,
            summary.failed,
            summary.elapsed.as_secs_f64()
        );

        Ok(RunReport {
            summary,
            events: log.into_events(),
        })
    }

    /// Run without progress reporting or audit persistence.
    ///
    /// # Errors
    ///
    /// Same as [`IngestionEngine::run`].
    pub fn run_simple(&self, declarations: Vec<EntityDeclaration>) -> Result<RunReport> {
        self.run(declarations, &mut NoProgress, &mut NoAudit)
    }
}
