//! Entity executor - takes one planned entity to a terminal state
//!
//! Each entity walks `Pending -> DependencyChecked -> Built -> LookedUp ->
//! Decided -> Applied`, stopping at the first failure. Whatever happens,
//! exactly one [`AuditEvent`] comes out and the outcome is recorded in the
//! [`ExecutionContext`].

use std::fmt;
use std::time::Instant;

use chrono::Utc;

use crate::audit::{AuditEvent, Failure, FailureKind, Outcome};
use crate::catalog::Catalog;
use crate::context::ExecutionContext;
use crate::error::{CatalogError, CatalogResult, Error, Result};
use crate::handlers::HandlerRegistry;
use crate::idempotency::{Action, IdempotencyMode};
use crate::resolver::PlannedEntity;
use crate::retry::{LogCallback, RetryConfig, with_retry};
use crate::schema::SchemaDelta;
use crate::types::{CatalogEntity, EntityKey};

/// Progress of one entity through the executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Stage {
    #[default]
    Pending,
    DependencyChecked,
    Built,
    LookedUp,
    Decided,
    Applied,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "dependency check",
            Self::DependencyChecked => "build",
            Self::Built => "catalog lookup",
            Self::LookedUp => "decision",
            Self::Decided => "apply",
            Self::Applied => "applied",
        };
        f.write_str(s)
    }
}

/// What the executor learned about an entity before it finished.
#[derive(Debug, Default)]
struct Trace {
    stage: Stage,
    action: Option<Action>,
    downgraded: bool,
    reason: Option<String>,
    delta: Option<SchemaDelta>,
}

impl Trace {
    fn advance(&mut self, key: &EntityKey, stage: Stage) {
        log::trace!("{key}: {:?} -> {stage:?}", self.stage);
        self.stage = stage;
    }
}

fn processing(err: Error) -> Failure {
    Failure::new(FailureKind::EntityProcessing, err.to_string())
}

fn catalog_failure(err: &CatalogError, attempts: u32) -> Failure {
    if err.is_retryable() {
        Failure::new(
            FailureKind::CatalogTransient,
            format!("{err} (gave up after {attempts} attempts)"),
        )
    } else {
        Failure::new(
            FailureKind::CatalogPermanent,
            format!("{}: {err}", err.category().description()),
        )
    }
}

/// Executes single entities against a catalog.
pub struct EntityExecutor<'a> {
    catalog: &'a dyn Catalog,
    handlers: &'a HandlerRegistry,
    retry: &'a RetryConfig,
    default_mode: Option<IdempotencyMode>,
}

impl<'a> EntityExecutor<'a> {
    pub fn new(
        catalog: &'a dyn Catalog,
        handlers: &'a HandlerRegistry,
        retry: &'a RetryConfig,
    ) -> Self {
        Self {
            catalog,
            handlers,
            retry,
            default_mode: None,
        }
    }

    /// Run-level idempotency mode for entities without an override.
    #[must_use]
    pub const fn with_default_mode(mut self, mode: Option<IdempotencyMode>) -> Self {
        self.default_mode = mode;
        self
    }

    /// Take one entity to a terminal state and describe what happened.
    ///
    /// Entity failures are reported on the returned event, not as errors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRecorded`] if the entity was already
    /// processed in this run.
    pub fn execute(
        &self,
        ctx: &mut ExecutionContext,
        planned: &PlannedEntity,
    ) -> Result<AuditEvent> {
        let started = Instant::now();
        let timestamp = Utc::now();
        let key = &planned.key;
        let mut trace = Trace::default();

        let (outcome, entity, failure) = match self.run(ctx, planned, &mut trace) {
            Ok((outcome, entity)) => (outcome, Some(entity), None),
            Err(failure) => {
                log::error!("{key} failed during {}: {failure}", trace.stage);
                (Outcome::Failed, None, Some(failure))
            }
        };
        ctx.record(key.entity_type, key.fqn.clone(), entity, outcome)?;

        match outcome {
            Outcome::Created => log::info!("Created {key}"),
            Outcome::Updated => log::info!(
                "Updated {key} ({})",
                trace.delta.as_ref().map(SchemaDelta::summary).unwrap_or_default()
            ),
            Outcome::Skipped => log::info!(
                "Skipped {key}: {}",
                trace.reason.as_deref().unwrap_or("already exists")
            ),
            Outcome::DryRun => log::info!(
                "[dry run] Would {} {key}",
                trace.action.map(|a| a.to_string()).unwrap_or_default()
            ),
            Outcome::Failed => {}
        }

        Ok(AuditEvent {
            sequence: 0,
            timestamp,
            entity_type: key.entity_type,
            fqn: key.fqn.clone(),
            outcome,
            action: trace.action,
            downgraded: trace.downgraded,
            reason: trace.reason,
            delta: trace.delta,
            failure,
            attempted: true,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }

    fn run(
        &self,
        ctx: &ExecutionContext,
        planned: &PlannedEntity,
        trace: &mut Trace,
    ) -> std::result::Result<(Outcome, CatalogEntity), Failure> {
        let key = &planned.key;
        let decl = &planned.declaration;

        if let Some(message) = &planned.plan_error {
            return Err(Failure::new(FailureKind::EntityProcessing, message.clone()));
        }
        let handler = self.handlers.get(key.entity_type).map_err(processing)?;

        for dependency in &planned.dependencies {
            self.check_dependency(ctx, dependency)?;
        }
        trace.advance(key, Stage::DependencyChecked);

        handler.validate(decl).map_err(processing)?;
        let candidate = handler.build(decl).map_err(processing)?;
        trace.advance(key, Stage::Built);

        let exists = self.call(&format!("lookup {key}"), || {
            self.catalog.exists(key.entity_type, &key.fqn)
        })?;
        trace.advance(key, Stage::LookedUp);

        let mode = IdempotencyMode::resolve(decl.idempotency, self.default_mode);
        let mut action = mode.decide(exists);
        trace.reason = Some(action.reason().to_string());

        if action == Action::Update {
            let delta = if handler.supports_schema() {
                let previous = self.call(&format!("fetch shape of {key}"), || {
                    self.catalog.get_structural_shape(key.entity_type, &key.fqn)
                })?;
                SchemaDelta::compare(&previous, &candidate.shape)
            } else {
                SchemaDelta::default()
            };
            if delta.is_empty() {
                action = Action::SkipExisting;
                trace.downgraded = true;
                trace.reason = Some("entity exists with no structural changes".to_string());
            } else {
                log::debug!("{key}: {}", delta.summary());
            }
            trace.delta = Some(delta);
        }
        trace.action = Some(action);
        trace.advance(key, Stage::Decided);

        let applied = match action {
            Action::FailExisting => {
                return Err(Failure::new(
                    FailureKind::ExistingEntityConflict,
                    format!("{key} already exists and its idempotency mode is fail"),
                ));
            }
            Action::SkipExisting => return Ok((Outcome::Skipped, candidate)),
            Action::Create | Action::Update if ctx.is_dry_run() => (Outcome::DryRun, candidate),
            Action::Create => {
                let stored =
                    self.call(&format!("create {key}"), || self.catalog.create(&candidate))?;
                (Outcome::Created, stored)
            }
            Action::Update => {
                let stored = self.call(&format!("update {key}"), || {
                    self.catalog.update(&key.fqn, &candidate)
                })?;
                (Outcome::Updated, stored)
            }
        };
        trace.advance(key, Stage::Applied);
        Ok(applied)
    }

    /// A parent counts as present if this run processed it successfully,
    /// or failing that, if the catalog already has it.
    fn check_dependency(
        &self,
        ctx: &ExecutionContext,
        dependency: &EntityKey,
    ) -> std::result::Result<(), Failure> {
        if ctx.lookup(dependency.entity_type, &dependency.fqn).is_some() {
            log::debug!("Dependency {dependency} processed in this run");
            return Ok(());
        }

        let exists = self.call(&format!("lookup {dependency}"), || {
            self.catalog.exists(dependency.entity_type, &dependency.fqn)
        })?;
        if exists {
            log::debug!("Dependency {dependency} found in catalog");
            Ok(())
        } else {
            Err(Failure::new(
                FailureKind::DependencyMissing,
                format!(
                    "dependency {dependency} is neither processed in this run \
                     nor present in the catalog"
                ),
            ))
        }
    }

    fn call<T>(
        &self,
        operation: &str,
        op: impl FnMut() -> CatalogResult<T>,
    ) -> std::result::Result<T, Failure> {
        let callback = LogCallback { operation };
        with_retry(self.retry, Some(&callback), op)
            .map_err(|e| catalog_failure(&e, self.retry.attempts()))
    }
}
