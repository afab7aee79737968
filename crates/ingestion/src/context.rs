//! Run-scoped execution state.

use std::collections::HashMap;

use crate::audit::Outcome;
use crate::error::{Error, Result};
use crate::summary::RunCounters;
use crate::types::{CatalogEntity, EntityKey, EntityType};

/// An entity that reached a terminal state in this run.
#[derive(Debug, Clone)]
pub struct ProcessedEntity {
    pub outcome: Outcome,
    /// What the catalog returned, or the candidate when nothing was written.
    pub entity: Option<CatalogEntity>,
}

/// State for exactly one run.
///
/// Holds the processed-entity cache dependents consult, the dry-run flag,
/// and the run counters. Never shared between runs.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    dry_run: bool,
    processed: HashMap<EntityKey, ProcessedEntity>,
    counters: RunCounters,
}

impl ExecutionContext {
    #[must_use]
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Record a processed entity and count its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRecorded`] if the entity was already recorded
    /// in this run; the counters are left untouched in that case.
    pub fn record(
        &mut self,
        entity_type: EntityType,
        fqn: impl Into<String>,
        entity: Option<CatalogEntity>,
        outcome: Outcome,
    ) -> Result<()> {
        self.insert(EntityKey::new(entity_type, fqn), ProcessedEntity { outcome, entity })?;
        self.counters.add_outcome(outcome);
        Ok(())
    }

    /// Record an entity that was never attempted because a dependency was
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRecorded`] on a repeated key.
    pub fn record_blocked(&mut self, key: EntityKey) -> Result<()> {
        self.insert(
            key,
            ProcessedEntity {
                outcome: Outcome::Failed,
                entity: None,
            },
        )?;
        self.counters.add_blocked();
        Ok(())
    }

    fn insert(&mut self, key: EntityKey, processed: ProcessedEntity) -> Result<()> {
        if self.processed.contains_key(&key) {
            return Err(Error::AlreadyRecorded {
                key: key.to_string(),
            });
        }
        log::trace!("{key} -> {}", processed.outcome);
        self.processed.insert(key, processed);
        Ok(())
    }

    /// The entity processed in this run, if its outcome was not a failure.
    #[must_use]
    pub fn lookup(&self, entity_type: EntityType, fqn: &str) -> Option<&CatalogEntity> {
        self.processed
            .get(&EntityKey::new(entity_type, fqn))
            .filter(|p| !p.outcome.is_failed())
            .and_then(|p| p.entity.as_ref())
    }

    /// Outcome recorded for an entity, failed or not.
    #[must_use]
    pub fn outcome(&self, key: &EntityKey) -> Option<Outcome> {
        self.processed.get(key).map(|p| p.outcome)
    }

    #[must_use]
    pub const fn counters(&self) -> &RunCounters {
        &self.counters
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.processed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }
}
