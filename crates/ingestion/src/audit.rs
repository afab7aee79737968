//! Audit events and the callbacks that observe a run.
//!
//! Every entity that reaches a terminal state produces exactly one
//! [`AuditEvent`]. The engine numbers them, keeps them in an [`AuditLog`],
//! and hands each one to the run's [`AuditSink`] and [`ProgressCallback`]
//! as it happens.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::idempotency::Action;
use crate::schema::SchemaDelta;
use crate::summary::RunSummary;
use crate::types::{EntityKey, EntityType};

/// Terminal outcome of one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Created,
    Updated,
    Skipped,
    Failed,
    /// A write that would have happened outside dry-run mode.
    DryRun,
}

impl Outcome {
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
            Self::DryRun => "dry_run",
        };
        f.write_str(s)
    }
}

/// Why an entity failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A parent is neither processed in this run nor present in the catalog.
    DependencyMissing,
    /// Malformed declaration or any other failure while building it.
    EntityProcessing,
    /// The entity exists and its idempotency mode is `fail`.
    ExistingEntityConflict,
    /// The catalog stayed unavailable through every retry.
    CatalogTransient,
    /// The catalog refused the request.
    CatalogPermanent,
}

impl FailureKind {
    /// Whether the run keeps going with this entity's dependents.
    ///
    /// Only a missing dependency blocks the dependent subtree; every other
    /// kind is attributed to the one entity.
    #[must_use]
    pub const fn is_optimistic(&self) -> bool {
        !matches!(self, Self::DependencyMissing)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DependencyMissing => "dependency missing",
            Self::EntityProcessing => "entity processing error",
            Self::ExistingEntityConflict => "existing entity conflict",
            Self::CatalogTransient => "catalog unavailable",
            Self::CatalogPermanent => "catalog rejected request",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Immutable record of one executor decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// 1-based position in the run's audit log.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub entity_type: EntityType,
    pub fqn: String,
    pub outcome: Outcome,
    /// Decided action; in dry runs, the one that was simulated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    /// An update was turned into a skip because nothing changed.
    pub downgraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<SchemaDelta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    /// False for entities blocked by a failed ancestor.
    pub attempted: bool,
    pub duration_ms: u64,
}

impl AuditEvent {
    /// Event for an entity never attempted because `blocker` was missing.
    #[must_use]
    pub fn blocked(key: &EntityKey, blocker: &EntityKey) -> Self {
        Self {
            sequence: 0,
            timestamp: Utc::now(),
            entity_type: key.entity_type,
            fqn: key.fqn.clone(),
            outcome: Outcome::Failed,
            action: None,
            downgraded: false,
            reason: None,
            delta: None,
            failure: Some(Failure::new(
                FailureKind::DependencyMissing,
                format!("not attempted: dependency {blocker} is missing"),
            )),
            attempted: false,
            duration_ms: 0,
        }
    }

    #[must_use]
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.entity_type, self.fqn.clone())
    }

    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure.as_ref().map(|f| f.kind)
    }
}

/// Append-only, run-scoped sequence of audit events.
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    events: Vec<AuditEvent>,
}

impl AuditLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number the event and append it.
    pub fn append(&mut self, mut event: AuditEvent) -> &AuditEvent {
        event.sequence = self.events.len() as u64 + 1;
        self.events.push(event);
        &self.events[self.events.len() - 1]
    }

    #[must_use]
    pub fn events(&self) -> &[AuditEvent] {
        &self.events
    }

    #[must_use]
    pub fn into_events(self) -> Vec<AuditEvent> {
        self.events
    }
}

/// Persists the audit trail of a run.
pub trait AuditSink {
    /// Called once per event, in log order.
    fn on_event(&mut self, event: &AuditEvent);

    /// Called after the last event; returns where the trail was written.
    fn on_complete(&mut self, summary: &RunSummary) -> Option<PathBuf>;
}

/// Audit sink that keeps nothing.
pub struct NoAudit;

impl AuditSink for NoAudit {
    fn on_event(&mut self, _event: &AuditEvent) {}

    fn on_complete(&mut self, _summary: &RunSummary) -> Option<PathBuf> {
        None
    }
}

/// Callback trait for run progress reporting.
pub trait ProgressCallback {
    /// Called once the execution order is known.
    fn on_run_start(&mut self, total: usize);

    /// Called before an entity is processed.
    fn on_entity_start(&mut self, key: &EntityKey);

    /// Called after an entity reached a terminal state.
    fn on_entity_complete(&mut self, event: &AuditEvent);

    /// Called when the run is finished.
    fn on_run_complete(&mut self);
}

/// No-op progress callback.
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_run_start(&mut self, _total: usize) {}
    fn on_entity_start(&mut self, _key: &EntityKey) {}
    fn on_entity_complete(&mut self, _event: &AuditEvent) {}
    fn on_run_complete(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_dependency_missing_is_pessimistic() {
        assert!(!FailureKind::DependencyMissing.is_optimistic());
        assert!(FailureKind::EntityProcessing.is_optimistic());
        assert!(FailureKind::ExistingEntityConflict.is_optimistic());
        assert!(FailureKind::CatalogTransient.is_optimistic());
        assert!(FailureKind::CatalogPermanent.is_optimistic());
    }

    #[test]
    fn test_log_assigns_sequence_numbers() {
        let parent = EntityKey::new(EntityType::Database, "svc.db");
        let mut log = AuditLog::new();

        let first = log
            .append(AuditEvent::blocked(&EntityKey::new(EntityType::Table, "a"), &parent))
            .sequence;
        let second = log
            .append(AuditEvent::blocked(&EntityKey::new(EntityType::Table, "b"), &parent))
            .sequence;

        assert_eq!((first, second), (1, 2));
        assert_eq!(log.events().len(), 2);
    }

    #[test]
    fn test_blocked_event() {
        let key = EntityKey::new(EntityType::DatabaseSchema, "svc.db.public");
        let parent = EntityKey::new(EntityType::Database, "svc.db");
        let event = AuditEvent::blocked(&key, &parent);

        assert!(!event.attempted);
        assert_eq!(event.outcome, Outcome::Failed);
        assert_eq!(event.failure_kind(), Some(FailureKind::DependencyMissing));
        assert!(event.failure.unwrap().message.contains("database:svc.db"));
    }

    #[test]
    fn test_event_serializes_snake_case() {
        let key = EntityKey::new(EntityType::Table, "svc.db.s.t");
        let parent = EntityKey::new(EntityType::DatabaseSchema, "svc.db.s");
        let json = serde_json::to_value(AuditEvent::blocked(&key, &parent)).unwrap();

        assert_eq!(json["entity_type"], "table");
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["failure"]["kind"], "dependency_missing");
        assert!(json.get("delta").is_none());
    }
}
