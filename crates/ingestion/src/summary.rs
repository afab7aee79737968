//! Run counters and the final run summary.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audit::Outcome;

/// Monotonic counters kept by the execution context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub created: usize,
    pub updated: usize,
    /// Writes simulated in dry-run mode.
    pub previewed: usize,
    /// Never attempted because a dependency was missing.
    pub blocked: usize,
}

impl RunCounters {
    /// Count an entity the executor processed.
    pub fn add_outcome(&mut self, outcome: Outcome) {
        self.attempted += 1;
        match outcome {
            Outcome::Created => {
                self.created += 1;
                self.succeeded += 1;
            }
            Outcome::Updated => {
                self.updated += 1;
                self.succeeded += 1;
            }
            Outcome::DryRun => {
                self.previewed += 1;
                self.succeeded += 1;
            }
            Outcome::Skipped => self.skipped += 1,
            Outcome::Failed => self.failed += 1,
        }
    }

    /// Count an entity that was blocked before any attempt.
    pub fn add_blocked(&mut self) {
        self.blocked += 1;
        self.failed += 1;
    }

    /// Entities with a terminal state so far.
    #[must_use]
    pub fn total(&self) -> usize {
        self.attempted + self.blocked
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub attempted: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Includes blocked entities.
    pub failed: usize,
    pub blocked: usize,
    pub previewed: usize,
    pub dry_run: bool,
    pub elapsed: Duration,
    /// Sources that could not be expanded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub discovery_errors: Vec<String>,
    /// Where the audit trail was persisted, if anywhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_log: Option<PathBuf>,
}

impl RunSummary {
    #[must_use]
    pub fn from_counters(counters: &RunCounters, dry_run: bool, elapsed: Duration) -> Self {
        Self {
            total: counters.total(),
            attempted: counters.attempted,
            created: counters.created,
            updated: counters.updated,
            skipped: counters.skipped,
            failed: counters.failed,
            blocked: counters.blocked,
            previewed: counters.previewed,
            dry_run,
            elapsed,
            discovery_errors: Vec::new(),
            audit_log: None,
        }
    }

    /// Check if the run was fully successful (no failures)
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.discovery_errors.is_empty()
    }

    /// Total number of catalog changes made (or previewed)
    #[must_use]
    pub fn total_changes(&self) -> usize {
        self.created + self.updated + self.previewed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_track_outcomes() {
        let mut counters = RunCounters::default();
        counters.add_outcome(Outcome::Created);
        counters.add_outcome(Outcome::Updated);
        counters.add_outcome(Outcome::Skipped);
        counters.add_outcome(Outcome::Failed);
        counters.add_outcome(Outcome::DryRun);

        assert_eq!(counters.attempted, 5);
        assert_eq!(counters.succeeded, 3);
        assert_eq!(counters.skipped, 1);
        assert_eq!(counters.failed, 1);
        assert_eq!(counters.previewed, 1);
    }

    #[test]
    fn test_blocked_counts_as_failed_not_attempted() {
        let mut counters = RunCounters::default();
        counters.add_outcome(Outcome::Failed);
        counters.add_blocked();

        assert_eq!(counters.attempted, 1);
        assert_eq!(counters.failed, 2);
        assert_eq!(counters.blocked, 1);
        assert_eq!(counters.total(), 2);
    }

    #[test]
    fn test_summary_success() {
        let mut counters = RunCounters::default();
        counters.add_outcome(Outcome::Created);
        let mut summary = RunSummary::from_counters(&counters, false, Duration::from_millis(5));
        assert!(summary.is_success());
        assert_eq!(summary.total_changes(), 1);

        summary.discovery_errors.push("lake: unreachable".into());
        assert!(!summary.is_success());
    }
}
