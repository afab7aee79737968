//! JSON Lines audit trail.
//!
//! One object per line: an `entity` record for every kept event, then a
//! final `summary` record. The file is opened on the first record and flushed
//! after each line. Write failures are logged and never fail the run.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use ingestion::{AuditEvent, AuditSink, Outcome, RunSummary};
use serde::Serialize;

use crate::config::AuditSection;

#[derive(Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum Record<'a> {
    Entity(&'a AuditEvent),
    Summary {
        job: &'a str,
        summary: &'a RunSummary,
    },
}

/// Audit sink writing `{output_dir}/{job}_{timestamp}.jsonl`.
pub struct JsonLinesAudit {
    job: String,
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    disabled: bool,
    include_success: bool,
    include_skipped: bool,
}

impl JsonLinesAudit {
    /// Create the output directory and pick a fresh log file name.
    ///
    /// Nothing is written until the first record arrives, so a run that
    /// aborts before processing any entity leaves no file behind.
    pub fn create(settings: &AuditSection, job: &str) -> Result<Self> {
        fs::create_dir_all(&settings.output_dir).with_context(|| {
            format!("Could not create audit directory {}", settings.output_dir.display())
        })?;
        let file_name = format!(
            "{}_{}.jsonl",
            sanitize(job),
            Utc::now().format("%Y%m%dT%H%M%SZ")
        );

        Ok(Self {
            job: job.to_string(),
            path: settings.output_dir.join(file_name),
            writer: None,
            disabled: false,
            include_success: settings.include_success,
            include_skipped: settings.include_skipped,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn keeps(&self, event: &AuditEvent) -> bool {
        match event.outcome {
            Outcome::Created | Outcome::Updated | Outcome::DryRun => self.include_success,
            Outcome::Skipped => self.include_skipped,
            Outcome::Failed => true,
        }
    }

    fn write(&mut self, record: &Record<'_>) {
        if self.disabled {
            return;
        }
        if let Err(e) = self.append(record) {
            log::warn!("Audit log {} disabled after write error: {e}", self.path.display());
            self.writer = None;
            self.disabled = true;
        }
    }

    fn append(&mut self, record: &Record<'_>) -> io::Result<()> {
        let writer = match self.writer.take() {
            Some(writer) => writer,
            None => BufWriter::new(File::create(&self.path)?),
        };
        write_line(self.writer.insert(writer), record)
    }
}

fn write_line(writer: &mut impl Write, record: &Record<'_>) -> io::Result<()> {
    serde_json::to_writer(&mut *writer, record)?;
    writer.write_all(b"\n")?;
    writer.flush()
}

/// Job names become file name prefixes.
fn sanitize(job: &str) -> String {
    job.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

impl AuditSink for JsonLinesAudit {
    fn on_event(&mut self, event: &AuditEvent) {
        if self.keeps(event) {
            self.write(&Record::Entity(event));
        }
    }

    fn on_complete(&mut self, summary: &RunSummary) -> Option<PathBuf> {
        let job = self.job.clone();
        self.write(&Record::Summary {
            job: &job,
            summary,
        });
        self.writer.take().map(|_| self.path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingestion::catalog::MemoryCatalog;
    use ingestion::{EngineOptions, EntityDeclaration, EntityType, IngestionEngine, NoProgress};
    use serde_json::Value;
    use tempfile::TempDir;

    fn settings(dir: &Path) -> AuditSection {
        AuditSection {
            enabled: true,
            output_dir: dir.join("audit"),
            include_success: true,
            include_skipped: true,
        }
    }

    fn declarations() -> Vec<EntityDeclaration> {
        vec![
            EntityDeclaration::named(EntityType::DatabaseService, "warehouse")
                .with_property("service_type", "Postgres"),
            EntityDeclaration::named(EntityType::Database, "sales")
                .with_property("service", "warehouse"),
        ]
    }

    fn read_lines(path: &Path) -> Vec<Value> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_writes_events_then_summary() {
        let temp = TempDir::new().unwrap();
        let mut audit = JsonLinesAudit::create(&settings(temp.path()), "nightly load").unwrap();
        let engine = IngestionEngine::new(MemoryCatalog::new(), EngineOptions::default());

        let report = engine.run(declarations(), &mut NoProgress, &mut audit).unwrap();

        let path = report.summary.audit_log.clone().unwrap();
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("nightly_load_"));
        assert_eq!(path.extension().unwrap(), "jsonl");

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["record"], "entity");
        assert_eq!(lines[0]["sequence"], 1);
        assert_eq!(lines[0]["fqn"], "warehouse");
        assert_eq!(lines[0]["outcome"], "created");
        assert_eq!(lines[1]["fqn"], "warehouse.sales");
        assert_eq!(lines[2]["record"], "summary");
        assert_eq!(lines[2]["job"], "nightly load");
        assert_eq!(lines[2]["summary"]["created"], 2);
    }

    #[test]
    fn test_skipped_events_filtered() {
        let temp = TempDir::new().unwrap();
        let engine = IngestionEngine::new(MemoryCatalog::new(), EngineOptions::default());
        engine.run_simple(declarations()).unwrap();

        let mut quiet = settings(temp.path());
        quiet.include_skipped = false;
        let mut audit = JsonLinesAudit::create(&quiet, "rerun").unwrap();
        let report = engine.run(declarations(), &mut NoProgress, &mut audit).unwrap();
        assert_eq!(report.summary.skipped, 2);

        let lines = read_lines(audit.path());
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["record"], "summary");
    }

    #[test]
    fn test_failures_always_kept() {
        let temp = TempDir::new().unwrap();
        let mut strict = settings(temp.path());
        strict.include_success = false;
        strict.include_skipped = false;
        let mut audit = JsonLinesAudit::create(&strict, "orphans").unwrap();

        let engine = IngestionEngine::new(MemoryCatalog::new(), EngineOptions::default());
        let orphan = EntityDeclaration::named(EntityType::Database, "sales")
            .with_property("service", "nowhere");
        engine.run(vec![orphan], &mut NoProgress, &mut audit).unwrap();

        let lines = read_lines(audit.path());
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["outcome"], "failed");
        assert_eq!(lines[0]["failure"]["kind"], "dependency_missing");
    }

    #[test]
    fn test_each_event_visible_before_completion() {
        let temp = TempDir::new().unwrap();
        let engine = IngestionEngine::new(MemoryCatalog::new(), EngineOptions::default());
        let report = engine.run_simple(declarations()).unwrap();

        let mut audit = JsonLinesAudit::create(&settings(temp.path()), "live").unwrap();
        audit.on_event(&report.events[0]);
        let lines = read_lines(audit.path());
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["fqn"], "warehouse");

        audit.on_event(&report.events[1]);
        assert_eq!(read_lines(audit.path()).len(), 2);

        let path = audit.on_complete(&report.summary).unwrap();
        assert_eq!(read_lines(&path).len(), 3);
    }

    #[test]
    fn test_no_file_until_first_record() {
        let temp = TempDir::new().unwrap();
        let audit = JsonLinesAudit::create(&settings(temp.path()), "idle").unwrap();
        assert!(temp.path().join("audit").is_dir());
        assert!(!audit.path().exists());
    }

    #[test]
    fn test_sanitize_job_name() {
        assert_eq!(sanitize("nightly/load v2"), "nightly_load_v2");
        assert_eq!(sanitize("ok-name_1"), "ok-name_1");
    }
}
