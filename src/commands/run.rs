//! `catalog-ingest run`: execute a configured ingestion job.

use std::process::ExitCode;

use anyhow::{Context as _, Result};
use ingestion::catalog::Catalog;
use ingestion::catalog::http::HttpCatalog;
use ingestion::{IngestionEngine, NoAudit, RunReport, RunSummary};

use crate::Context;
use crate::audit_log::JsonLinesAudit;
use crate::cli::RunArgs;
use crate::config::Config;
use crate::progress::RunProgress;
use crate::sources;
use crate::ui;

pub fn run(ctx: &Context, args: &RunArgs) -> Result<ExitCode> {
    let (path, config) = super::load_config(&args.config)?;
    let options = config.engine_options(args.dry_run);

    if !ctx.quiet {
        ui::header(&format!("Ingesting {}", config.metadata.name));
        ui::kv("config", &path.display().to_string());
        ui::kv("catalog", &config.catalog.host);
        ui::kv("declarations", &config.entities.len().to_string());
        ui::kv("default idempotency", config.defaults.idempotency.as_str());
        println!();
    }

    if options.dry_run {
        ui::warn("Dry run: nothing will be written to the catalog");
    } else if !args.yes && !confirm_proceed()? {
        ui::info("Aborted");
        return Ok(ExitCode::SUCCESS);
    }

    let catalog = HttpCatalog::new(&config.catalog_config());
    let engine = IngestionEngine::new(catalog, options)
        .with_sources(sources::registry(), config.source_configs()?);
    let report = execute(ctx, &engine, &config)?;

    ui::print_report(&report);

    if report.summary.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        ui::error(&failure_message(&report.summary));
        Ok(ExitCode::FAILURE)
    }
}

fn failure_message(summary: &RunSummary) -> String {
    let sources = summary.discovery_errors.len();
    match (summary.failed, sources) {
        (failed, 0) => format!("{failed} of {} entities failed", summary.total),
        (0, sources) => format!("Discovery failed for {sources} declaration(s)"),
        (failed, sources) => format!(
            "{failed} of {} entities failed; discovery failed for {sources} declaration(s)",
            summary.total
        ),
    }
}

/// Run the engine with the configured audit sink and a progress bar.
pub(crate) fn execute<C: Catalog>(
    ctx: &Context,
    engine: &IngestionEngine<C>,
    config: &Config,
) -> Result<RunReport> {
    let declarations = config.declarations()?;
    let mut progress = RunProgress::new(!ctx.quiet);

    let report = if config.audit.enabled {
        let mut audit = JsonLinesAudit::create(&config.audit, &config.metadata.name)?;
        log::debug!("Audit log will be written to {}", audit.path().display());
        engine.run(declarations, &mut progress, &mut audit)
    } else {
        engine.run(declarations, &mut progress, &mut NoAudit)
    };
    report.context("Ingestion run aborted before any entity was processed")
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    dialoguer::Confirm::new()
        .with_prompt("Write these entities to the catalog?")
        .default(true)
        .interact()
        .context("Failed to read confirmation")
}
