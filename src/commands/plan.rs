//! `catalog-ingest plan`: print the execution order without writing.

use std::process::ExitCode;

use anyhow::{Context as _, Result};
use colored::Colorize;
use ingestion::catalog::http::HttpCatalog;
use ingestion::{IdempotencyMode, IngestionEngine, Plan};

use crate::Context;
use crate::cli::ConfigArgs;
use crate::sources;
use crate::ui;

pub fn run(ctx: &Context, args: &ConfigArgs) -> Result<ExitCode> {
    let (_, config) = super::load_config(args)?;

    // Planning never calls the catalog; the client only satisfies the engine type.
    let catalog = HttpCatalog::new(&config.catalog_config());
    let engine = IngestionEngine::new(catalog, config.engine_options(true))
        .with_sources(sources::registry(), config.source_configs()?);
    let plan = engine
        .plan(config.declarations()?)
        .context("Could not resolve the execution order")?;

    ui::header(&format!(
        "Execution order for {} ({} entities)",
        config.metadata.name,
        plan.order.len()
    ));
    for line in render(&plan, ctx.verbose > 0, Some(config.defaults.idempotency)) {
        println!("{line}");
    }

    for message in &plan.discovery_errors {
        ui::warn(message);
    }
    Ok(if plan.discovery_errors.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// One line per entity, its dependencies indented below it.
fn render(plan: &Plan, detailed: bool, default_mode: Option<IdempotencyMode>) -> Vec<String> {
    let mut lines = Vec::new();
    for (position, planned) in plan.order.iter().enumerate() {
        let mut line = format!("{:>4}. {}", position + 1, planned.key);
        if detailed {
            let mode = IdempotencyMode::resolve(planned.declaration.idempotency, default_mode);
            line.push_str(&format!(" [{mode}]"));
        }
        lines.push(line);

        if let Some(error) = &planned.plan_error {
            lines.push(format!("        {} {error}", "!".red()));
        }
        for dependency in &planned.dependencies {
            lines.push(format!("        {} {dependency}", "←".dimmed()));
        }
    }
    lines
}
