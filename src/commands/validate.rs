//! `catalog-ingest validate`: check a configuration without running it.

use std::process::ExitCode;

use anyhow::Result;

use crate::Context;
use crate::cli::ConfigArgs;
use crate::ui;

pub fn run(ctx: &Context, args: &ConfigArgs) -> Result<ExitCode> {
    let (path, config) = super::load_config(args)?;

    ui::success(&format!("{} is valid", path.display()));
    if !ctx.quiet {
        ui::kv("job", &format!("{} v{}", config.metadata.name, config.metadata.version));
        if let Some(description) = &config.metadata.description {
            ui::kv("description", description);
        }
        ui::kv("catalog", &format!("{}/api/{}", config.catalog.host, config.catalog.api_version));
        ui::kv("sources", &config.sources.len().to_string());
        ui::kv("declarations", &config.entities.len().to_string());
        let discovered = config.entities.iter().filter(|e| e.discovery.is_some()).count();
        if discovered > 0 {
            ui::dim(&format!("{discovered} declarations expand through discovery at run time"));
        }
    }
    Ok(ExitCode::SUCCESS)
}
