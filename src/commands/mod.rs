pub mod plan;
pub mod run;
pub mod validate;

use std::path::PathBuf;

use anyhow::Result;

use crate::cli::ConfigArgs;
use crate::config::{self, Config};
use crate::sources;

/// Resolve the config path, then load and validate it.
pub(crate) fn load_config(args: &ConfigArgs) -> Result<(PathBuf, Config)> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => config::default_path()?,
    };
    log::debug!("Loading config from {}", path.display());

    let config = Config::load(&path)?;
    config.validate(&sources::registry())?;
    Ok((path, config))
}
