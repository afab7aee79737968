//! Run configuration.
//!
//! A single TOML file describes the catalog to write to, the sources that
//! discovery declarations read from, and the entities of the run:
//!
//! ```toml
//! [metadata]
//! name = "nightly-warehouse"
//!
//! [catalog]
//! host = "http://localhost:8585"
//!
//! [catalog.auth]
//! type = "jwt"
//! jwt_token = "${CATALOG_TOKEN}"
//!
//! [[sources]]
//! name = "lake"
//! type = "json_file"
//! properties = { path = "~/exports/tables" }
//!
//! [[entities]]
//! type = "database_service"
//! name = "warehouse"
//! properties = { service_type = "Postgres" }
//!
//! [[entities]]
//! type = "table"
//! discovery = { source = "lake", include_pattern = "sales_.*" }
//! properties = { service = "warehouse", database = "sales", database_schema = "public" }
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use ingestion::catalog::http::HttpCatalogConfig;
use ingestion::source::compile;
use ingestion::{
    DiscoveryRef, EngineOptions, EntityDeclaration, EntityType, IdempotencyMode, RetryConfig,
    SourceConfig, SourceRegistry,
};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Environment variable overriding the config file location
pub const ENV_CONFIG: &str = "CATALOG_INGEST_CONFIG";

/// Default config file: `~/.config/catalog-ingest/config.toml`
pub fn default_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home
        .join(".config")
        .join("catalog-ingest")
        .join("config.toml"))
}

// ============================================================================
// Schema
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub metadata: Metadata,
    pub catalog: CatalogSection,
    #[serde(default)]
    pub sources: Vec<SourceSection>,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub entities: Vec<EntitySection>,
    #[serde(default)]
    pub audit: AuditSection,
    #[serde(default)]
    pub execution: ExecutionSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Metadata {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_version() -> String {
    "1.0".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogSection {
    pub host: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub auth: Auth,
}

fn default_api_version() -> String {
    "v1".to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Auth {
    #[default]
    NoAuth,
    Jwt { jwt_token: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceSection {
    pub name: String,
    #[serde(rename = "type")]
    pub source_type: String,
    #[serde(default)]
    pub properties: toml::Table,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Defaults {
    #[serde(default)]
    pub idempotency: IdempotencyMode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntitySection {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub discovery: Option<DiscoverySection>,
    #[serde(default)]
    pub properties: toml::Table,
    #[serde(default)]
    pub idempotency: Option<IdempotencyMode>,
}

impl EntitySection {
    /// Name for messages: the entity name, or the source it is discovered from.
    fn label(&self, index: usize) -> String {
        match (&self.name, &self.discovery) {
            (Some(name), _) => format!("entities[{index}] {} '{name}'", self.entity_type),
            (None, Some(d)) => {
                format!("entities[{index}] {} from '{}'", self.entity_type, d.source)
            }
            (None, None) => format!("entities[{index}] {}", self.entity_type),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverySection {
    pub source: String,
    #[serde(default)]
    pub include_pattern: Option<String>,
    #[serde(default)]
    pub exclude_pattern: Option<String>,
    #[serde(default)]
    pub filter: toml::Table,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_true")]
    pub include_success: bool,
    #[serde(default = "default_true")]
    pub include_skipped: bool,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            enabled: true,
            output_dir: default_output_dir(),
            include_success: true,
            include_skipped: true,
        }
    }
}

const fn default_true() -> bool {
    true
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./audit_logs")
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutionSection {
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub retry: RetrySection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_base_delay_ms() -> u64 {
    1000
}

const fn default_backoff_factor() -> f64 {
    2.0
}

const fn default_max_delay_ms() -> u64 {
    60_000
}

/// Every problem found in a configuration, reported together.
#[derive(Debug, thiserror::Error)]
#[error("invalid configuration ({} problems):\n{}", .issues.len(), format_issues(.issues))]
pub struct ConfigInvalid {
    pub issues: Vec<String>,
}

fn format_issues(issues: &[String]) -> String {
    issues
        .iter()
        .map(|issue| format!("  - {issue}"))
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Loading
// ============================================================================

impl Config {
    /// Read, parse and environment-expand a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Parse config text and expand environment references.
    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content).context("Failed to parse TOML")?;
        config.expand_env()?;
        Ok(config)
    }

    fn expand_env(&mut self) -> Result<()> {
        if let Auth::Jwt { jwt_token } = &mut self.catalog.auth {
            let expanded = shellexpand::env(jwt_token.as_str())
                .context("Could not expand catalog.auth.jwt_token")?
                .into_owned();
            *jwt_token = expanded;
        }

        for source in &mut self.sources {
            for (_, value) in source.properties.iter_mut() {
                expand_value(value);
            }
        }

        let output_dir = self.audit.output_dir.to_string_lossy().into_owned();
        let expanded = shellexpand::full(&output_dir)
            .context("Could not expand audit.output_dir")?
            .into_owned();
        self.audit.output_dir = PathBuf::from(expanded);
        Ok(())
    }

    /// Check the whole configuration before any engine work.
    ///
    /// `sources` is the connector registry the run will use; every
    /// configured source type must be registered in it.
    pub fn validate(&self, sources: &SourceRegistry) -> std::result::Result<(), ConfigInvalid> {
        let mut issues = Vec::new();

        if self.metadata.name.trim().is_empty() {
            issues.push("metadata.name must not be empty".to_string());
        }
        let host = &self.catalog.host;
        if !(host.starts_with("http://") || host.starts_with("https://")) {
            issues.push(format!("catalog.host '{host}' is not an http(s) URL"));
        }
        if self.execution.retry.max_attempts == 0 {
            issues.push("execution.retry.max_attempts must be at least 1".to_string());
        }
        let factor = self.execution.retry.backoff_factor;
        if !factor.is_finite() || factor < 1.0 {
            issues.push(format!(
                "execution.retry.backoff_factor must be a finite number >= 1.0, got {factor}"
            ));
        }

        let mut source_names = HashSet::new();
        for source in &self.sources {
            if !source_names.insert(source.name.as_str()) {
                issues.push(format!("source '{}' is declared more than once", source.name));
            }
            if !sources.contains(&source.source_type) {
                issues.push(format!(
                    "source '{}' has unknown type '{}' (known: {})",
                    source.name,
                    source.source_type,
                    sources.registered_types().join(", ")
                ));
            }
        }

        for (index, entity) in self.entities.iter().enumerate() {
            let label = entity.label(index);
            match (&entity.name, &entity.discovery) {
                (None, None) => issues.push(format!("{label}: needs a name or a discovery")),
                (_, Some(discovery)) => {
                    if !source_names.contains(discovery.source.as_str()) {
                        issues.push(format!(
                            "{label}: discovery references undeclared source '{}'",
                            discovery.source
                        ));
                    }
                    let patterns = [&discovery.include_pattern, &discovery.exclude_pattern];
                    for pattern in patterns.into_iter().flatten() {
                        if let Err(e) = compile(pattern) {
                            issues.push(format!("{label}: {e}"));
                        }
                    }
                }
                (Some(_), None) => {}
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigInvalid { issues })
        }
    }

    // ========================================================================
    // Conversions
    // ========================================================================

    pub fn declarations(&self) -> Result<Vec<EntityDeclaration>> {
        self.entities
            .iter()
            .enumerate()
            .map(|(index, entity)| {
                let discovery = entity
                    .discovery
                    .as_ref()
                    .map(|d| -> Result<DiscoveryRef> {
                        Ok(DiscoveryRef {
                            source: d.source.clone(),
                            include_pattern: d.include_pattern.clone(),
                            exclude_pattern: d.exclude_pattern.clone(),
                            filter: to_json_map(&d.filter)?,
                        })
                    })
                    .transpose()?;
                Ok(EntityDeclaration {
                    entity_type: entity.entity_type,
                    name: entity.name.clone(),
                    discovery,
                    properties: to_json_map(&entity.properties).with_context(|| {
                        format!("Invalid properties for {}", entity.label(index))
                    })?,
                    idempotency: entity.idempotency,
                    shape: None,
                })
            })
            .collect()
    }

    pub fn source_configs(&self) -> Result<Vec<SourceConfig>> {
        self.sources
            .iter()
            .map(|source| {
                Ok(SourceConfig {
                    name: source.name.clone(),
                    source_type: source.source_type.clone(),
                    properties: to_json_map(&source.properties).with_context(|| {
                        format!("Invalid properties for source '{}'", source.name)
                    })?,
                })
            })
            .collect()
    }

    /// Engine options; `force_dry_run` comes from the command line.
    pub fn engine_options(&self, force_dry_run: bool) -> EngineOptions {
        let retry = &self.execution.retry;
        EngineOptions {
            dry_run: force_dry_run || self.execution.dry_run,
            default_idempotency: Some(self.defaults.idempotency),
            retry: RetryConfig {
                max_attempts: retry.max_attempts,
                base_delay: Duration::from_millis(retry.base_delay_ms),
                backoff_factor: retry.backoff_factor,
                max_delay: Duration::from_millis(retry.max_delay_ms),
            },
        }
    }

    pub fn catalog_config(&self) -> HttpCatalogConfig {
        HttpCatalogConfig {
            host: self.catalog.host.clone(),
            api_version: self.catalog.api_version.clone(),
            timeout: Duration::from_secs(self.catalog.timeout_secs),
            jwt_token: match &self.catalog.auth {
                Auth::NoAuth => None,
                Auth::Jwt { jwt_token } => Some(jwt_token.clone()),
            },
        }
    }
}

/// Expand `${VAR}` and a leading `~` in every string, leaving unset
/// variables as written.
fn expand_value(value: &mut toml::Value) {
    match value {
        toml::Value::String(s) => {
            let expanded = shellexpand::full_with_context_no_errors(
                s.as_str(),
                || dirs::home_dir().map(|home| home.to_string_lossy().into_owned()),
                |var| std::env::var(var).ok(),
            )
            .into_owned();
            *s = expanded;
        }
        toml::Value::Array(items) => items.iter_mut().for_each(expand_value),
        toml::Value::Table(table) => table.iter_mut().for_each(|(_, v)| expand_value(v)),
        _ => {}
    }
}

/// Convert a TOML table to the JSON map shape handlers read.
fn to_json_map(table: &toml::Table) -> Result<Map<String, Value>> {
    match serde_json::to_value(table)? {
        Value::Object(map) => Ok(map),
        other => bail!("expected a table, got {other}"),
    }
}
