//! What to do with an entity that may already exist in the catalog.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Configured policy for entities that already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyMode {
    /// Leave existing entities untouched.
    #[default]
    Skip,
    /// Update existing entities when their structure changed.
    Update,
    /// Treat an existing entity as a conflict.
    Fail,
}

impl IdempotencyMode {
    /// Entity override, else run default, else [`IdempotencyMode::Skip`].
    #[must_use]
    pub fn resolve(entity: Option<Self>, run_default: Option<Self>) -> Self {
        entity.or(run_default).unwrap_or_default()
    }

    /// Decide the action for an entity. Pure; no side effects.
    #[must_use]
    pub const fn decide(self, exists: bool) -> Action {
        match (exists, self) {
            (false, _) => Action::Create,
            (true, Self::Skip) => Action::SkipExisting,
            (true, Self::Update) => Action::Update,
            (true, Self::Fail) => Action::FailExisting,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Update => "update",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for IdempotencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdempotencyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "update" => Ok(Self::Update),
            "fail" => Ok(Self::Fail),
            other => Err(format!(
                "unknown idempotency mode '{other}' (expected skip, update or fail)"
            )),
        }
    }
}

/// The action decided for one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Update,
    SkipExisting,
    FailExisting,
}

impl Action {
    /// Whether this action writes to the catalog.
    #[must_use]
    pub const fn is_write(&self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }

    /// Why this action was chosen.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Create => "entity does not exist",
            Self::Update => "entity exists and update mode is set",
            Self::SkipExisting => "entity already exists (skip mode)",
            Self::FailExisting => "entity already exists (fail mode)",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::SkipExisting => "skip",
            Self::FailExisting => "fail",
        };
        f.write_str(s)
    }
}
