//! Error types for ingestion runs.
//!
//! Two layers live here. [`Error`] is what the engine itself can fail with
//! (cycles, duplicate declarations, misconfigured sources). [`CatalogError`]
//! is what a catalog round-trip can fail with; it is categorized so the
//! executor's retry policy can tell transient failures from permanent ones.

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};

use crate::types::EntityType;

/// Result type alias for ingestion operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for catalog round-trips.
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Categories of catalog errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Network or server-side failure (transient, retryable).
    Transient,
    /// The catalog rejected the request (not retryable).
    Permanent,
    /// The entity does not exist.
    NotFound,
    /// The entity already exists or was concurrently modified.
    Conflict,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Transient => "Catalog temporarily unavailable",
            Self::Permanent => "Catalog rejected the request",
            Self::NotFound => "Entity not found in catalog",
            Self::Conflict => "Entity conflict in catalog",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Transient => {
                "Check catalog connectivity and rerun; completed entities are skipped"
            }
            Self::Permanent => "Check the entity properties against the catalog's schema",
            Self::NotFound => "Declare the parent entity or create it in the catalog first",
            Self::Conflict => "Use the update or skip idempotency mode for this entity",
        }
    }

    /// Categorize an HTTP status code.
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            404 => Self::NotFound,
            409 => Self::Conflict,
            408 | 429 | 500..=599 => Self::Transient,
            _ => Self::Permanent,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors returned by a [`Catalog`](crate::catalog::Catalog) implementation.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// HTTP request failed, with the status code if a response arrived.
    #[error("HTTP request failed: {message}")]
    Http {
        /// Error message.
        message: String,
        /// HTTP status code if available.
        status: Option<u16>,
    },

    /// The catalog could not be reached.
    #[error("catalog unavailable: {0}")]
    Unavailable(String),

    /// The catalog refused the entity.
    #[error("catalog rejected {fqn}: {message}")]
    Rejected {
        /// Fully-qualified name of the rejected entity.
        fqn: String,
        /// Reason given by the catalog.
        message: String,
    },

    /// An entity with this name already exists.
    #[error("entity already exists: {fqn}")]
    AlreadyExists {
        /// Fully-qualified name of the existing entity.
        fqn: String,
    },

    /// No entity with this name exists.
    #[error("entity not found: {fqn}")]
    NotFound {
        /// Fully-qualified name that was looked up.
        fqn: String,
    },

    /// The catalog answered with something we could not interpret.
    #[error("invalid catalog response: {0}")]
    InvalidResponse(String),
}

impl CatalogError {
    /// Create an HTTP error.
    pub fn http(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Http {
            message: message.into(),
            status,
        }
    }

    /// Create a transient error, mostly useful for failure injection.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Create a permanent rejection.
    pub fn rejected(fqn: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            fqn: fqn.into(),
            message: message.into(),
        }
    }

    /// Get the error category for retry logic.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Http { status: None, .. } | Self::Unavailable(_) => ErrorCategory::Transient,
            Self::Http {
                status: Some(code), ..
            } => ErrorCategory::from_status(*code),
            Self::Rejected { .. } | Self::InvalidResponse(_) => ErrorCategory::Permanent,
            Self::AlreadyExists { .. } => ErrorCategory::Conflict,
            Self::NotFound { .. } => ErrorCategory::NotFound,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

impl From<ureq::Error> for CatalogError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::Http {
                message: format!("HTTP {code}"),
                status: Some(code),
            },
            other => Self::Http {
                message: other.to_string(),
                status: None,
            },
        }
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

/// Errors that can occur while planning or driving an ingestion run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The dependency graph contains a cycle; nothing was executed.
    #[error("circular dependency detected among entities: {}", .entities.join(", "))]
    CycleDetected {
        /// Keys of the entities left unordered, in declaration order.
        entities: Vec<String>,
    },

    /// Two declarations resolve to the same type and fully-qualified name.
    #[error("entity declared more than once: {key}")]
    DuplicateEntity {
        /// The duplicated entity key.
        key: String,
    },

    /// The execution context saw the same entity twice in one run.
    #[error("entity recorded twice in one run: {key}")]
    AlreadyRecorded {
        /// The entity key recorded twice.
        key: String,
    },

    /// A declaration is missing or has malformed properties.
    #[error("{entity}: {message}")]
    Validation {
        /// Label of the offending declaration.
        entity: String,
        /// What is wrong with it.
        message: String,
    },

    /// No handler is registered for an entity type.
    #[error("no handler registered for entity type: {0}")]
    HandlerNotRegistered(EntityType),

    /// No connector is registered for a source type.
    #[error("no connector registered for source type: {0}")]
    SourceNotRegistered(String),

    /// A discovery declaration references a source that is not configured.
    #[error("unknown source: {0}")]
    UnknownSource(String),

    /// A source connector failed.
    #[error("source '{source_name}' failed: {message}")]
    Source {
        /// Configured name of the source.
        source_name: String,
        /// Connector error message.
        message: String,
    },

    /// An include/exclude pattern did not compile.
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The pattern as written.
        pattern: String,
        /// Underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// Catalog round-trip failed outside of per-entity processing.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a validation error for a declaration.
    pub fn validation(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Create a source error.
    pub fn source(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Source {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}
