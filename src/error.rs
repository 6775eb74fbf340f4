//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout Tablewright.
//! All errors are structured and map to specific error codes for JSON output.
//!
//! # Error Categories
//! - `Validation`: A value violates a domain constraint
//! - `DependencyMissing`: A structural change references a nonexistent schema object
//! - `PolicyConstraint`: An invalid privilege/exclusion combination
//! - `CatalogRead`: Catalog introspection failed
//! - `ConnectionFailed`: Database connection errors
//! - `InvalidInput`: Malformed input or missing required parameters
//! - `EngineError`: Engine-specific database errors during a write
//! - `ConfigError`: Configuration file, setting, or credential errors
//!
//! Nothing in the library retries. Every error aborts the transactional unit
//! it occurred in and is surfaced to the caller unchanged.

use thiserror::Error;

/// Main error type for Tablewright operations
#[derive(Error, Debug)]
pub enum TablewrightError {
    /// A value violates a domain constraint
    #[error("Validation failed for domain '{domain}': {detail}")]
    Validation { domain: String, detail: String },

    /// A referenced schema object does not exist
    #[error("Missing dependency: {0}")]
    DependencyMissing(String),

    /// Invalid privilege/exclusion combination, rejected before any mutation
    #[error("Policy constraint violated: {0}")]
    PolicyConstraint(String),

    /// Catalog introspection query failed
    #[error("Catalog read failed: {0}")]
    CatalogRead(String),

    /// Database connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Invalid input or missing required parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Engine-specific database error
    #[error("Engine error ({engine}): {detail}")]
    EngineError { engine: String, detail: String },

    /// Configuration error (file not found, invalid JSON, bad setting value, etc.)
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl TablewrightError {
    /// Convert error to error code string for JSON output
    ///
    /// Error codes are stable and suitable for programmatic handling.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::DependencyMissing(_) => "DEPENDENCY_MISSING",
            Self::PolicyConstraint(_) => "POLICY_CONSTRAINT",
            Self::CatalogRead(_) => "CATALOG_READ",
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::EngineError { .. } => "ENGINE_ERROR",
            Self::ConfigError(_) => "CONFIG_ERROR",
        }
    }

    /// Get human-readable error message
    ///
    /// Never contains credentials: passwords only reach SQL through
    /// [`crate::statement::Statement::SetLogin`], which is redacted before logging.
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Create a validation error for the named domain
    pub fn validation(domain: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Validation { domain: domain.into(), detail: detail.into() }
    }

    /// Create a missing dependency error
    pub fn dependency_missing(message: impl Into<String>) -> Self {
        Self::DependencyMissing(message.into())
    }

    /// Create a policy constraint error
    pub fn policy_constraint(message: impl Into<String>) -> Self {
        Self::PolicyConstraint(message.into())
    }

    /// Create a catalog read error
    pub fn catalog_read(message: impl Into<String>) -> Self {
        Self::CatalogRead(message.into())
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create an engine-specific error
    pub fn engine_error(engine: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::EngineError { engine: engine.into(), detail: detail.into() }
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }
}

/// Result type alias for Tablewright operations
pub type Result<T> = std::result::Result<T, TablewrightError>;
