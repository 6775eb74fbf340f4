//! JSON Output Envelope Types
//!
//! Every CLI invocation prints exactly one envelope on stdout.
//!
//! # Output Contract
//! - Success: `{"ok": true, "command": "...", "data": {...}, "meta": {...}}`
//! - Error: `{"ok": false, "command": "...", "error": {"code": "...", "message": "..."}}`
//!
//! Error codes are the stable values of [`TablewrightError::error_code`].

use serde::{Deserialize, Serialize};

use crate::error::TablewrightError;

/// Success envelope for command results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessEnvelope<T> {
    /// Always true for success envelopes
    pub ok: bool,

    /// Command that was executed (apply, settings)
    pub command: String,

    /// Command-specific data
    pub data: T,

    /// Execution metadata
    pub meta: Metadata,
}

impl<T> SuccessEnvelope<T> {
    pub fn new(command: impl Into<String>, data: T, meta: Metadata) -> Self {
        Self { ok: true, command: command.into(), data, meta }
    }
}

/// Error envelope for command failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always false for error envelopes
    pub ok: bool,

    /// Command that was attempted
    pub command: String,

    pub error: ErrorInfo,
}

impl ErrorEnvelope {
    pub fn new(command: impl Into<String>, error: ErrorInfo) -> Self {
        Self { ok: false, command: command.into(), error }
    }

    /// Create error envelope from `TablewrightError`
    pub fn from_error(command: impl Into<String>, err: &TablewrightError) -> Self {
        Self::new(command, ErrorInfo::new(err.error_code(), err.message()))
    }
}

/// Error information structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error code (e.g., "POLICY_CONSTRAINT", "DEPENDENCY_MISSING")
    pub code: String,

    /// Human-readable error message (never contains credentials)
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into() }
    }
}

/// Execution metadata included in all success responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Execution time in milliseconds
    pub execution_ms: u64,

    /// Number of statements executed (dry runs only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statements: Option<usize>,

    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub dry_run: bool,
}

impl Metadata {
    #[must_use]
    pub const fn new(execution_ms: u64) -> Self {
        Self { execution_ms, statements: None, dry_run: false }
    }

    /// Metadata of a dry run that executed `statements` against memory
    #[must_use]
    pub const fn dry_run(execution_ms: u64, statements: usize) -> Self {
        Self { execution_ms, statements: Some(statements), dry_run: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_envelope_serialization() {
        let envelope = SuccessEnvelope::new("apply", json!({"tables": []}), Metadata::dry_run(42, 10));

        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains(r#""ok":true"#));
        assert!(json.contains(r#""command":"apply"#));
        assert!(json.contains(r#""execution_ms":42"#));
        assert!(json.contains(r#""statements":10"#));
        assert!(json.contains(r#""dry_run":true"#));
    }

    #[test]
    fn test_metadata_omits_dry_run_fields() {
        let json = serde_json::to_string(&Metadata::new(100)).unwrap();
        assert_eq!(json, r#"{"execution_ms":100}"#);
    }

    #[test]
    fn test_error_envelope_from_error() {
        let err = TablewrightError::policy_constraint("DELETE applies to whole tables only");
        let envelope = ErrorEnvelope::from_error("apply", &err);

        assert!(!envelope.ok);
        assert_eq!(envelope.command, "apply");
        assert_eq!(envelope.error.code, "POLICY_CONSTRAINT");
        assert!(envelope.error.message.contains("whole tables only"));
    }
}
