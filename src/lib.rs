//! Tablewright - Schema Augmentation and Column-Level Access Control
//!
//! Tablewright lets a schema author describe a table once and attaches the
//! cross-cutting concerns idempotently: tenant and source columns, audit
//! timestamps with their change-tracking trigger, and per-role column
//! grants that keep audit columns out of writers' reach.
//!
//! # Core Principles
//! - Idempotent: a second pass over the same schema changes nothing
//! - Derived, not accumulated: column grants are recomputed from the live
//!   catalog and replaced, never appended to
//! - Atomic: every batch of statements runs in one transaction
//! - Fail closed: a role without a configured credential cannot log in
//!
//! # Module Organization
//! - [`error`] - Error types and handling
//! - [`output`] - JSON output envelope types
//! - [`config`] - Configuration files and credentials
//! - [`settings`] - Ambient setting resolution with per-call overrides
//! - [`domain`] - Validated domain types and SQL identifiers
//! - [`statement`] - Typed SQL statement builder
//! - [`catalog`] - Catalog introspection trait, in-memory and `PostgreSQL` implementations
//! - [`augment`] - Table settings augmentation and audit triggers
//! - [`policy`] - Column-scoped grant policies
//! - [`role`] - Role lifecycle and login toggling
//! - [`manifest`] - Declarative deployment pass

pub mod augment;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod manifest;
pub mod output;
pub mod policy;
pub mod role;
pub mod settings;
pub mod statement;

pub use augment::{apply_settings, plan_settings, resolve_settings, AugmentPlan, TableSetting};
pub use catalog::{Catalog, ColumnInfo, MemoryCatalog};
pub use config::{load_with_precedence, Config, ConnectionConfig, Credentials};
pub use domain::{Domain, DomainRegistry, Identifier, Label};
pub use error::{Result, TablewrightError};
pub use manifest::{run, Manifest, RunReport};
pub use output::{ErrorEnvelope, ErrorInfo, Metadata, SuccessEnvelope};
pub use policy::{apply_column_policies, apply_column_policy, ColumnPolicy};
pub use role::{ensure_login, ensure_role, grant_baseline, LoginState, RoleArchetype};
pub use settings::{SettingsContext, TableOverrides};
pub use statement::{Privilege, QualifiedName, Statement};

#[cfg(feature = "postgres")]
pub use catalog::postgres::PgCatalog;
