//! Catalog Trait and Core Types
//!
//! The catalog is the boundary between Tablewright's pure planning code and a
//! live database. It offers read-only introspection of schema metadata and a
//! single write primitive, [`Catalog::apply`], which executes a batch of
//! [`Statement`]s atomically.
//!
//! # Implementations
//! - [`memory::MemoryCatalog`] - deterministic in-memory catalog for tests and dry runs
//! - `postgres::PgCatalog` - live `PostgreSQL` catalog (feature `postgres`)
//!
//! # Atomicity
//! `apply` runs its whole slice inside one transaction. If any statement
//! fails, none of the batch is visible afterwards and the error is returned
//! unchanged. Nothing retries.

use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::error::Result;
use crate::statement::{Privilege, Statement};

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::{GrantScope, MemoryCatalog, RoleState};

/// Column information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,

    /// Column data type (engine-specific)
    pub data_type: String,

    /// Whether column allows NULL values
    pub nullable: bool,

    /// Default value (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl ColumnInfo {
    /// Nullable column without a default
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self { name: name.into(), data_type: data_type.into(), nullable: true, default: None }
    }
}

/// Live schema metadata plus an atomic write primitive
///
/// Reads never mutate. An empty column list from [`Catalog::list_columns`]
/// means the table does not exist.
pub trait Catalog {
    /// Columns of `schema.table` in ordinal order
    fn list_columns(
        &self,
        schema: &str,
        table: &str,
    ) -> impl Future<Output = Result<Vec<ColumnInfo>>> + Send;

    /// Whether a trigger named `name` exists on `schema.table`
    fn trigger_exists(
        &self,
        schema: &str,
        table: &str,
        name: &str,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Whether an index named `name` exists in `schema`
    fn index_exists(&self, schema: &str, name: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Whether a role named `name` exists
    fn role_exists(&self, name: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Whether a domain named `name` exists in `schema`
    fn domain_exists(&self, schema: &str, name: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Whether `role` holds `privilege` on `schema.table` or on any of its columns
    fn has_privilege(
        &self,
        role: &str,
        schema: &str,
        table: &str,
        privilege: Privilege,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Execute `statements` in one transaction
    fn apply(&mut self, statements: &[Statement]) -> impl Future<Output = Result<()>> + Send;
}
