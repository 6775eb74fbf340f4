//! `PostgreSQL` Catalog Implementation
//!
//! This module implements the [`Catalog`] trait against a live `PostgreSQL` server.
//!
//! # Features
//! - Client-server connections via TCP
//! - Column introspection via `information_schema`
//! - Trigger, index, role and domain lookups via `pg_catalog`
//! - Atomic statement batches via a single transaction
//!
//! # Implementation Notes
//! - Uses `tokio-postgres` (async driver, requires tokio runtime)
//! - The connection task is spawned onto the runtime; its errors are not logged
//!   to prevent credential leakage
//! - Missing-object SQLSTATEs map to `DependencyMissing`, other read failures to
//!   `CatalogRead`, other write failures to `EngineError`

use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, Config, NoTls};

use crate::catalog::{Catalog, ColumnInfo};
use crate::config::ConnectionConfig;
use crate::error::{Result, TablewrightError};
use crate::statement::{Privilege, Statement};

/// `PostgreSQL` catalog backed by one client connection
pub struct PgCatalog {
    client: Client,
}

impl PgCatalog {
    /// Connect using a resolved connection config
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let pg_config = build_pg_config(config)?;

        let (client, connection) = pg_config.connect(NoTls).await.map_err(|e| {
            TablewrightError::connection_failed(format!("Failed to connect to PostgreSQL: {e}"))
        })?;

        // Note: Connection errors are not logged to prevent credential leakage
        tokio::spawn(async move {
            let _ = connection.await;
        });

        Ok(Self { client })
    }

    /// Wrap an already connected client
    #[must_use]
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    async fn query_exists(&self, what: &str, query: &str, params: &[&str]) -> Result<bool> {
        let params: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn tokio_postgres::types::ToSql + Sync)).collect();
        let row = self
            .client
            .query_one(query, &params)
            .await
            .map_err(|e| map_read_error(&e, &format!("Failed to check {what}")))?;
        Ok(row.get(0))
    }
}

impl Catalog for PgCatalog {
    async fn list_columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnInfo>> {
        let query = "
            SELECT column_name, data_type, is_nullable, column_default
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position";

        let rows = self.client.query(query, &[&schema, &table]).await.map_err(|e| {
            map_read_error(&e, &format!("Failed to query columns for {schema}.{table}"))
        })?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let is_nullable: String = row.get(2);
            columns.push(ColumnInfo {
                name: row.get(0),
                data_type: row.get(1),
                nullable: is_nullable == "YES",
                default: row.get(3),
            });
        }

        Ok(columns)
    }

    async fn trigger_exists(&self, schema: &str, table: &str, name: &str) -> Result<bool> {
        let query = "
            SELECT EXISTS (
                SELECT 1
                FROM pg_catalog.pg_trigger t
                JOIN pg_catalog.pg_class c ON c.oid = t.tgrelid
                JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
                WHERE n.nspname = $1 AND c.relname = $2 AND t.tgname = $3
                  AND NOT t.tgisinternal
            )";
        self.query_exists("trigger existence", query, &[schema, table, name]).await
    }

    async fn index_exists(&self, schema: &str, name: &str) -> Result<bool> {
        let query = "
            SELECT EXISTS (
                SELECT 1 FROM pg_catalog.pg_indexes
                WHERE schemaname = $1 AND indexname = $2
            )";
        self.query_exists("index existence", query, &[schema, name]).await
    }

    async fn role_exists(&self, name: &str) -> Result<bool> {
        let query = "SELECT EXISTS (SELECT 1 FROM pg_catalog.pg_roles WHERE rolname = $1)";
        self.query_exists("role existence", query, &[name]).await
    }

    async fn domain_exists(&self, schema: &str, name: &str) -> Result<bool> {
        let query = "
            SELECT EXISTS (
                SELECT 1
                FROM pg_catalog.pg_type t
                JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace
                WHERE t.typtype = 'd' AND n.nspname = $1 AND t.typname = $2
            )";
        self.query_exists("domain existence", query, &[schema, name]).await
    }

    async fn has_privilege(
        &self,
        role: &str,
        schema: &str,
        table: &str,
        privilege: Privilege,
    ) -> Result<bool> {
        // has_*_privilege take a text relation reference, quoted like any identifier
        let relation = format!("\"{schema}\".\"{table}\"");
        let query = if privilege.is_column_scopable() {
            "SELECT has_table_privilege($1::name, $2::text, $3::text)
                 OR has_any_column_privilege($1::name, $2::text, $3::text)"
        } else {
            "SELECT has_table_privilege($1::name, $2::text, $3::text)"
        };
        self.query_exists("privilege", query, &[role, relation.as_str(), privilege.as_sql()]).await
    }

    async fn apply(&mut self, statements: &[Statement]) -> Result<()> {
        if statements.is_empty() {
            return Ok(());
        }

        let tx = self.client.transaction().await.map_err(|e| {
            TablewrightError::engine_error("postgres", format!("Failed to begin transaction: {e}"))
        })?;

        // Dropping the transaction on error rolls it back
        for statement in statements {
            tracing::debug!(statement = %statement, "executing");
            tx.batch_execute(&statement.to_sql())
                .await
                .map_err(|e| map_write_error(&e, statement))?;
        }

        tx.commit().await.map_err(|e| {
            TablewrightError::engine_error("postgres", format!("Failed to commit transaction: {e}"))
        })
    }
}

/// Build `PostgreSQL` connection config from `ConnectionConfig`
fn build_pg_config(config: &ConnectionConfig) -> Result<Config> {
    let host = config
        .host
        .as_ref()
        .ok_or_else(|| TablewrightError::invalid_input("PostgreSQL requires 'host' parameter"))?;

    let port = config.port.unwrap_or(5432);

    let user = config
        .user
        .as_ref()
        .ok_or_else(|| TablewrightError::invalid_input("PostgreSQL requires 'user' parameter"))?;

    let database = config
        .database
        .as_ref()
        .ok_or_else(|| TablewrightError::invalid_input("PostgreSQL requires 'database' parameter"))?;

    let mut pg_config = Config::new();
    pg_config.host(host).port(port).user(user).dbname(database);
    if let Some(password) = &config.password {
        pg_config.password(password);
    }

    Ok(pg_config)
}

fn is_missing_object(err: &tokio_postgres::Error) -> bool {
    err.code().is_some_and(|code| {
        *code == SqlState::UNDEFINED_TABLE
            || *code == SqlState::UNDEFINED_COLUMN
            || *code == SqlState::UNDEFINED_OBJECT
            || *code == SqlState::INVALID_SCHEMA_NAME
            || *code == SqlState::UNDEFINED_FUNCTION
    })
}

fn map_read_error(err: &tokio_postgres::Error, context: &str) -> TablewrightError {
    if is_missing_object(err) {
        TablewrightError::dependency_missing(format!("{context}: {err}"))
    } else {
        TablewrightError::catalog_read(format!("{context}: {err}"))
    }
}

fn map_write_error(err: &tokio_postgres::Error, statement: &Statement) -> TablewrightError {
    // a nil default on a populated table needs the nil row in the referenced table
    if is_missing_object(err) || err.code() == Some(&SqlState::FOREIGN_KEY_VIOLATION) {
        TablewrightError::dependency_missing(format!("{err} (while executing: {statement})"))
    } else {
        TablewrightError::engine_error("postgres", format!("{err} (while executing: {statement})"))
    }
}
