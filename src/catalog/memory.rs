//! In-Memory Catalog
//!
//! A deterministic stand-in for a `PostgreSQL` catalog. It models exactly the
//! objects Tablewright touches (tables and columns, indexes, trigger functions
//! and triggers, domains, roles, and table/column grants) with the same
//! semantics the server applies:
//!
//! - `ADD COLUMN IF NOT EXISTS` / `CREATE INDEX IF NOT EXISTS` are no-ops when present
//! - a foreign key to a missing table or column fails the statement
//! - adding a column fills existing rows with its default, and a foreign key
//!   default must name an existing row of the referenced table
//! - a table-level `REVOKE` also drops that privilege's column grants
//! - column `GRANT`s accumulate until revoked
//!
//! Batches are applied copy-on-write: a failing statement discards the whole
//! batch, which is how a rolled-back transaction looks from outside.

use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::{Catalog, ColumnInfo};
use crate::error::{Result, TablewrightError};
use crate::statement::{
    ColumnDef, ColumnDefault, Privilege, QualifiedName, RoleAttributes, Statement,
};

type ObjectKey = (String, String);

/// Grant held by a role for one privilege on one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantScope {
    /// Whole table
    Table,
    /// Only these columns
    Columns(BTreeSet<String>),
}

impl GrantScope {
    #[must_use]
    pub fn covers(&self, column: &str) -> bool {
        match self {
            Self::Table => true,
            Self::Columns(columns) => columns.contains(column),
        }
    }
}

/// Attributes, password and comment of a role
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoleState {
    pub attributes: RoleAttributes,
    pub password: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct GrantKey {
    role: String,
    schema: String,
    table: String,
    privilege: Privilege,
}

impl GrantKey {
    fn new(role: &str, schema: &str, table: &str, privilege: Privilege) -> Self {
        Self {
            role: role.to_string(),
            schema: schema.to_string(),
            table: table.to_string(),
            privilege,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct TableState {
    columns: Vec<ColumnInfo>,
    /// index name -> indexed column
    indexes: BTreeMap<String, String>,
    /// trigger name -> trigger function
    triggers: BTreeMap<String, ObjectKey>,
    /// column -> value, only for columns that were given one
    rows: Vec<BTreeMap<String, String>>,
}

impl TableState {
    fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}

/// Full catalog contents, comparable for idempotency checks
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CatalogState {
    tables: BTreeMap<ObjectKey, TableState>,
    /// trigger function -> column it stamps
    functions: BTreeMap<ObjectKey, String>,
    /// domain -> storage type
    domains: BTreeMap<ObjectKey, String>,
    roles: BTreeMap<String, RoleState>,
    grants: BTreeMap<GrantKey, GrantScope>,
}

impl CatalogState {
    fn table(&self, schema: &str, table: &str) -> Result<&TableState> {
        self.tables
            .get(&key(schema, table))
            .ok_or_else(|| missing_relation(schema, table))
    }

    fn table_mut(&mut self, name: &QualifiedName) -> Result<&mut TableState> {
        self.tables
            .get_mut(&key(name.schema.as_str(), name.name.as_str()))
            .ok_or_else(|| missing_relation(name.schema.as_str(), name.name.as_str()))
    }

    fn role(&self, name: &str) -> Result<&RoleState> {
        self.roles
            .get(name)
            .ok_or_else(|| TablewrightError::dependency_missing(format!("role \"{name}\" does not exist")))
    }

    fn role_mut(&mut self, name: &str) -> Result<&mut RoleState> {
        self.roles
            .get_mut(name)
            .ok_or_else(|| TablewrightError::dependency_missing(format!("role \"{name}\" does not exist")))
    }

    fn execute(&mut self, statement: &Statement) -> Result<()> {
        match statement {
            Statement::CreateDomain { name, storage_type, .. } => {
                let domain_key = key(name.schema.as_str(), name.name.as_str());
                if self.domains.contains_key(&domain_key) {
                    return Err(TablewrightError::engine_error(
                        "memory",
                        format!("type \"{name}\" already exists"),
                    ));
                }
                self.domains.insert(domain_key, storage_type.clone());
            }

            Statement::AddColumn { table, column } => self.add_column(table, column)?,

            Statement::CreateIndex { name, table, column } => {
                let exists = self
                    .tables
                    .iter()
                    .filter(|((schema, _), _)| schema == table.schema.as_str())
                    .any(|(_, t)| t.indexes.contains_key(name.as_str()));
                let state = self.table_mut(table)?;
                if !state.has_column(column.as_str()) {
                    return Err(missing_column(table, column.as_str()));
                }
                if !exists {
                    state.indexes.insert(name.to_string(), column.to_string());
                }
            }

            Statement::CreateTriggerFunction { function, column } => {
                self.functions.insert(
                    key(function.schema.as_str(), function.name.as_str()),
                    column.to_string(),
                );
            }

            Statement::CreateTrigger { name, table, function } => {
                let function_key = key(function.schema.as_str(), function.name.as_str());
                if !self.functions.contains_key(&function_key) {
                    return Err(TablewrightError::dependency_missing(format!(
                        "function {function}() does not exist"
                    )));
                }
                self.table_mut(table)?.triggers.insert(name.to_string(), function_key);
            }

            Statement::RevokePrivilege { privilege, table, role } => {
                self.role(role.as_str())?;
                self.table_mut(table)?;
                self.grants.remove(&grant_key(role.as_str(), table, *privilege));
            }

            Statement::GrantColumns { privilege, columns, table, role } => {
                self.role(role.as_str())?;
                let state = self.table_mut(table)?;
                if let Some(missing) = columns.iter().find(|c| !state.has_column(c.as_str())) {
                    return Err(missing_column(table, missing.as_str()));
                }
                let added: BTreeSet<String> = columns.iter().map(ToString::to_string).collect();
                let scope = self
                    .grants
                    .entry(grant_key(role.as_str(), table, *privilege))
                    .or_insert_with(|| GrantScope::Columns(BTreeSet::new()));
                if let GrantScope::Columns(existing) = scope {
                    existing.extend(added);
                }
            }

            Statement::GrantTable { privilege, table, role } => {
                self.role(role.as_str())?;
                self.table_mut(table)?;
                self.grants.insert(grant_key(role.as_str(), table, *privilege), GrantScope::Table);
            }

            Statement::CreateRole { role } => {
                if self.roles.contains_key(role.as_str()) {
                    return Err(TablewrightError::engine_error(
                        "memory",
                        format!("role \"{role}\" already exists"),
                    ));
                }
                self.roles.insert(role.to_string(), RoleState::default());
            }

            Statement::AlterRoleAttributes { role, attributes } => {
                self.role_mut(role.as_str())?.attributes = *attributes;
            }

            Statement::SetLogin { role, password } => {
                let state = self.role_mut(role.as_str())?;
                state.attributes.login = password.is_some();
                state.password.clone_from(password);
            }

            Statement::CommentOnRole { role, comment } => {
                self.role_mut(role.as_str())?.comment = Some(comment.to_string());
            }
        }
        Ok(())
    }

    fn add_column(&mut self, table: &QualifiedName, column: &ColumnDef) -> Result<()> {
        let existing = self.table(table.schema.as_str(), table.name.as_str())?;
        if existing.has_column(column.name.as_str()) {
            return Ok(());
        }

        let populated = !existing.rows.is_empty();
        let fill = column.default.map(default_value);
        if let Some(fk) = &column.references {
            let target = self.table(fk.table.schema.as_str(), fk.table.name.as_str())?;
            if !target.has_column(fk.column.as_str()) {
                return Err(missing_column(&fk.table, fk.column.as_str()));
            }
            if let (true, Some(value)) = (populated, &fill) {
                let present = target
                    .rows
                    .iter()
                    .any(|row| row.get(fk.column.as_str()) == Some(value));
                if !present {
                    return Err(TablewrightError::dependency_missing(format!(
                        "default of column \"{}\" on {table} violates its foreign key: \
                         key ({})=({value}) is not present in table {}",
                        column.name, fk.column, fk.table
                    )));
                }
            }
        }

        let state = self.table_mut(table)?;
        if let Some(value) = fill {
            for row in &mut state.rows {
                row.insert(column.name.to_string(), value.clone());
            }
        }
        state.columns.push(ColumnInfo {
            name: column.name.to_string(),
            data_type: column.data_type.as_sql().to_string(),
            nullable: !column.not_null,
            default: column.default.map(|d| d.to_sql()),
        });
        Ok(())
    }
}

/// In-memory [`Catalog`]
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    state: CatalogState,
    executed: Vec<Statement>,
    fail_reads: bool,
}

impl MemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table directly, bypassing statements (schema authorship)
    pub fn create_table(&mut self, schema: &str, table: &str, columns: &[(&str, &str)]) {
        let state = TableState {
            columns: columns.iter().map(|(name, ty)| ColumnInfo::new(*name, *ty)).collect(),
            ..TableState::default()
        };
        self.state.tables.insert(key(schema, table), state);
    }

    /// Insert a row directly; columns not listed stay unset
    pub fn insert_row(&mut self, schema: &str, table: &str, values: &[(&str, &str)]) -> Result<()> {
        let state = self
            .state
            .tables
            .get_mut(&key(schema, table))
            .ok_or_else(|| missing_relation(schema, table))?;
        if let Some((missing, _)) = values.iter().find(|(c, _)| !state.has_column(c)) {
            return Err(TablewrightError::dependency_missing(format!(
                "column \"{missing}\" of relation {schema}.{table} does not exist"
            )));
        }
        state
            .rows
            .push(values.iter().map(|(c, v)| ((*c).to_string(), (*v).to_string())).collect());
        Ok(())
    }

    /// Rows of `schema.table` in insertion order
    #[must_use]
    pub fn rows(&self, schema: &str, table: &str) -> Vec<BTreeMap<String, String>> {
        self.state.tables.get(&key(schema, table)).map(|t| t.rows.clone()).unwrap_or_default()
    }

    /// Create a role with `CREATE ROLE` defaults
    pub fn create_role(&mut self, name: &str) {
        self.state.roles.entry(name.to_string()).or_default();
    }

    /// Make every catalog read fail, as if the connection dropped
    pub fn set_fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    #[must_use]
    pub fn role(&self, name: &str) -> Option<&RoleState> {
        self.state.roles.get(name)
    }

    #[must_use]
    pub fn grant(&self, role: &str, schema: &str, table: &str, privilege: Privilege) -> Option<&GrantScope> {
        self.state.grants.get(&GrantKey::new(role, schema, table, privilege))
    }

    #[must_use]
    pub fn columns(&self, schema: &str, table: &str) -> Vec<String> {
        self.state
            .tables
            .get(&key(schema, table))
            .map(|t| t.columns.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn indexes(&self, schema: &str, table: &str) -> Vec<String> {
        self.state
            .tables
            .get(&key(schema, table))
            .map(|t| t.indexes.keys().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn triggers(&self, schema: &str, table: &str) -> Vec<String> {
        self.state
            .tables
            .get(&key(schema, table))
            .map(|t| t.triggers.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Copy of the full catalog contents
    #[must_use]
    pub fn snapshot(&self) -> CatalogState {
        self.state.clone()
    }

    /// Every statement committed so far, in order
    #[must_use]
    pub fn executed(&self) -> &[Statement] {
        &self.executed
    }

    /// Check that `role` may write `columns` of `schema.table` under `privilege`
    ///
    /// Mirrors the server's permission check for INSERT/UPDATE column lists.
    pub fn check_write(
        &self,
        role: &str,
        schema: &str,
        table: &str,
        privilege: Privilege,
        columns: &[&str],
    ) -> Result<()> {
        let state = self.state.table(schema, table)?;
        let role_state = self.state.role(role)?;
        if let Some(missing) = columns.iter().find(|c| !state.has_column(c)) {
            return Err(TablewrightError::dependency_missing(format!(
                "column \"{missing}\" of relation {schema}.{table} does not exist"
            )));
        }
        if role_state.attributes.superuser {
            return Ok(());
        }

        match self.state.grants.get(&GrantKey::new(role, schema, table, privilege)) {
            Some(scope) => match columns.iter().find(|c| !scope.covers(c)) {
                Some(denied) => Err(TablewrightError::engine_error(
                    "memory",
                    format!("permission denied for column {denied} of table {schema}.{table}"),
                )),
                None => Ok(()),
            },
            None => Err(TablewrightError::engine_error(
                "memory",
                format!("permission denied for table {schema}.{table}"),
            )),
        }
    }

    /// Run an UPDATE's permission check and BEFORE UPDATE triggers
    ///
    /// Returns the row image the update would write. Triggers fire in name
    /// order, as on the server.
    pub fn simulate_update(
        &self,
        role: &str,
        schema: &str,
        table: &str,
        assignments: &[(&str, &str)],
    ) -> Result<BTreeMap<String, String>> {
        let columns: Vec<&str> = assignments.iter().map(|(c, _)| *c).collect();
        self.check_write(role, schema, table, Privilege::Update, &columns)?;

        let mut row: BTreeMap<String, String> =
            assignments.iter().map(|(c, v)| ((*c).to_string(), (*v).to_string())).collect();
        let state = self.state.table(schema, table)?;
        for function in state.triggers.values() {
            if let Some(column) = self.state.functions.get(function) {
                row.insert(column.clone(), Utc::now().to_rfc3339());
            }
        }
        Ok(row)
    }

    fn guard_read(&self) -> Result<()> {
        if self.fail_reads {
            Err(TablewrightError::catalog_read("memory catalog is unavailable"))
        } else {
            Ok(())
        }
    }
}

impl Catalog for MemoryCatalog {
    async fn list_columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnInfo>> {
        self.guard_read()?;
        Ok(self.state.tables.get(&key(schema, table)).map(|t| t.columns.clone()).unwrap_or_default())
    }

    async fn trigger_exists(&self, schema: &str, table: &str, name: &str) -> Result<bool> {
        self.guard_read()?;
        Ok(self
            .state
            .tables
            .get(&key(schema, table))
            .is_some_and(|t| t.triggers.contains_key(name)))
    }

    async fn index_exists(&self, schema: &str, name: &str) -> Result<bool> {
        self.guard_read()?;
        Ok(self
            .state
            .tables
            .iter()
            .filter(|((s, _), _)| s == schema)
            .any(|(_, t)| t.indexes.contains_key(name)))
    }

    async fn role_exists(&self, name: &str) -> Result<bool> {
        self.guard_read()?;
        Ok(self.state.roles.contains_key(name))
    }

    async fn domain_exists(&self, schema: &str, name: &str) -> Result<bool> {
        self.guard_read()?;
        Ok(self.state.domains.contains_key(&key(schema, name)))
    }

    async fn has_privilege(
        &self,
        role: &str,
        schema: &str,
        table: &str,
        privilege: Privilege,
    ) -> Result<bool> {
        self.guard_read()?;
        let superuser = self.state.roles.get(role).is_some_and(|r| r.attributes.superuser);
        Ok(superuser
            || self.state.grants.contains_key(&GrantKey::new(role, schema, table, privilege)))
    }

    async fn apply(&mut self, statements: &[Statement]) -> Result<()> {
        let mut next = self.state.clone();
        for statement in statements {
            next.execute(statement)?;
        }
        self.state = next;
        self.executed.extend_from_slice(statements);
        Ok(())
    }
}

fn key(schema: &str, name: &str) -> ObjectKey {
    (schema.to_string(), name.to_string())
}

fn grant_key(role: &str, table: &QualifiedName, privilege: Privilege) -> GrantKey {
    GrantKey::new(role, table.schema.as_str(), table.name.as_str(), privilege)
}

/// Value a default expression writes into existing rows
fn default_value(default: ColumnDefault) -> String {
    match default {
        ColumnDefault::NilUuid => uuid::Uuid::nil().to_string(),
        ColumnDefault::TransactionTimestamp | ColumnDefault::ClockTimestamp => Utc::now().to_rfc3339(),
    }
}

fn missing_relation(schema: &str, table: &str) -> TablewrightError {
    TablewrightError::dependency_missing(format!("relation {schema}.{table} does not exist"))
}

fn missing_column(table: &QualifiedName, column: &str) -> TablewrightError {
    TablewrightError::dependency_missing(format!(
        "column \"{column}\" of relation {table} does not exist"
    ))
}
