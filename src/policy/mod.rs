//! Role Policy Engine
//!
//! Flattens "this privilege on every column except these" into the column
//! grant primitive. `PostgreSQL` has column-scoped GRANT but no
//! column-scoped REVOKE, so shrinking a grant means revoking the privilege
//! on the whole table and granting the reduced column list again:
//!
//! ```sql
//! REVOKE UPDATE ON TABLE "app"."users" FROM "mutator";
//! GRANT UPDATE ("id", "name", "last_updated_at") ON TABLE "app"."users" TO "mutator";
//! ```
//!
//! Both statements always go through one [`Catalog::apply`] call, so no
//! reader sees the privilege revoked but not yet re-granted.
//!
//! # Replacement
//! A policy is derived, not accumulated. Every application recomputes
//! `all columns - excluded` from the live catalog and fully replaces the
//! previous grant for its `(role, table, privilege)` key.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::catalog::{Catalog, ColumnInfo};
use crate::domain::Identifier;
use crate::error::{Result, TablewrightError};
use crate::statement::{Privilege, QualifiedName, Statement};

/// Column grant held by one role for one privilege on one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnPolicy {
    pub role: Identifier,
    pub schema: Identifier,
    pub table: Identifier,
    pub privilege: Privilege,
    /// Empty for a table-level grant of a privilege that has no column form
    pub granted_columns: Vec<Identifier>,
}

/// Columns of `all` not in `excluded`, in catalog order
#[must_use]
pub fn granted_columns(all: &[ColumnInfo], excluded: &BTreeSet<Identifier>) -> Vec<String> {
    all.iter()
        .filter(|c| !excluded.iter().any(|e| e.as_str() == c.name))
        .map(|c| c.name.clone())
        .collect()
}

/// Reject privilege/exclusion combinations the grant primitive cannot express
pub fn validate_policy(privilege: Privilege, excluded: &BTreeSet<Identifier>) -> Result<()> {
    if !excluded.is_empty() && !privilege.is_column_scopable() {
        return Err(TablewrightError::policy_constraint(format!(
            "{privilege} applies to whole tables only and cannot exclude columns"
        )));
    }
    Ok(())
}

/// Compute the policy for one privilege key and the statements replacing it
///
/// Nothing is written. Identifier and combination errors are raised before
/// the catalog is read.
pub async fn plan_column_policy<C: Catalog>(
    catalog: &C,
    role: &str,
    table: &QualifiedName,
    privilege: Privilege,
    excluded: &[&str],
) -> Result<(ColumnPolicy, Vec<Statement>)> {
    let role = Identifier::new(role)?;
    let excluded = excluded
        .iter()
        .map(|c| Identifier::new(c))
        .collect::<Result<BTreeSet<_>>>()?;
    validate_policy(privilege, &excluded)?;

    if !catalog.role_exists(role.as_str()).await? {
        return Err(TablewrightError::dependency_missing(format!(
            "role \"{role}\" does not exist"
        )));
    }

    let columns = catalog.list_columns(table.schema.as_str(), table.name.as_str()).await?;
    if columns.is_empty() {
        return Err(TablewrightError::dependency_missing(format!(
            "relation {table} does not exist"
        )));
    }

    // column-level UPDATE needs to read the rows it targets
    if privilege == Privilege::Update
        && !catalog
            .has_privilege(role.as_str(), table.schema.as_str(), table.name.as_str(), Privilege::Select)
            .await?
    {
        return Err(TablewrightError::policy_constraint(format!(
            "role \"{role}\" needs SELECT on {table} before it can be granted UPDATE"
        )));
    }

    for unknown in excluded.iter().filter(|e| !columns.iter().any(|c| c.name == e.as_str())) {
        tracing::warn!(
            role = %role,
            table = %table,
            column = %unknown,
            "excluded column does not exist, ignoring"
        );
    }

    let mut statements = vec![Statement::RevokePrivilege {
        privilege,
        table: table.clone(),
        role: role.clone(),
    }];

    let granted = if privilege.is_column_scopable() {
        let granted = granted_columns(&columns, &excluded)
            .iter()
            .map(|c| Identifier::exact(c))
            .collect::<Result<Vec<_>>>()?;
        if granted.is_empty() {
            tracing::debug!(role = %role, table = %table, %privilege, "every column excluded, privilege revoked");
        } else {
            statements.push(Statement::GrantColumns {
                privilege,
                columns: granted.clone(),
                table: table.clone(),
                role: role.clone(),
            });
        }
        granted
    } else {
        statements.push(Statement::GrantTable { privilege, table: table.clone(), role: role.clone() });
        Vec::new()
    };

    let policy = ColumnPolicy {
        role,
        schema: table.schema.clone(),
        table: table.name.clone(),
        privilege,
        granted_columns: granted,
    };
    Ok((policy, statements))
}

/// Replace `role`'s grant of `privilege` on `table` in one transaction
pub async fn apply_column_policy<C: Catalog>(
    catalog: &mut C,
    role: &str,
    table: &QualifiedName,
    privilege: Privilege,
    excluded: &[&str],
) -> Result<ColumnPolicy> {
    let mut policies = apply_column_policies(catalog, role, table, &[(privilege, excluded)]).await?;
    policies.pop().ok_or_else(|| TablewrightError::invalid_input("no policy was planned"))
}

/// Replace several privilege keys of `role` on `table` in one transaction
///
/// Every request is planned before anything is written, so an invalid
/// request leaves all grants untouched. A privilege listed twice ends up
/// with the later request's columns.
pub async fn apply_column_policies<C: Catalog>(
    catalog: &mut C,
    role: &str,
    table: &QualifiedName,
    requests: &[(Privilege, &[&str])],
) -> Result<Vec<ColumnPolicy>> {
    let mut policies = Vec::with_capacity(requests.len());
    let mut statements = Vec::new();
    for (privilege, excluded) in requests {
        let (policy, planned) = plan_column_policy(&*catalog, role, table, *privilege, excluded).await?;
        policies.push(policy);
        statements.extend(planned);
    }

    catalog.apply(&statements).await?;
    for policy in &policies {
        tracing::info!(
            role = %policy.role,
            table = %table,
            privilege = %policy.privilege,
            columns = policy.granted_columns.len(),
            "applied column policy"
        );
    }
    Ok(policies)
}
