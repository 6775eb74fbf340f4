//! Role Lifecycle Management
//!
//! Roles are created once and then re-asserted on every run:
//!
//! - capability flags are reset to the restrictive baseline (no superuser,
//!   createdb, createrole, inherit, login, replication or bypass-RLS)
//! - the description is rewritten
//! - login is toggled from the externally configured credential
//!
//! Attribute resets overwrite rather than merge, so manual drift is undone.
//!
//! # Login State Machine
//! ```text
//!            credential present
//!  NoLogin ---------------------> Login
//!     ^                             |
//!     +-----------------------------+
//!          credential absent/empty
//! ```
//! Both transitions are re-asserted unconditionally on every run.

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::config::Credentials;
use crate::domain::{Identifier, Label};
use crate::error::{Result, TablewrightError};
use crate::statement::{Privilege, QualifiedName, RoleAttributes, Statement};

/// Predefined role with a fixed baseline of table privileges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleArchetype {
    /// Read-only access
    Accessor,
    /// General-purpose application writer
    Mutator,
    /// Bulk loader, append only
    Importer,
    /// Table owner-level access
    Manager,
}

impl RoleArchetype {
    pub const ALL: [Self; 4] = [Self::Accessor, Self::Mutator, Self::Importer, Self::Manager];

    #[must_use]
    pub const fn default_name(self) -> &'static str {
        match self {
            Self::Accessor => "accessor",
            Self::Mutator => "mutator",
            Self::Importer => "importer",
            Self::Manager => "manager",
        }
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Accessor => "Read-only access to application tables",
            Self::Mutator => "Reads and writes application rows",
            Self::Importer => "Loads rows into application tables",
            Self::Manager => "Full privileges on application tables",
        }
    }

    /// Table-level privileges granted by [`grant_baseline`]
    #[must_use]
    pub const fn privileges(self) -> &'static [Privilege] {
        match self {
            Self::Accessor => &[Privilege::Select],
            Self::Mutator => &[Privilege::Select, Privilege::Insert, Privilege::Update, Privilege::Delete],
            Self::Importer => &[Privilege::Select, Privilege::Insert],
            Self::Manager => &Privilege::ALL,
        }
    }
}

/// Whether a role may log in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginState {
    NoLogin,
    Login,
}

/// Create `name` if absent and reset its attributes and description
pub async fn ensure_role<C: Catalog>(catalog: &mut C, name: &str, description: &str) -> Result<()> {
    let role = Identifier::new(name)?;
    let comment = Label::new(description)?;

    let mut statements = Vec::with_capacity(3);
    if catalog.role_exists(role.as_str()).await? {
        tracing::debug!(role = %role, "role exists, resetting attributes");
    } else {
        statements.push(Statement::CreateRole { role: role.clone() });
    }
    statements.push(Statement::AlterRoleAttributes {
        role: role.clone(),
        attributes: RoleAttributes::restrictive(),
    });
    statements.push(Statement::CommentOnRole { role: role.clone(), comment });

    catalog.apply(&statements).await?;
    tracing::info!(role = %role, "ensured role");
    Ok(())
}

/// Toggle login for `name` from its configured credential
///
/// An absent or empty credential revokes login and clears the password.
pub async fn ensure_login<C: Catalog>(
    catalog: &mut C,
    credentials: &Credentials,
    name: &str,
) -> Result<LoginState> {
    let role = Identifier::new(name)?;
    if !catalog.role_exists(role.as_str()).await? {
        return Err(TablewrightError::dependency_missing(format!(
            "role \"{role}\" does not exist"
        )));
    }

    let password = credentials.password_for(role.as_str());
    let state = if password.is_some() { LoginState::Login } else { LoginState::NoLogin };
    if state == LoginState::NoLogin {
        tracing::warn!(role = %role, "no credential configured, revoking login");
    }

    catalog.apply(&[Statement::SetLogin { role: role.clone(), password }]).await?;
    tracing::info!(role = %role, login = ?state, "login state asserted");
    Ok(state)
}

/// Grant `archetype`'s baseline privileges on `table` that `role` lacks
///
/// Privileges the role already holds, at table or column level, are left
/// alone so column policies survive re-runs.
pub async fn grant_baseline<C: Catalog>(
    catalog: &mut C,
    archetype: RoleArchetype,
    role: &str,
    table: &QualifiedName,
) -> Result<usize> {
    let role = Identifier::new(role)?;
    if !catalog.role_exists(role.as_str()).await? {
        return Err(TablewrightError::dependency_missing(format!(
            "role \"{role}\" does not exist"
        )));
    }

    let mut statements = Vec::new();
    for privilege in archetype.privileges() {
        let held = catalog
            .has_privilege(role.as_str(), table.schema.as_str(), table.name.as_str(), *privilege)
            .await?;
        if !held {
            statements.push(Statement::GrantTable {
                privilege: *privilege,
                table: table.clone(),
                role: role.clone(),
            });
        }
    }

    if !statements.is_empty() {
        catalog.apply(&statements).await?;
        tracing::info!(role = %role, table = %table, ?archetype, granted = statements.len(), "granted baseline");
    }
    Ok(statements.len())
}
