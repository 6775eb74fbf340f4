//! Manifest Pass
//!
//! A manifest describes one deployment pass declaratively:
//!
//! ```json
//! {
//!   "schema": "app",
//!   "domains": [{ "name": "slug", "storageType": "text", "maxLength": 64, "case": "lower" }],
//!   "roles": [{ "archetype": "mutator" }, { "name": "loader", "archetype": "importer" }],
//!   "tables": [{
//!     "name": "users",
//!     "overrides": { "multiTenant": true },
//!     "grants": [{ "archetype": "mutator" }],
//!     "policies": [{ "role": "loader", "privilege": "INSERT", "exclude": ["id"] }]
//!   }]
//! }
//! ```
//!
//! [`run`] applies it in dependency order: domains, then roles and their
//! login state, then per table the baseline grants, the structural
//! augmentation and finally the explicit column policies. The first error
//! stops the pass; everything committed before it stays committed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::augment::{apply_settings, TableSetting, DEFAULT_SOURCE_TABLE, DEFAULT_TENANT_TABLE};
use crate::catalog::{Catalog, MemoryCatalog};
use crate::config::Credentials;
use crate::domain::{ensure_domains, CaseRule, Domain, DomainRegistry, Identifier};
use crate::error::{Result, TablewrightError};
use crate::policy::{apply_column_policy, ColumnPolicy};
use crate::role::{ensure_login, ensure_role, grant_baseline, LoginState, RoleArchetype};
use crate::settings::{resolve_string, SettingsContext, TableOverrides, SOURCE_TABLE, TENANT_TABLE};
use crate::statement::{Privilege, QualifiedName};

fn default_schema() -> String {
    "public".to_string()
}

/// One deployment pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Manifest {
    /// Schema for domains and unqualified table names
    #[serde(default = "default_schema")]
    pub schema: String,

    #[serde(default)]
    pub domains: Vec<DomainSpec>,

    #[serde(default)]
    pub roles: Vec<RoleSpec>,

    #[serde(default)]
    pub tables: Vec<TableSpec>,
}

/// User-defined domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DomainSpec {
    pub name: String,
    pub storage_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub case: CaseRule,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl DomainSpec {
    pub fn to_domain(&self) -> Result<Domain> {
        let mut domain = Domain::new(&self.name, &self.storage_type)?.case(self.case);
        if let Some(min) = self.min_length {
            domain = domain.min_length(min);
        }
        if let Some(max) = self.max_length {
            domain = domain.max_length(max);
        }
        if let Some(pattern) = &self.pattern {
            domain = domain.pattern(pattern)?;
        }
        Ok(domain)
    }
}

/// Role to ensure; the name defaults to the archetype's
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RoleSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archetype: Option<RoleArchetype>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RoleSpec {
    pub fn name(&self) -> Result<&str> {
        match (&self.name, self.archetype) {
            (Some(name), _) => Ok(name.as_str()),
            (None, Some(archetype)) => Ok(archetype.default_name()),
            (None, None) => Err(TablewrightError::invalid_input("Role needs a 'name' or an 'archetype'")),
        }
    }

    pub fn description(&self) -> Result<&str> {
        match (&self.description, self.archetype) {
            (Some(description), _) => Ok(description.as_str()),
            (None, Some(archetype)) => Ok(archetype.description()),
            (None, None) => Err(TablewrightError::invalid_input(format!(
                "Role '{}' needs a 'description' or an 'archetype'",
                self.name.as_deref().unwrap_or_default()
            ))),
        }
    }
}

/// Column of a table as seeded into a dry-run catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnSeed {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

/// Table to augment and grant on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TableSpec {
    /// `table` or `schema.table`
    pub name: String,

    #[serde(default)]
    pub overrides: TableOverrides,

    /// Existing columns; only used to seed dry runs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<ColumnSeed>,

    #[serde(default)]
    pub grants: Vec<GrantSpec>,

    #[serde(default)]
    pub policies: Vec<PolicySpec>,
}

/// Baseline grant of an archetype's privileges
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GrantSpec {
    pub archetype: RoleArchetype,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl GrantSpec {
    #[must_use]
    pub fn role(&self) -> &str {
        self.role.as_deref().unwrap_or_else(|| self.archetype.default_name())
    }
}

/// Explicit column policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PolicySpec {
    pub role: String,
    pub privilege: Privilege,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Manifest {
    /// Read a manifest from a JSON file
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            TablewrightError::invalid_input(format!("Could not read manifest {}: {e}", path.display()))
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| TablewrightError::invalid_input(format!("Invalid manifest: {e}")))
    }

    /// Qualified name of a table spec
    pub fn table_name(&self, table: &TableSpec) -> Result<QualifiedName> {
        QualifiedName::parse(&table.name, &self.schema)
    }

    /// In-memory catalog holding the manifest's tables and reference tables
    ///
    /// Tables without seeded columns get a single `id uuid` column.
    pub fn dry_run_catalog(&self, ctx: &SettingsContext) -> Result<MemoryCatalog> {
        let mut catalog = MemoryCatalog::new();
        for table in &self.tables {
            let name = self.table_name(table)?;
            let columns: Vec<(&str, &str)> = if table.columns.is_empty() {
                vec![("id", "uuid")]
            } else {
                table.columns.iter().map(|c| (c.name.as_str(), c.data_type.as_str())).collect()
            };
            catalog.create_table(name.schema.as_str(), name.name.as_str(), &columns);
        }

        for (path, default) in [(TENANT_TABLE, DEFAULT_TENANT_TABLE), (SOURCE_TABLE, DEFAULT_SOURCE_TABLE)] {
            let reference = QualifiedName::parse(&resolve_string(ctx, path, default, None)?, &self.schema)?;
            if catalog.columns(reference.schema.as_str(), reference.name.as_str()).is_empty() {
                catalog.create_table(reference.schema.as_str(), reference.name.as_str(), &[("id", "uuid")]);
            }
        }
        Ok(catalog)
    }
}

/// Outcome of ensuring one role
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleReport {
    pub name: String,
    pub login: LoginState,
}

/// Outcome of one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub table: String,
    pub settings: BTreeSet<TableSetting>,
    pub baseline_grants: usize,
    pub policies: Vec<ColumnPolicy>,
}

/// Outcome of a manifest pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub domains_created: usize,
    pub roles: Vec<RoleReport>,
    pub tables: Vec<TableReport>,
}

/// Apply `manifest` against `catalog`
pub async fn run<C: Catalog>(
    catalog: &mut C,
    ctx: &SettingsContext,
    credentials: &Credentials,
    manifest: &Manifest,
) -> Result<RunReport> {
    let schema = Identifier::new(&manifest.schema)?;
    let mut report = RunReport::default();

    let mut registry = DomainRegistry::with_builtins();
    for spec in &manifest.domains {
        registry.define(spec.to_domain()?)?;
    }
    report.domains_created = ensure_domains(catalog, &schema, &registry).await?;

    for spec in &manifest.roles {
        let name = spec.name()?;
        ensure_role(catalog, name, spec.description()?).await?;
        let login = ensure_login(catalog, credentials, name).await?;
        report.roles.push(RoleReport { name: name.to_string(), login });
    }

    for spec in &manifest.tables {
        let table = manifest.table_name(spec)?;
        tracing::info!(table = %table, "processing table");

        let mut baseline_grants = 0;
        for grant in &spec.grants {
            baseline_grants += grant_baseline(catalog, grant.archetype, grant.role(), &table).await?;
        }

        let settings = apply_settings(catalog, ctx, &table, &spec.overrides).await?;

        let mut policies = Vec::with_capacity(spec.policies.len());
        for policy in &spec.policies {
            let excluded: Vec<&str> = policy.exclude.iter().map(String::as_str).collect();
            policies.push(
                apply_column_policy(catalog, &policy.role, &table, policy.privilege, &excluded).await?,
            );
        }

        report.tables.push(TableReport { table: table.to_string(), settings, baseline_grants, policies });
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::augment::CREATED_AT;
    use crate::settings::MULTI_TENANT;

    const MANIFEST: &str = r#"{
        "schema": "app",
        "domains": [{ "name": "slug", "storageType": "text", "maxLength": 64, "case": "lower" }],
        "roles": [
            { "archetype": "mutator" },
            { "name": "loader", "archetype": "importer", "description": "Nightly import job" }
        ],
        "tables": [{
            "name": "users",
            "columns": [{ "name": "id", "type": "uuid" }, { "name": "email", "type": "text" }],
            "overrides": { "multiTenant": true },
            "grants": [{ "archetype": "mutator" }, { "archetype": "importer", "role": "loader" }],
            "policies": [{ "role": "loader", "privilege": "INSERT", "exclude": ["id", "created_at"] }]
        }]
    }"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::from_json(MANIFEST).unwrap();
        assert_eq!(manifest.schema, "app");
        assert_eq!(manifest.roles[0].name().unwrap(), "mutator");
        assert_eq!(manifest.roles[1].description().unwrap(), "Nightly import job");
        assert_eq!(manifest.tables[0].grants[1].role(), "loader");
        assert_eq!(manifest.tables[0].overrides.multi_tenant, Some(true));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = Manifest::from_json(r#"{ "tabels": [] }"#).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_INPUT");
    }

    #[test]
    fn test_role_needs_name_or_archetype() {
        let manifest = Manifest::from_json(r#"{ "roles": [{ "description": "x" }] }"#).unwrap();
        assert!(manifest.roles[0].name().is_err());
    }

    #[tokio::test]
    async fn test_run_against_dry_run_catalog() {
        let manifest = Manifest::from_json(MANIFEST).unwrap();
        let ctx = SettingsContext::empty();
        let mut catalog = manifest.dry_run_catalog(&ctx).unwrap();
        let credentials = Credentials::new().with_password("loader", "pw");

        let report = run(&mut catalog, &ctx, &credentials, &manifest).await.unwrap();

        assert_eq!(report.domains_created, 5);
        assert_eq!(report.roles[0].login, LoginState::NoLogin);
        assert_eq!(report.roles[1].login, LoginState::Login);

        let table = &report.tables[0];
        assert_eq!(table.table, "app.users");
        assert!(table.settings.contains(&TableSetting::Tenant));
        assert_eq!(table.baseline_grants, 6);

        let granted: Vec<&str> =
            table.policies[0].granted_columns.iter().map(Identifier::as_str).collect();
        assert_eq!(granted, vec!["email", "tenant_id", "last_updated_at"]);

        let scope = catalog.grant("mutator", "app", "users", Privilege::Update).unwrap();
        assert!(!scope.covers(CREATED_AT));
    }

    #[tokio::test]
    async fn test_rerun_is_stable() {
        let manifest = Manifest::from_json(MANIFEST).unwrap();
        let ctx = SettingsContext::empty().with(MULTI_TENANT, false);
        let mut catalog = manifest.dry_run_catalog(&ctx).unwrap();
        let credentials = Credentials::new();

        run(&mut catalog, &ctx, &credentials, &manifest).await.unwrap();
        let first = catalog.snapshot();
        let report = run(&mut catalog, &ctx, &credentials, &manifest).await.unwrap();

        assert_eq!(catalog.snapshot(), first);
        assert_eq!(report.domains_created, 0);
        assert_eq!(report.tables[0].baseline_grants, 0);
    }

    #[tokio::test]
    async fn test_first_error_stops_pass() {
        let manifest = Manifest::from_json(
            r#"{ "tables": [{ "name": "missing" }], "roles": [{ "archetype": "accessor" }] }"#,
        )
        .unwrap();
        let mut catalog = MemoryCatalog::new();

        let err = run(&mut catalog, &SettingsContext::empty(), &Credentials::new(), &manifest)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "DEPENDENCY_MISSING");
        assert!(catalog.role("accessor").is_some());
    }
}
