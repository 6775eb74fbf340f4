//! Table Settings Augmentation
//!
//! Attaches the cross-cutting columns a table opts into:
//!
//! | Setting         | Column            | Extra                                   |
//! |-----------------|-------------------|-----------------------------------------|
//! | `Tenant`        | `tenant_id`       | FK to the tenant table, index           |
//! | `Source`        | `source_id`       | FK to the source table, index           |
//! | `CreatedAt`     | `created_at`      | index, mutator may not write it         |
//! | `LastUpdatedAt` | `last_updated_at` | index, BEFORE UPDATE trigger            |
//!
//! Planning reads the live catalog and emits only what is missing, so a
//! second run on an augmented table plans nothing. The structural plan
//! commits before the created-at column policy is applied, because the
//! policy's column list is read back from the catalog.

pub mod trigger;

use serde::Serialize;
use std::collections::BTreeSet;

use crate::catalog::{Catalog, ColumnInfo};
use crate::domain::Identifier;
use crate::error::{Result, TablewrightError};
use crate::policy;
use crate::settings::{
    resolve_bool, resolve_string, ColumnToggle, SettingsContext, TableOverrides, CREATED_AT_COLUMN,
    LAST_UPDATED_AT_COLUMN, MULTI_TENANT, MUTATOR_ROLE, SOURCE_COLUMN, SOURCE_TABLE, TENANT_TABLE,
};
use crate::statement::{
    ColumnDef, ColumnDefault, ColumnType, ForeignRef, Privilege, QualifiedName, Statement,
};

pub use trigger::{ensure_update_trigger, plan_update_trigger, trigger_name, TriggerPurpose};

pub const TENANT_ID: &str = "tenant_id";
pub const SOURCE_ID: &str = "source_id";
pub const CREATED_AT: &str = "created_at";
pub const LAST_UPDATED_AT: &str = "last_updated_at";

pub const DEFAULT_MUTATOR_ROLE: &str = "mutator";
pub const DEFAULT_TENANT_TABLE: &str = "public.tenant";
pub const DEFAULT_SOURCE_TABLE: &str = "public.source";

/// A cross-cutting concern a table can opt into
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableSetting {
    Tenant,
    Source,
    CreatedAt,
    LastUpdatedAt,
}

impl TableSetting {
    /// Column injected for this setting
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Tenant => TENANT_ID,
            Self::Source => SOURCE_ID,
            Self::CreatedAt => CREATED_AT,
            Self::LastUpdatedAt => LAST_UPDATED_AT,
        }
    }
}

/// Settings enabled for one table, overrides first then ambient then defaults
pub fn resolve_settings(
    ctx: &SettingsContext,
    overrides: &TableOverrides,
) -> Result<BTreeSet<TableSetting>> {
    let toggle = |t: Option<ColumnToggle>| t.and_then(|t| t.add_to_table);

    let mut enabled = BTreeSet::new();
    if resolve_bool(ctx, MULTI_TENANT, false, overrides.multi_tenant)? {
        enabled.insert(TableSetting::Tenant);
    }
    if resolve_bool(ctx, SOURCE_COLUMN, false, toggle(overrides.source_column))? {
        enabled.insert(TableSetting::Source);
    }
    if resolve_bool(ctx, CREATED_AT_COLUMN, true, toggle(overrides.created_at_column))? {
        enabled.insert(TableSetting::CreatedAt);
    }
    if resolve_bool(ctx, LAST_UPDATED_AT_COLUMN, true, toggle(overrides.last_updated_at_column))? {
        enabled.insert(TableSetting::LastUpdatedAt);
    }
    Ok(enabled)
}

/// Structural changes still missing from one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AugmentPlan {
    pub table: QualifiedName,
    pub settings: BTreeSet<TableSetting>,
    pub statements: Vec<Statement>,
}

impl AugmentPlan {
    /// Whether the table is already fully augmented
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Index name for an injected column, e.g. `users_tenant_id_idx`
///
/// Long table names are shortened with a hash (see [`Identifier::derived`]).
pub fn index_name(table: &Identifier, column: &str) -> Result<Identifier> {
    Identifier::derived(table, &format!("{column}_idx"))
}

/// Plan the structural changes for `table`
///
/// Fails with `DependencyMissing` when the table does not exist. The plan is
/// computed from one snapshot of catalog reads; nothing is written.
pub async fn plan_settings<C: Catalog>(
    catalog: &C,
    ctx: &SettingsContext,
    table: &QualifiedName,
    overrides: &TableOverrides,
) -> Result<AugmentPlan> {
    let settings = resolve_settings(ctx, overrides)?;

    let columns = catalog.list_columns(table.schema.as_str(), table.name.as_str()).await?;
    if columns.is_empty() {
        return Err(TablewrightError::dependency_missing(format!(
            "relation {table} does not exist"
        )));
    }

    let mut statements = Vec::new();
    for setting in &settings {
        let column = setting.column();
        if !has_column(&columns, column) {
            statements.push(Statement::AddColumn {
                table: table.clone(),
                column: column_def(*setting, ctx, table)?,
            });
        }

        let index = index_name(&table.name, column)?;
        if !catalog.index_exists(table.schema.as_str(), index.as_str()).await? {
            statements.push(Statement::CreateIndex {
                name: index,
                table: table.clone(),
                column: Identifier::new(column)?,
            });
        }

        if *setting == TableSetting::LastUpdatedAt {
            statements.extend(plan_update_trigger(catalog, table).await?);
        }
    }

    Ok(AugmentPlan { table: table.clone(), settings, statements })
}

/// Augment `table` and lock `created_at` out of the mutator's writes
///
/// The structural plan runs in one transaction. When `CreatedAt` is
/// enabled the mutator role's UPDATE and INSERT grants are then replaced in
/// a second transaction; the mutator role must exist and hold SELECT.
/// Returns the enabled settings.
pub async fn apply_settings<C: Catalog>(
    catalog: &mut C,
    ctx: &SettingsContext,
    table: &QualifiedName,
    overrides: &TableOverrides,
) -> Result<BTreeSet<TableSetting>> {
    let plan = plan_settings(&*catalog, ctx, table, overrides).await?;

    if plan.is_empty() {
        tracing::debug!(table = %table, "table already augmented");
    } else {
        catalog.apply(&plan.statements).await?;
        tracing::info!(table = %table, statements = plan.statements.len(), "augmented table");
    }

    if plan.settings.contains(&TableSetting::CreatedAt) {
        let mutator = resolve_string(ctx, MUTATOR_ROLE, DEFAULT_MUTATOR_ROLE, None)?;
        let excluded = [CREATED_AT];
        policy::apply_column_policies(
            catalog,
            &mutator,
            table,
            &[(Privilege::Update, &excluded[..]), (Privilege::Insert, &excluded[..])],
        )
        .await?;
    }

    Ok(plan.settings)
}

fn has_column(columns: &[ColumnInfo], name: &str) -> bool {
    columns.iter().any(|c| c.name == name)
}

fn column_def(setting: TableSetting, ctx: &SettingsContext, table: &QualifiedName) -> Result<ColumnDef> {
    let name = Identifier::new(setting.column())?;
    let def = match setting {
        TableSetting::Tenant => {
            reference_column(name, &resolve_string(ctx, TENANT_TABLE, DEFAULT_TENANT_TABLE, None)?, table)?
        }
        TableSetting::Source => {
            reference_column(name, &resolve_string(ctx, SOURCE_TABLE, DEFAULT_SOURCE_TABLE, None)?, table)?
        }
        TableSetting::CreatedAt => ColumnDef {
            name,
            data_type: ColumnType::Timestamptz,
            not_null: true,
            default: Some(ColumnDefault::TransactionTimestamp),
            references: None,
        },
        TableSetting::LastUpdatedAt => ColumnDef {
            name,
            data_type: ColumnType::Timestamptz,
            not_null: true,
            default: Some(ColumnDefault::ClockTimestamp),
            references: None,
        },
    };
    Ok(def)
}

fn reference_column(name: Identifier, target: &str, table: &QualifiedName) -> Result<ColumnDef> {
    Ok(ColumnDef {
        name,
        data_type: ColumnType::Uuid,
        not_null: true,
        default: Some(ColumnDefault::NilUuid),
        references: Some(ForeignRef {
            table: QualifiedName::parse(target, table.schema.as_str())?,
            column: Identifier::new("id")?,
        }),
    })
}
