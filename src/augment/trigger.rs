//! Audit trigger installation.
//!
//! One BEFORE UPDATE trigger per table and purpose. Trigger names are derived
//! from the table name, a fixed ordinal and the purpose suffix, so the
//! existence check by name is enough to make installation idempotent. The
//! ordinal places the trigger in `PostgreSQL`'s alphabetical firing order.

use crate::augment::LAST_UPDATED_AT;
use crate::catalog::Catalog;
use crate::domain::Identifier;
use crate::error::{Result, TablewrightError};
use crate::statement::{QualifiedName, Statement};

/// What an audit trigger maintains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerPurpose {
    /// Stamp `last_updated_at` with the clock time on every update
    LastUpdatedAt,
}

impl TriggerPurpose {
    const fn ordinal(self) -> u8 {
        match self {
            Self::LastUpdatedAt => 90,
        }
    }

    const fn suffix(self) -> &'static str {
        match self {
            Self::LastUpdatedAt => "set_last_updated_at",
        }
    }

    /// Column the trigger function overwrites
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::LastUpdatedAt => LAST_UPDATED_AT,
        }
    }
}

/// Deterministic trigger name, e.g. `users_90_set_last_updated_at`
///
/// Long table names are shortened with a hash (see [`Identifier::derived`]).
pub fn trigger_name(table: &Identifier, purpose: TriggerPurpose) -> Result<Identifier> {
    Identifier::derived(table, &format!("{:02}_{}", purpose.ordinal(), purpose.suffix()))
}

/// Shared trigger function for `purpose` in `schema`, e.g. `tablewright_set_last_updated_at`
pub fn trigger_function(schema: &Identifier, purpose: TriggerPurpose) -> Result<QualifiedName> {
    Ok(QualifiedName {
        schema: schema.clone(),
        name: Identifier::new(&format!("tablewright_{}", purpose.suffix()))?,
    })
}

/// Statements installing the last-updated trigger, empty if it already exists
///
/// Does not check that the column exists; the augmentation engine adds it in
/// the same batch.
pub async fn plan_update_trigger<C: Catalog>(
    catalog: &C,
    table: &QualifiedName,
) -> Result<Vec<Statement>> {
    let purpose = TriggerPurpose::LastUpdatedAt;
    let name = trigger_name(&table.name, purpose)?;

    if catalog.trigger_exists(table.schema.as_str(), table.name.as_str(), name.as_str()).await? {
        tracing::debug!(table = %table, trigger = %name, "trigger already exists, skipping");
        return Ok(Vec::new());
    }

    let function = trigger_function(&table.schema, purpose)?;
    Ok(vec![
        Statement::CreateTriggerFunction {
            function: function.clone(),
            column: Identifier::new(purpose.column())?,
        },
        Statement::CreateTrigger { name, table: table.clone(), function },
    ])
}

/// Install the last-updated trigger on `table` if missing
///
/// Returns whether a trigger was created. The table must already have the
/// `last_updated_at` column.
pub async fn ensure_update_trigger<C: Catalog>(catalog: &mut C, table: &QualifiedName) -> Result<bool> {
    let columns = catalog.list_columns(table.schema.as_str(), table.name.as_str()).await?;
    if !columns.iter().any(|c| c.name == LAST_UPDATED_AT) {
        return Err(TablewrightError::dependency_missing(format!(
            "column \"{LAST_UPDATED_AT}\" of relation {table} does not exist"
        )));
    }

    let statements = plan_update_trigger(&*catalog, table).await?;
    if statements.is_empty() {
        return Ok(false);
    }
    catalog.apply(&statements).await?;
    tracing::info!(table = %table, "installed last-updated trigger");
    Ok(true)
}
