//! Setting Resolution
//!
//! Resolves named settings to effective values with a fixed precedence:
//!
//! 1. Explicit per-call override (highest priority)
//! 2. Ambient setting from the [`SettingsContext`]
//! 3. Hard default
//!
//! The ambient layer is an explicit object passed in by the caller (usually
//! built from the `settings` section of the config file), never process-global
//! state, so resolution is a pure function of its inputs.
//!
//! # Ambient lookup
//! Paths are dotted (`tablewright.created_at_column.add_to_table`). Lookup walks
//! nested objects and also accepts a flat key spelled with the full path, the
//! way session settings are named. An unset path, `null`, or empty string is
//! treated as absent.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, TablewrightError};

/// Ambient path of the tenant column toggle
pub const MULTI_TENANT: &str = "tablewright.multi_tenant";
/// Ambient path of the source column toggle
pub const SOURCE_COLUMN: &str = "tablewright.source_column.add_to_table";
/// Ambient path of the created-at column toggle
pub const CREATED_AT_COLUMN: &str = "tablewright.created_at_column.add_to_table";
/// Ambient path of the last-updated-at column toggle
pub const LAST_UPDATED_AT_COLUMN: &str = "tablewright.last_updated_at_column.add_to_table";
/// Ambient path of the general-purpose mutator role name
pub const MUTATOR_ROLE: &str = "tablewright.roles.mutator";
/// Ambient path of the table tenant columns reference (`schema.table`)
pub const TENANT_TABLE: &str = "tablewright.tenant_table";
/// Ambient path of the table source columns reference (`schema.table`)
pub const SOURCE_TABLE: &str = "tablewright.source_table";

/// Ambient settings available to resolution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettingsContext {
    root: Value,
}

impl SettingsContext {
    /// Context with no ambient settings
    #[must_use]
    pub fn empty() -> Self {
        Self { root: Value::Object(serde_json::Map::new()) }
    }

    /// Wrap a JSON tree
    #[must_use]
    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    /// Set `path` to `value`, creating intermediate objects
    #[must_use]
    pub fn with(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.set(path, value.into());
        self
    }

    pub fn set(&mut self, path: &str, value: Value) {
        if !self.root.is_object() {
            self.root = Value::Object(serde_json::Map::new());
        }
        let mut node = &mut self.root;
        let mut parts = path.split('.').peekable();
        while let Some(part) = parts.next() {
            let Value::Object(map) = node else { return };
            if parts.peek().is_none() {
                map.insert(part.to_string(), value);
                return;
            }
            node = map
                .entry(part.to_string())
                .and_modify(|v| {
                    if !v.is_object() {
                        *v = Value::Object(serde_json::Map::new());
                    }
                })
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
        }
    }

    /// Deep-merge `other` into `self`, `other` winning on conflicts
    pub fn merge(&mut self, other: &Self) {
        merge_values(&mut self.root, &other.root);
    }

    /// Look up an ambient value; absent, `null` and `""` all yield `None`
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let found = self.lookup_nested(path).or_else(|| self.root.get(path))?;
        match found {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            other => Some(other),
        }
    }

    fn lookup_nested(&self, path: &str) -> Option<&Value> {
        path.split('.').try_fold(&self.root, |node, part| node.get(part))
    }

    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.root
    }
}

fn merge_values(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Resolve a boolean setting
///
/// Ambient strings accept the `PostgreSQL` boolean spellings
/// (`true/false`, `on/off`, `yes/no`, `1/0`, any case).
pub fn resolve_bool(
    ctx: &SettingsContext,
    path: &str,
    default: bool,
    override_value: Option<bool>,
) -> Result<bool> {
    if let Some(value) = override_value {
        return Ok(value);
    }
    match ctx.lookup(path) {
        None => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::Number(n)) if n.as_i64() == Some(1) => Ok(true),
        Some(Value::Number(n)) if n.as_i64() == Some(0) => Ok(false),
        Some(Value::String(s)) => parse_bool(s).ok_or_else(|| {
            TablewrightError::config_error(format!("Setting '{path}' is not a boolean: '{s}'"))
        }),
        Some(other) => Err(TablewrightError::config_error(format!(
            "Setting '{path}' is not a boolean: {other}"
        ))),
    }
}

/// Resolve a string setting
pub fn resolve_string(
    ctx: &SettingsContext,
    path: &str,
    default: &str,
    override_value: Option<&str>,
) -> Result<String> {
    if let Some(value) = override_value {
        return Ok(value.to_string());
    }
    match ctx.lookup(path) {
        None => Ok(default.to_string()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(TablewrightError::config_error(format!(
            "Setting '{path}' is not a string: {other}"
        ))),
    }
}

/// Resolve a structured setting through serde
pub fn resolve<T: DeserializeOwned>(
    ctx: &SettingsContext,
    path: &str,
    default: T,
    override_value: Option<T>,
) -> Result<T> {
    if let Some(value) = override_value {
        return Ok(value);
    }
    match ctx.lookup(path) {
        None => Ok(default),
        Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
            TablewrightError::config_error(format!("Setting '{path}' has an invalid shape: {e}"))
        }),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "on" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "off" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

/// `{addToTable?}` toggle for one injected column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnToggle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_to_table: Option<bool>,
}

impl ColumnToggle {
    #[must_use]
    pub const fn add(add: bool) -> Self {
        Self { add_to_table: Some(add) }
    }
}

/// Per-call overrides for table augmentation
///
/// Every field is optional; an absent field defers to the ambient setting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_tenant: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_column: Option<ColumnToggle>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at_column: Option<ColumnToggle>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_at_column: Option<ColumnToggle>,
}
