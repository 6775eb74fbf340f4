//! Configuration Management
//!
//! This module loads the Tablewright configuration file: the database
//! connection, the ambient settings tree used by setting resolution, and
//! per-role login credentials.
//!
//! # Configuration Locations
//! - Explicit: `--config <file>` (used alone when given)
//! - Local: `.tablewright/config.json` (team-shareable, per-project)
//! - Global: `~/.config/tablewright/config.json` (per-user)
//!
//! # Resolution Precedence
//! When both local and global files exist they are merged, local winning:
//! - `connection` is replaced as a whole
//! - `settings` is deep-merged key by key
//! - `roles` is merged per role name
//!
//! # Credentials
//! Role credentials are read from `roles.<roleName>.password`, or from the
//! environment variable named by `roles.<roleName>.password_env`. Role names
//! are folded to lowercase like any unquoted identifier. An empty literal
//! falls back to `password_env`; an absent or empty credential means "this
//! role must not log in".

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, TablewrightError};
use crate::settings::SettingsContext;

/// Connection configuration for the target database
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Hostname
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Port number (defaults to 5432)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Username
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Password
    /// WARNING: Sensitive data, do not log or include in error messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Database name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

impl ConnectionConfig {
    /// Create a new `PostgreSQL` connection config
    #[must_use]
    pub const fn postgres(
        host: String,
        port: u16,
        user: String,
        password: String,
        database: String,
    ) -> Self {
        Self {
            host: Some(host),
            port: Some(port),
            user: Some(user),
            password: Some(password),
            database: Some(database),
        }
    }
}

/// Stored connection configuration
///
/// Similar to `ConnectionConfig` but supports an environment variable
/// reference for the password.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredConnection {
    /// Connection configuration
    #[serde(flatten)]
    pub config: ConnectionConfig,

    /// Environment variable name for password (if not storing password directly)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

impl StoredConnection {
    /// Resolve environment variables and return a `ConnectionConfig`
    pub fn resolve(&self) -> Result<ConnectionConfig> {
        let mut config = self.config.clone();

        if let Some(env_var) = &self.password_env {
            match std::env::var(env_var) {
                Ok(password) => config.password = Some(password),
                Err(_) => {
                    return Err(TablewrightError::config_error(format!(
                        "Environment variable {env_var} not found for password"
                    )));
                }
            }
        }

        Ok(config)
    }
}

/// Login credential of one role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCredential {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

/// Externally configured role credentials, keyed by folded role name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, RoleCredential>",
    into = "BTreeMap<String, RoleCredential>"
)]
pub struct Credentials {
    roles: BTreeMap<String, RoleCredential>,
}

impl From<BTreeMap<String, RoleCredential>> for Credentials {
    fn from(roles: BTreeMap<String, RoleCredential>) -> Self {
        Self {
            roles: roles.into_iter().map(|(role, credential)| (role.to_lowercase(), credential)).collect(),
        }
    }
}

impl From<Credentials> for BTreeMap<String, RoleCredential> {
    fn from(credentials: Credentials) -> Self {
        credentials.roles
    }
}

impl Credentials {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a literal password for `role`
    #[must_use]
    pub fn with_password(mut self, role: &str, password: &str) -> Self {
        self.roles.insert(
            role.to_lowercase(),
            RoleCredential { password: Some(password.to_string()), password_env: None },
        );
        self
    }

    pub fn remove(&mut self, role: &str) {
        self.roles.remove(&role.to_lowercase());
    }

    /// The configured password for `role`, if any
    ///
    /// A non-empty literal password wins over `password_env`. Empty strings
    /// and unset environment variables count as absent.
    #[must_use]
    pub fn password_for(&self, role: &str) -> Option<String> {
        let credential = self.roles.get(&role.to_lowercase())?;
        credential
            .password
            .clone()
            .filter(|p| !p.is_empty())
            .or_else(|| {
                let env_var = credential.password_env.as_ref()?;
                std::env::var(env_var).ok().filter(|p| !p.is_empty())
            })
    }

    fn merge(&mut self, other: &Self) {
        for (role, credential) in &other.roles {
            self.roles.insert(role.clone(), credential.clone());
        }
    }
}

/// Contents of a configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<StoredConnection>,

    #[serde(default)]
    pub settings: SettingsContext,

    #[serde(default)]
    pub roles: Credentials,
}

impl Config {
    /// Merge `other` into `self`, `other` taking precedence
    pub fn merge(&mut self, other: Self) {
        if other.connection.is_some() {
            self.connection = other.connection;
        }
        self.settings.merge(&other.settings);
        self.roles.merge(&other.roles);
    }

    /// Resolved connection config, or an error when none is configured
    pub fn connection(&self) -> Result<ConnectionConfig> {
        self.connection
            .as_ref()
            .ok_or_else(|| TablewrightError::config_error("No connection configured"))?
            .resolve()
    }
}

/// Get path to local config file (`.tablewright/config.json`)
pub fn local_config_path() -> Result<PathBuf> {
    let current_dir = std::env::current_dir().map_err(|e| {
        TablewrightError::config_error(format!("Could not determine current directory: {e}"))
    })?;

    Ok(current_dir.join(".tablewright").join("config.json"))
}

/// Get path to global config file (`~/.config/tablewright/config.json`)
pub fn global_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| TablewrightError::config_error("Could not determine user config directory"))?;

    Ok(config_dir.join("tablewright").join("config.json"))
}

/// Load a config file; a missing file yields an empty config
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| TablewrightError::config_error(format!("Could not read config file: {e}")))?;

    serde_json::from_str(&contents)
        .map_err(|e| TablewrightError::config_error(format!("Invalid config file format: {e}")))
}

/// Load configuration with precedence
///
/// An explicit path must exist and is used alone. Otherwise the global file
/// is loaded first and the local file merged over it.
pub fn load_with_precedence(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(TablewrightError::config_error(format!(
                "Config file {} does not exist",
                path.display()
            )));
        }
        return load_config(path);
    }

    let mut config = load_config(&global_config_path()?)?;
    config.merge(load_config(&local_config_path()?)?);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{resolve_bool, MULTI_TENANT};
    use serde_json::json;

    #[test]
    fn test_config_deserialization() {
        let config: Config = serde_json::from_value(json!({
            "connection": { "host": "db", "port": 5433, "user": "owner", "database": "app", "password_env": "TW_DB_PASS" },
            "settings": { "tablewright": { "multi_tenant": true } },
            "roles": { "importer": { "password": "s3cret" } }
        }))
        .unwrap();

        let stored = config.connection.as_ref().unwrap();
        assert_eq!(stored.config.host.as_deref(), Some("db"));
        assert_eq!(stored.password_env.as_deref(), Some("TW_DB_PASS"));
        assert!(resolve_bool(&config.settings, MULTI_TENANT, false, None).unwrap());
        assert_eq!(config.roles.password_for("importer").as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_empty_config() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert!(config.connection.is_none());
        assert!(config.roles.password_for("importer").is_none());
    }

    #[test]
    fn test_missing_file_is_empty_config() {
        let config = load_config(Path::new("/nonexistent/tablewright/config.json")).unwrap();
        assert!(config.connection.is_none());
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let err = load_with_precedence(Some(Path::new("/nonexistent/tw.json"))).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_stored_connection_resolve_env_var() {
        std::env::set_var("TW_TEST_DB_PASSWORD", "secret");

        let stored = StoredConnection {
            config: ConnectionConfig { host: Some("localhost".to_string()), ..Default::default() },
            password_env: Some("TW_TEST_DB_PASSWORD".to_string()),
        };
        assert_eq!(stored.resolve().unwrap().password.as_deref(), Some("secret"));

        std::env::remove_var("TW_TEST_DB_PASSWORD");
    }

    #[test]
    fn test_stored_connection_resolve_missing_env_var() {
        let stored = StoredConnection {
            config: ConnectionConfig::default(),
            password_env: Some("TW_NONEXISTENT_VAR".to_string()),
        };
        let err = stored.resolve().unwrap_err();
        assert!(err.message().contains("Environment variable TW_NONEXISTENT_VAR not found"));
    }

    #[test]
    fn test_credentials_empty_is_absent() {
        let credentials = Credentials::new().with_password("importer", "");
        assert!(credentials.password_for("importer").is_none());
    }

    #[test]
    fn test_credentials_password_env() {
        std::env::set_var("TW_TEST_IMPORTER_PASSWORD", "from-env");
        let credentials: Credentials = serde_json::from_value(json!({
            "importer": { "password_env": "TW_TEST_IMPORTER_PASSWORD" },
            "loader": { "password_env": "TW_TEST_UNSET_PASSWORD" }
        }))
        .unwrap();

        assert_eq!(credentials.password_for("importer").as_deref(), Some("from-env"));
        assert!(credentials.password_for("loader").is_none());
        std::env::remove_var("TW_TEST_IMPORTER_PASSWORD");
    }

    #[test]
    fn test_credentials_role_names_fold() {
        let credentials: Credentials = serde_json::from_value(json!({
            "Importer": { "password": "s3cret" }
        }))
        .unwrap();

        assert_eq!(credentials.password_for("importer").as_deref(), Some("s3cret"));
        assert_eq!(credentials.password_for("IMPORTER").as_deref(), Some("s3cret"));
        assert_eq!(serde_json::to_value(&credentials).unwrap(), json!({ "importer": { "password": "s3cret" } }));
    }

    #[test]
    fn test_credentials_empty_literal_falls_back_to_env() {
        std::env::set_var("TW_TEST_FALLBACK_PASSWORD", "from-env");
        let credentials: Credentials = serde_json::from_value(json!({
            "importer": { "password": "", "password_env": "TW_TEST_FALLBACK_PASSWORD" },
            "loader": { "password": "literal", "password_env": "TW_TEST_FALLBACK_PASSWORD" }
        }))
        .unwrap();

        assert_eq!(credentials.password_for("importer").as_deref(), Some("from-env"));
        assert_eq!(credentials.password_for("loader").as_deref(), Some("literal"));
        std::env::remove_var("TW_TEST_FALLBACK_PASSWORD");
    }

    #[test]
    fn test_merge_local_over_global() {
        let mut global: Config = serde_json::from_value(json!({
            "connection": { "host": "global-host", "database": "app", "user": "u" },
            "settings": { "tablewright": { "multi_tenant": false, "roles": { "mutator": "writer" } } },
            "roles": { "importer": { "password": "g" }, "manager": { "password": "m" } }
        }))
        .unwrap();
        let local: Config = serde_json::from_value(json!({
            "settings": { "tablewright": { "multi_tenant": true } },
            "roles": { "importer": { "password": "l" } }
        }))
        .unwrap();

        global.merge(local);

        assert_eq!(global.connection().unwrap().host.as_deref(), Some("global-host"));
        assert!(resolve_bool(&global.settings, MULTI_TENANT, false, None).unwrap());
        assert_eq!(
            global.settings.lookup("tablewright.roles.mutator"),
            Some(&json!("writer"))
        );
        assert_eq!(global.roles.password_for("importer").as_deref(), Some("l"));
        assert_eq!(global.roles.password_for("manager").as_deref(), Some("m"));
    }
}
