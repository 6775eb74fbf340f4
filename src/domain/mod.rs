//! Domain Registry
//!
//! Named, constrained scalar types ("domains") that tables use instead of raw
//! primitives. A domain pairs a storage type with a pure validation predicate
//! (length bounds, pattern, case rule). Values are validated when they are
//! constructed, never when they are read.
//!
//! # Built-in domains
//! - `identifier` - case-insensitive SQL identifier, 1..=63 characters
//! - `code2` - lowercase two-letter code (`en`, `us`)
//! - `code3` - lowercase three-letter code (`eng`, `usd`)
//! - `label` - human-readable label, 1..=128 characters
//!
//! # Redefinition
//! Defining an identical domain twice is a silent success. Defining a
//! same-named domain with a different shape is an error and the existing
//! definition is kept. On the database side the same rule applies through
//! [`ensure_domains`]: an existing platform domain is skipped, never altered.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

use crate::catalog::Catalog;
use crate::error::{Result, TablewrightError};
use crate::statement::{quote_literal, QualifiedName, Statement};

/// `PostgreSQL` truncates identifiers beyond this many bytes
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Upper bound of the `label` domain
pub const MAX_LABEL_LENGTH: usize = 128;

static IDENTIFIER_DOMAIN: Lazy<Domain> = Lazy::new(builtin_identifier);
static LABEL_DOMAIN: Lazy<Domain> = Lazy::new(builtin_label);

// Storage types accepted by CREATE DOMAIN, e.g. `text`, `varchar(32)`, `timestamp with time zone`
static STORAGE_TYPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z][a-z0-9_]*( [a-z][a-z0-9_]*)*(\(\d+\))?$").expect("storage type pattern")
});

/// How a domain treats letter case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaseRule {
    /// No case constraint
    #[default]
    Any,
    /// Uppercase characters are rejected
    Lower,
    /// Values are normalized to lowercase before validation
    Insensitive,
}

/// Validation predicate of a domain
#[derive(Debug, Clone, Default)]
pub struct DomainConstraint {
    pub min_length: usize,
    pub pattern: Option<Regex>,
    pub case: CaseRule,
}

impl PartialEq for DomainConstraint {
    fn eq(&self, other: &Self) -> bool {
        self.min_length == other.min_length
            && self.case == other.case
            && self.pattern.as_ref().map(Regex::as_str) == other.pattern.as_ref().map(Regex::as_str)
    }
}

impl Eq for DomainConstraint {}

/// A named, constrained scalar type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    pub name: String,
    pub storage_type: String,
    pub max_length: Option<usize>,
    pub constraint: DomainConstraint,
}

impl Domain {
    /// Create an unconstrained domain over `storage_type`
    pub fn new(name: &str, storage_type: &str) -> Result<Self> {
        let name = Identifier::new(name)?.into_string();
        let storage_type = storage_type.trim().to_lowercase();
        if !STORAGE_TYPE.is_match(&storage_type) {
            return Err(TablewrightError::validation(
                &name,
                format!("unsupported storage type '{storage_type}'"),
            ));
        }
        Ok(Self { name, storage_type, max_length: None, constraint: DomainConstraint::default() })
    }

    #[must_use]
    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    #[must_use]
    pub fn min_length(mut self, min: usize) -> Self {
        self.constraint.min_length = min;
        self
    }

    #[must_use]
    pub fn case(mut self, case: CaseRule) -> Self {
        self.constraint.case = case;
        self
    }

    /// Anchor-free patterns are accepted as written; callers anchor them
    pub fn pattern(mut self, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| {
            TablewrightError::validation(&self.name, format!("invalid pattern '{pattern}': {e}"))
        })?;
        self.constraint.pattern = Some(regex);
        Ok(self)
    }

    /// Validate `value`, returning it in normalized form
    ///
    /// Lengths count characters, not bytes.
    pub fn validate(&self, value: &str) -> Result<String> {
        let normalized = match self.constraint.case {
            CaseRule::Insensitive => value.to_lowercase(),
            CaseRule::Any | CaseRule::Lower => value.to_string(),
        };

        let length = normalized.chars().count();
        if length < self.constraint.min_length {
            return Err(TablewrightError::validation(
                &self.name,
                format!(
                    "value has {length} characters, minimum is {}",
                    self.constraint.min_length
                ),
            ));
        }
        if let Some(max) = self.max_length {
            if length > max {
                return Err(TablewrightError::validation(
                    &self.name,
                    format!("value has {length} characters, maximum is {max}"),
                ));
            }
        }

        if self.constraint.case == CaseRule::Lower && normalized.chars().any(char::is_uppercase) {
            return Err(TablewrightError::validation(
                &self.name,
                format!("value '{normalized}' must be lowercase"),
            ));
        }

        if let Some(pattern) = &self.constraint.pattern {
            if !pattern.is_match(&normalized) {
                return Err(TablewrightError::validation(
                    &self.name,
                    format!("value '{normalized}' does not match pattern {}", pattern.as_str()),
                ));
            }
        }

        Ok(normalized)
    }

    /// The predicate as a `CHECK` expression over `VALUE`, if it has one
    #[must_use]
    pub fn check_sql(&self) -> Option<String> {
        let subject = match self.constraint.case {
            CaseRule::Insensitive => "lower(VALUE)",
            CaseRule::Any | CaseRule::Lower => "VALUE",
        };

        let mut clauses = Vec::new();
        if self.constraint.min_length > 0 {
            clauses.push(format!("char_length(VALUE) >= {}", self.constraint.min_length));
        }
        if let Some(max) = self.max_length {
            clauses.push(format!("char_length(VALUE) <= {max}"));
        }
        if self.constraint.case == CaseRule::Lower {
            clauses.push("VALUE = lower(VALUE)".to_string());
        }
        if let Some(pattern) = &self.constraint.pattern {
            clauses.push(format!("{subject} ~ {}", quote_literal(pattern.as_str())));
        }

        if clauses.is_empty() {
            None
        } else {
            Some(clauses.join(" AND "))
        }
    }

    /// `CREATE DOMAIN` for this domain inside `schema`
    pub fn create_statement(&self, schema: &Identifier) -> Result<Statement> {
        Ok(Statement::CreateDomain {
            name: QualifiedName { schema: schema.clone(), name: Identifier::new(&self.name)? },
            storage_type: self.storage_type.clone(),
            check: self.check_sql(),
        })
    }
}

/// A value that passed its domain's validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainValue {
    pub domain: String,
    pub value: String,
}

/// In-process registry of domain definitions
#[derive(Debug, Clone, Default)]
pub struct DomainRegistry {
    domains: BTreeMap<String, Domain>,
}

impl DomainRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in domains
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for domain in builtin_domains() {
            registry.domains.insert(domain.name.clone(), domain);
        }
        registry
    }

    /// Register a domain
    ///
    /// Re-registering an identical shape returns the existing definition.
    /// A conflicting shape is rejected and the existing one is kept.
    pub fn define(&mut self, domain: Domain) -> Result<&Domain> {
        if let Some(existing) = self.domains.get(&domain.name) {
            if *existing != domain {
                return Err(TablewrightError::validation(
                    &domain.name,
                    "a domain with this name is already defined with a different shape",
                ));
            }
        }
        let name = domain.name.clone();
        Ok(self.domains.entry(name).or_insert(domain))
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Domain> {
        self.domains.get(name)
    }

    /// Validate `value` against the named domain
    pub fn validate(&self, name: &str, value: &str) -> Result<DomainValue> {
        let domain = self
            .get(name)
            .ok_or_else(|| TablewrightError::invalid_input(format!("Unknown domain '{name}'")))?;
        Ok(DomainValue { domain: domain.name.clone(), value: domain.validate(value)? })
    }

    /// Domains in name order
    pub fn iter(&self) -> impl Iterator<Item = &Domain> {
        self.domains.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

/// Create every registered domain the live catalog does not already have
///
/// Returns the number of domains created. Existing platform domains are left
/// untouched even if their shape differs.
pub async fn ensure_domains<C: Catalog>(
    catalog: &mut C,
    schema: &Identifier,
    registry: &DomainRegistry,
) -> Result<usize> {
    let mut statements = Vec::new();
    for domain in registry.iter() {
        if catalog.domain_exists(schema.as_str(), &domain.name).await? {
            tracing::debug!(schema = %schema, domain = %domain.name, "domain already exists, skipping");
            continue;
        }
        statements.push(domain.create_statement(schema)?);
    }

    if !statements.is_empty() {
        catalog.apply(&statements).await?;
        tracing::info!(schema = %schema, created = statements.len(), "created domains");
    }
    Ok(statements.len())
}

/// SQL identifier validated through the `identifier` domain
///
/// Stored lowercase, the way `PostgreSQL` folds unquoted names. The pattern
/// excludes quotes, so [`Identifier::quoted`] never needs escaping.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    pub fn new(value: &str) -> Result<Self> {
        IDENTIFIER_DOMAIN.validate(value).map(Self)
    }

    /// Validate a name read back from the catalog, which is already folded
    ///
    /// Rejects names that only exist quoted (mixed case), since lowering them
    /// would address a different object.
    pub fn exact(value: &str) -> Result<Self> {
        let ident = Self::new(value)?;
        if ident.0 != value {
            return Err(TablewrightError::validation(
                "identifier",
                format!("'{value}' is not a folded lowercase identifier"),
            ));
        }
        Ok(ident)
    }

    /// Name `<base>_<suffix>` for an object derived from `base`
    ///
    /// When that does not fit in [`MAX_IDENTIFIER_LENGTH`], `base` is cut
    /// short and the first 8 hex digits of its SHA-256 are inserted, giving
    /// `<prefix>_<hash>_<suffix>`. The result only depends on its inputs.
    pub fn derived(base: &Self, suffix: &str) -> Result<Self> {
        let plain = format!("{base}_{suffix}");
        if plain.len() <= MAX_IDENTIFIER_LENGTH {
            return Self::new(&plain);
        }

        let digest = Sha256::digest(base.0.as_bytes());
        let hash = hex::encode(&digest[..4]);
        let keep = MAX_IDENTIFIER_LENGTH
            .saturating_sub(hash.len() + suffix.len() + 2)
            .min(base.0.len());
        // identifiers are ASCII, so byte slicing stays on char boundaries
        Self::new(&format!("{}_{hash}_{suffix}", &base.0[..keep]))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// Double-quoted form for SQL
    #[must_use]
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identifier {
    type Error = TablewrightError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.0
    }
}

/// Human-readable text validated through the `label` domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Label(String);

impl Label {
    pub fn new(value: &str) -> Result<Self> {
        LABEL_DOMAIN.validate(value).map(Self)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Label {
    type Error = TablewrightError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<Label> for String {
    fn from(value: Label) -> Self {
        value.0
    }
}

fn builtin_domains() -> Vec<Domain> {
    vec![
        builtin_identifier(),
        builtin_code("code2", 2),
        builtin_code("code3", 3),
        builtin_label(),
    ]
}

// Built-in shapes are constants; a failure here is a programming error.
fn builtin_identifier() -> Domain {
    Domain {
        name: "identifier".to_string(),
        storage_type: "text".to_string(),
        max_length: Some(MAX_IDENTIFIER_LENGTH),
        constraint: DomainConstraint {
            min_length: 1,
            pattern: Some(Regex::new(r"^[a-z_][a-z0-9_]*$").expect("identifier pattern")),
            case: CaseRule::Insensitive,
        },
    }
}

fn builtin_code(name: &str, length: usize) -> Domain {
    Domain {
        name: name.to_string(),
        storage_type: "text".to_string(),
        max_length: Some(length),
        constraint: DomainConstraint {
            min_length: length,
            pattern: Some(Regex::new(&format!("^[a-z]{{{length}}}$")).expect("code pattern")),
            case: CaseRule::Lower,
        },
    }
}

fn builtin_label() -> Domain {
    Domain {
        name: "label".to_string(),
        storage_type: "text".to_string(),
        max_length: Some(MAX_LABEL_LENGTH),
        constraint: DomainConstraint { min_length: 1, pattern: None, case: CaseRule::Any },
    }
}
