//! Structured DDL/DCL Statements
//!
//! Every structural change Tablewright makes is expressed as a [`Statement`]
//! value built from typed parts ([`Identifier`], [`QualifiedName`],
//! [`Privilege`], [`Label`]) and rendered to `PostgreSQL` only at execution
//! time. Identifiers are always double-quoted and literals single-quote
//! escaped, so no caller-supplied string is ever interpolated raw.
//!
//! # Rendering
//! - [`Statement::to_sql`] produces the exact SQL sent to the server
//! - [`fmt::Display`] produces the same SQL with passwords redacted, and is
//!   what logs and JSON output use

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::{Identifier, Label};
use crate::error::{Result, TablewrightError};

/// Schema-qualified object name (`schema.name`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct QualifiedName {
    pub schema: Identifier,
    pub name: Identifier,
}

impl QualifiedName {
    /// Build a qualified name, validating both parts as identifiers
    pub fn new(schema: &str, name: &str) -> Result<Self> {
        Ok(Self { schema: Identifier::new(schema)?, name: Identifier::new(name)? })
    }

    /// Parse `schema.name`; a bare `name` lands in `default_schema`
    pub fn parse(value: &str, default_schema: &str) -> Result<Self> {
        match value.split_once('.') {
            Some((schema, name)) => Self::new(schema, name),
            None => Self::new(default_schema, value),
        }
    }

    /// Render as a quoted SQL reference
    #[must_use]
    pub fn to_sql(&self) -> String {
        format!("{}.{}", self.schema.quoted(), self.name.quoted())
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Table privileges understood by the grant primitives
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Privilege {
    Select,
    Insert,
    Update,
    Delete,
    Truncate,
    References,
    Trigger,
}

impl Privilege {
    pub const ALL: [Self; 7] = [
        Self::Select,
        Self::Insert,
        Self::Update,
        Self::Delete,
        Self::Truncate,
        Self::References,
        Self::Trigger,
    ];

    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Truncate => "TRUNCATE",
            Self::References => "REFERENCES",
            Self::Trigger => "TRIGGER",
        }
    }

    /// Whether `PostgreSQL` accepts a column list for this privilege
    ///
    /// DELETE, TRUNCATE and TRIGGER act on whole rows or the whole table.
    #[must_use]
    pub const fn is_column_scopable(&self) -> bool {
        matches!(self, Self::Select | Self::Insert | Self::Update | Self::References)
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for Privilege {
    type Err = TablewrightError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_sql().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TablewrightError::invalid_input(format!("Unknown privilege '{s}'")))
    }
}

/// Column types the augmentation engine injects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Uuid,
    Timestamptz,
}

impl ColumnType {
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::Uuid => "uuid",
            Self::Timestamptz => "timestamptz",
        }
    }
}

/// Server-side default expressions for injected columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnDefault {
    /// The all-zero UUID, used as the "no tenant/source" sentinel
    NilUuid,
    /// Start time of the current transaction
    TransactionTimestamp,
    /// Wall-clock time at evaluation
    ClockTimestamp,
}

impl ColumnDefault {
    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Self::NilUuid => format!("{}::uuid", quote_literal(&uuid::Uuid::nil().to_string())),
            Self::TransactionTimestamp => "transaction_timestamp()".to_string(),
            Self::ClockTimestamp => "clock_timestamp()".to_string(),
        }
    }
}

/// Foreign key target of an injected column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignRef {
    pub table: QualifiedName,
    pub column: Identifier,
}

/// Definition of a column added by `ALTER TABLE ... ADD COLUMN`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDef {
    pub name: Identifier,
    pub data_type: ColumnType,
    pub not_null: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<ColumnDefault>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<ForeignRef>,
}

impl ColumnDef {
    fn to_sql(&self) -> String {
        let mut sql = format!("{} {}", self.name.quoted(), self.data_type.as_sql());
        if self.not_null {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default.to_sql());
        }
        if let Some(fk) = &self.references {
            sql.push_str(&format!(" REFERENCES {} ({})", fk.table.to_sql(), fk.column.quoted()));
        }
        sql
    }
}

/// Role capability flags
///
/// `PostgreSQL` role attributes are individually toggled; Tablewright always
/// writes the full set so manual drift is overwritten rather than merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAttributes {
    pub superuser: bool,
    pub createdb: bool,
    pub createrole: bool,
    pub inherit: bool,
    pub login: bool,
    pub replication: bool,
    pub bypass_rls: bool,
}

impl RoleAttributes {
    /// No elevated capability of any kind
    #[must_use]
    pub const fn restrictive() -> Self {
        Self {
            superuser: false,
            createdb: false,
            createrole: false,
            inherit: false,
            login: false,
            replication: false,
            bypass_rls: false,
        }
    }

    #[must_use]
    pub fn to_sql(&self) -> String {
        let flag = |on: bool, name: &str| if on { name.to_string() } else { format!("NO{name}") };
        [
            flag(self.superuser, "SUPERUSER"),
            flag(self.createdb, "CREATEDB"),
            flag(self.createrole, "CREATEROLE"),
            flag(self.inherit, "INHERIT"),
            flag(self.login, "LOGIN"),
            flag(self.replication, "REPLICATION"),
            flag(self.bypass_rls, "BYPASSRLS"),
        ]
        .join(" ")
    }
}

impl Default for RoleAttributes {
    /// What `CREATE ROLE` gives a role with no options
    fn default() -> Self {
        Self { inherit: true, ..Self::restrictive() }
    }
}

/// One structural write against the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Statement {
    CreateDomain { name: QualifiedName, storage_type: String, check: Option<String> },
    AddColumn { table: QualifiedName, column: ColumnDef },
    CreateIndex { name: Identifier, table: QualifiedName, column: Identifier },
    /// Trigger function that stamps `column` with the clock time
    CreateTriggerFunction { function: QualifiedName, column: Identifier },
    /// BEFORE UPDATE row trigger
    CreateTrigger { name: Identifier, table: QualifiedName, function: QualifiedName },
    RevokePrivilege { privilege: Privilege, table: QualifiedName, role: Identifier },
    GrantColumns {
        privilege: Privilege,
        columns: Vec<Identifier>,
        table: QualifiedName,
        role: Identifier,
    },
    GrantTable { privilege: Privilege, table: QualifiedName, role: Identifier },
    CreateRole { role: Identifier },
    AlterRoleAttributes { role: Identifier, attributes: RoleAttributes },
    /// `Some` grants login with that password, `None` revokes login and clears it
    SetLogin {
        role: Identifier,
        #[serde(skip)]
        password: Option<String>,
    },
    CommentOnRole { role: Identifier, comment: Label },
}

impl Statement {
    /// Render the exact SQL to execute
    #[must_use]
    pub fn to_sql(&self) -> String {
        self.render(false)
    }

    fn render(&self, redact: bool) -> String {
        match self {
            Self::CreateDomain { name, storage_type, check } => match check {
                Some(check) => {
                    format!("CREATE DOMAIN {} AS {storage_type} CHECK ({check})", name.to_sql())
                }
                None => format!("CREATE DOMAIN {} AS {storage_type}", name.to_sql()),
            },
            Self::AddColumn { table, column } => format!(
                "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {}",
                table.to_sql(),
                column.to_sql()
            ),
            Self::CreateIndex { name, table, column } => format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                name.quoted(),
                table.to_sql(),
                column.quoted()
            ),
            Self::CreateTriggerFunction { function, column } => format!(
                "CREATE OR REPLACE FUNCTION {}() RETURNS trigger LANGUAGE plpgsql AS $fn$\n\
                 BEGIN\n  NEW.{} := clock_timestamp();\n  RETURN NEW;\nEND;\n$fn$",
                function.to_sql(),
                column.quoted()
            ),
            Self::CreateTrigger { name, table, function } => format!(
                "CREATE OR REPLACE TRIGGER {} BEFORE UPDATE ON {} FOR EACH ROW EXECUTE FUNCTION {}()",
                name.quoted(),
                table.to_sql(),
                function.to_sql()
            ),
            Self::RevokePrivilege { privilege, table, role } => {
                format!("REVOKE {privilege} ON TABLE {} FROM {}", table.to_sql(), role.quoted())
            }
            Self::GrantColumns { privilege, columns, table, role } => format!(
                "GRANT {privilege} ({}) ON TABLE {} TO {}",
                columns.iter().map(Identifier::quoted).collect::<Vec<_>>().join(", "),
                table.to_sql(),
                role.quoted()
            ),
            Self::GrantTable { privilege, table, role } => {
                format!("GRANT {privilege} ON TABLE {} TO {}", table.to_sql(), role.quoted())
            }
            Self::CreateRole { role } => format!("CREATE ROLE {}", role.quoted()),
            Self::AlterRoleAttributes { role, attributes } => {
                format!("ALTER ROLE {} WITH {}", role.quoted(), attributes.to_sql())
            }
            Self::SetLogin { role, password } => match password {
                Some(_) if redact => format!("ALTER ROLE {} WITH LOGIN PASSWORD '********'", role.quoted()),
                Some(secret) => {
                    format!("ALTER ROLE {} WITH LOGIN PASSWORD {}", role.quoted(), quote_literal(secret))
                }
                None => format!("ALTER ROLE {} WITH NOLOGIN PASSWORD NULL", role.quoted()),
            },
            Self::CommentOnRole { role, comment } => {
                format!("COMMENT ON ROLE {} IS {}", role.quoted(), quote_literal(comment.as_str()))
            }
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(true))
    }
}

/// Quote a string as a SQL literal (`standard_conforming_strings` on)
#[must_use]
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> QualifiedName {
        QualifiedName::new("app", "users").unwrap()
    }

    fn ident(s: &str) -> Identifier {
        Identifier::new(s).unwrap()
    }

    #[test]
    fn test_qualified_name_parse() {
        let qn = QualifiedName::parse("app.tenant", "public").unwrap();
        assert_eq!(qn.to_string(), "app.tenant");

        let qn = QualifiedName::parse("tenant", "public").unwrap();
        assert_eq!(qn.to_sql(), r#""public"."tenant""#);

        assert!(QualifiedName::parse("app.bad-name", "public").is_err());
    }

    #[test]
    fn test_privilege_from_str() {
        assert_eq!("update".parse::<Privilege>().unwrap(), Privilege::Update);
        assert_eq!(" Select ".parse::<Privilege>().unwrap(), Privilege::Select);
        assert!("upsert".parse::<Privilege>().is_err());
    }

    #[test]
    fn test_privilege_column_scopable() {
        assert!(Privilege::Update.is_column_scopable());
        assert!(Privilege::References.is_column_scopable());
        assert!(!Privilege::Delete.is_column_scopable());
        assert!(!Privilege::Truncate.is_column_scopable());
    }

    #[test]
    fn test_render_revoke_then_grant() {
        let revoke = Statement::RevokePrivilege {
            privilege: Privilege::Update,
            table: users(),
            role: ident("mutator"),
        };
        let grant = Statement::GrantColumns {
            privilege: Privilege::Update,
            columns: vec![ident("id"), ident("name")],
            table: users(),
            role: ident("mutator"),
        };

        insta::assert_snapshot!(revoke.to_sql(), @r#"REVOKE UPDATE ON TABLE "app"."users" FROM "mutator""#);
        insta::assert_snapshot!(grant.to_sql(), @r#"GRANT UPDATE ("id", "name") ON TABLE "app"."users" TO "mutator""#);
    }

    #[test]
    fn test_render_add_column_with_reference() {
        let stmt = Statement::AddColumn {
            table: users(),
            column: ColumnDef {
                name: ident("tenant_id"),
                data_type: ColumnType::Uuid,
                not_null: true,
                default: Some(ColumnDefault::NilUuid),
                references: Some(ForeignRef {
                    table: QualifiedName::new("public", "tenant").unwrap(),
                    column: ident("id"),
                }),
            },
        };

        assert_eq!(
            stmt.to_sql(),
            "ALTER TABLE \"app\".\"users\" ADD COLUMN IF NOT EXISTS \"tenant_id\" uuid NOT NULL \
             DEFAULT '00000000-0000-0000-0000-000000000000'::uuid REFERENCES \"public\".\"tenant\" (\"id\")"
        );
    }

    #[test]
    fn test_render_role_attributes() {
        let stmt = Statement::AlterRoleAttributes {
            role: ident("importer"),
            attributes: RoleAttributes::restrictive(),
        };
        assert_eq!(
            stmt.to_sql(),
            r#"ALTER ROLE "importer" WITH NOSUPERUSER NOCREATEDB NOCREATEROLE NOINHERIT NOLOGIN NOREPLICATION NOBYPASSRLS"#
        );
    }

    #[test]
    fn test_password_is_escaped_and_redacted() {
        let stmt = Statement::SetLogin { role: ident("importer"), password: Some("it's".to_string()) };
        assert_eq!(stmt.to_sql(), r#"ALTER ROLE "importer" WITH LOGIN PASSWORD 'it''s'"#);
        assert!(!stmt.to_string().contains("it''s"));
        assert!(stmt.to_string().contains("********"));

        let stmt = Statement::SetLogin { role: ident("importer"), password: None };
        assert_eq!(stmt.to_sql(), r#"ALTER ROLE "importer" WITH NOLOGIN PASSWORD NULL"#);
    }

    #[test]
    fn test_comment_literal_escaped() {
        let stmt = Statement::CommentOnRole {
            role: ident("manager"),
            comment: Label::new("Manager's role").unwrap(),
        };
        assert_eq!(stmt.to_sql(), r#"COMMENT ON ROLE "manager" IS 'Manager''s role'"#);
    }

    #[test]
    fn test_statement_serialization_skips_password() {
        let stmt = Statement::SetLogin { role: ident("importer"), password: Some("secret".to_string()) };
        let json = serde_json::to_string(&stmt).unwrap();
        assert!(json.contains(r#""kind":"set_login""#));
        assert!(!json.contains("secret"));
    }
}
