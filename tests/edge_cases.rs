//! Edge Case Tests
//!
//! Failure propagation and awkward inputs:
//! - catalog read failures abort without writing
//! - hostile identifiers never reach a statement
//! - mixed-case columns created outside Tablewright
//! - unicode labels and long names at the identifier limit
//! - ambient settings with unusual spellings

use pretty_assertions::assert_eq;

use tablewright::augment::{trigger_name, TriggerPurpose, LAST_UPDATED_AT};
use tablewright::domain::MAX_IDENTIFIER_LENGTH;
use tablewright::settings::{CREATED_AT_COLUMN, MULTI_TENANT, TENANT_TABLE};
use tablewright::{
    apply_column_policy, apply_settings, ensure_role, Catalog, Identifier, Label, MemoryCatalog,
    Privilege, QualifiedName, SettingsContext, Statement, TableOverrides,
};

// ============================================================================
// Test Helpers
// ============================================================================

fn table(name: &str) -> QualifiedName {
    QualifiedName::new("app", name).unwrap()
}

fn no_created_at() -> SettingsContext {
    SettingsContext::empty().with(CREATED_AT_COLUMN, false)
}

// ============================================================================
// Catalog Read Failures
// ============================================================================

#[tokio::test]
async fn test_catalog_read_failure_propagates() {
    let mut catalog = MemoryCatalog::new();
    catalog.create_table("app", "items", &[("id", "uuid")]);
    catalog.set_fail_reads(true);

    let err = apply_settings(&mut catalog, &no_created_at(), &table("items"), &TableOverrides::default())
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "CATALOG_READ");
    assert!(catalog.executed().is_empty());
}

#[tokio::test]
async fn test_policy_read_failure_writes_nothing() {
    let mut catalog = MemoryCatalog::new();
    catalog.create_table("app", "items", &[("id", "uuid")]);
    catalog.create_role("mutator");
    catalog.set_fail_reads(true);

    let err = apply_column_policy(&mut catalog, "mutator", &table("items"), Privilege::Insert, &[])
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "CATALOG_READ");
    assert!(catalog.executed().is_empty());
}

// ============================================================================
// Hostile Identifiers
// ============================================================================

#[test]
fn test_injection_attempts_rejected() {
    let attempts = [
        "users; DROP TABLE users",
        "users\"--",
        "users' OR '1'='1",
        "app.users",
        "",
        " ",
    ];
    for attempt in attempts {
        let err = Identifier::new(attempt).unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR", "{attempt:?} was accepted");
    }
}

#[tokio::test]
async fn test_hostile_role_name_rejected_before_catalog() {
    let mut catalog = MemoryCatalog::new();
    catalog.set_fail_reads(true);

    let err = ensure_role(&mut catalog, "x\"; ALTER ROLE postgres NOLOGIN; --", "Reads")
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_hostile_tenant_table_setting_rejected() {
    let mut catalog = MemoryCatalog::new();
    catalog.create_table("app", "items", &[("id", "uuid")]);
    let ctx = no_created_at().with(MULTI_TENANT, true).with(TENANT_TABLE, "public.tenant(id); --");

    let err = apply_settings(&mut catalog, &ctx, &table("items"), &TableOverrides::default())
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "VALIDATION_ERROR");
    assert!(catalog.executed().is_empty());
}

#[test]
fn test_label_quotes_are_escaped() {
    let stmt = Statement::CommentOnRole {
        role: Identifier::new("accessor").unwrap(),
        comment: Label::new("Bob's read-only role").unwrap(),
    };
    assert_eq!(stmt.to_sql(), r#"COMMENT ON ROLE "accessor" IS 'Bob''s read-only role'"#);
}

// ============================================================================
// Columns Created Outside Tablewright
// ============================================================================

#[tokio::test]
async fn test_mixed_case_column_blocks_policy() {
    let mut catalog = MemoryCatalog::new();
    catalog.create_table("app", "legacy", &[("id", "uuid"), ("CamelCase", "text")]);
    catalog.create_role("loader");

    let err = apply_column_policy(&mut catalog, "loader", &table("legacy"), Privilege::Insert, &[])
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "VALIDATION_ERROR");
    assert!(catalog.grant("loader", "app", "legacy", Privilege::Insert).is_none());
}

#[tokio::test]
async fn test_existing_index_name_is_reused() {
    let mut catalog = MemoryCatalog::new();
    catalog.create_table("app", "items", &[("id", "uuid"), ("last_updated_at", "timestamptz")]);
    catalog
        .apply(&[Statement::CreateIndex {
            name: Identifier::new("items_last_updated_at_idx").unwrap(),
            table: table("items"),
            column: Identifier::new(LAST_UPDATED_AT).unwrap(),
        }])
        .await
        .unwrap();

    apply_settings(&mut catalog, &no_created_at(), &table("items"), &TableOverrides::default())
        .await
        .unwrap();
    assert_eq!(catalog.indexes("app", "items"), vec!["items_last_updated_at_idx"]);
}

// ============================================================================
// Length Limits
// ============================================================================

#[test]
fn test_trigger_name_at_identifier_limit() {
    // "_90_set_last_updated_at" is 23 characters
    let fits = Identifier::new(&"t".repeat(MAX_IDENTIFIER_LENGTH - 23)).unwrap();
    let name = trigger_name(&fits, TriggerPurpose::LastUpdatedAt).unwrap();
    assert_eq!(name.as_str().len(), MAX_IDENTIFIER_LENGTH);

    let shortened = Identifier::new(&"t".repeat(MAX_IDENTIFIER_LENGTH - 22)).unwrap();
    let name = trigger_name(&shortened, TriggerPurpose::LastUpdatedAt).unwrap();
    assert_eq!(name.as_str().len(), MAX_IDENTIFIER_LENGTH);
    assert!(name.as_str().ends_with("_90_set_last_updated_at"));
}

#[tokio::test]
async fn test_longest_table_name_is_augmented_once() {
    let long = "t".repeat(MAX_IDENTIFIER_LENGTH);
    let mut catalog = MemoryCatalog::new();
    catalog.create_table("app", &long, &[("id", "uuid")]);

    for _ in 0..2 {
        apply_settings(&mut catalog, &no_created_at(), &table(&long), &TableOverrides::default())
            .await
            .unwrap();
    }

    let triggers = catalog.triggers("app", &long);
    let indexes = catalog.indexes("app", &long);
    assert_eq!(triggers.len(), 1);
    assert_eq!(indexes.len(), 1);
    assert!(triggers[0].len() <= MAX_IDENTIFIER_LENGTH);
    assert!(indexes[0].len() <= MAX_IDENTIFIER_LENGTH);
    assert_eq!(catalog.columns("app", &long), vec!["id", LAST_UPDATED_AT]);
}

#[test]
fn test_label_counts_characters() {
    assert!(Label::new(&"é".repeat(128)).is_ok());
    assert!(Label::new(&"é".repeat(129)).is_err());
}

// ============================================================================
// Ambient Setting Spellings
// ============================================================================

#[tokio::test]
async fn test_setting_spellings() {
    for (spelling, expect_tenant) in [("on", true), ("YES", true), ("1", true), ("off", false), ("f", false)] {
        let mut catalog = MemoryCatalog::new();
        catalog.create_table("app", "items", &[("id", "uuid")]);
        catalog.create_table("public", "tenant", &[("id", "uuid")]);
        let ctx = no_created_at().with(MULTI_TENANT, spelling);

        apply_settings(&mut catalog, &ctx, &table("items"), &TableOverrides::default()).await.unwrap();
        assert_eq!(
            catalog.columns("app", "items").contains(&"tenant_id".to_string()),
            expect_tenant,
            "spelling {spelling}"
        );
    }
}

#[tokio::test]
async fn test_unparseable_setting_is_config_error() {
    let mut catalog = MemoryCatalog::new();
    catalog.create_table("app", "items", &[("id", "uuid")]);
    let ctx = no_created_at().with(MULTI_TENANT, "sometimes");

    let err = apply_settings(&mut catalog, &ctx, &table("items"), &TableOverrides::default())
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "CONFIG_ERROR");
}
