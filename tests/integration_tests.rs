//! End-to-End Property Tests
//!
//! These tests drive the public API against the in-memory catalog and check
//! the properties a deployment pass relies on:
//! - Re-running augmentation leaves the catalog unchanged
//! - Column policies replace earlier ones instead of accumulating
//! - Domain bounds are enforced exactly at the boundary
//! - Login follows the configured credential in both directions
//! - Exactly one audit trigger exists, and it owns `last_updated_at`
//! - The mutator role cannot write `created_at`

use chrono::{DateTime, Utc};
use pretty_assertions::assert_eq;

use tablewright::augment::{CREATED_AT, LAST_UPDATED_AT};
use tablewright::settings::{ColumnToggle, CREATED_AT_COLUMN, MULTI_TENANT, SOURCE_COLUMN};
use tablewright::{
    apply_column_policy, apply_settings, ensure_login, ensure_role, grant_baseline, Credentials,
    DomainRegistry, LoginState, MemoryCatalog, Privilege, QualifiedName, RoleArchetype,
    SettingsContext, TableOverrides,
};

// ============================================================================
// Test Helpers
// ============================================================================

fn orders() -> QualifiedName {
    QualifiedName::new("shop", "orders").unwrap()
}

/// Catalog with `shop.orders`, reference tables and the standard roles
async fn seeded_catalog() -> MemoryCatalog {
    let mut catalog = MemoryCatalog::new();
    catalog.create_table("shop", "orders", &[("id", "uuid"), ("total", "numeric"), ("note", "text")]);
    catalog.create_table("public", "tenant", &[("id", "uuid")]);
    catalog.create_table("public", "source", &[("id", "uuid")]);

    for archetype in [RoleArchetype::Mutator, RoleArchetype::Manager] {
        ensure_role(&mut catalog, archetype.default_name(), archetype.description()).await.unwrap();
        grant_baseline(&mut catalog, archetype, archetype.default_name(), &orders()).await.unwrap();
    }
    catalog
}

// ============================================================================
// Idempotency
// ============================================================================

#[tokio::test]
async fn test_apply_settings_twice_is_identical() {
    let setting_sets = [
        (SettingsContext::empty(), TableOverrides::default()),
        (
            SettingsContext::empty().with(MULTI_TENANT, true).with(SOURCE_COLUMN, true),
            TableOverrides::default(),
        ),
        (
            SettingsContext::empty().with(CREATED_AT_COLUMN, false),
            TableOverrides { multi_tenant: Some(true), ..TableOverrides::default() },
        ),
        (
            SettingsContext::empty(),
            TableOverrides {
                created_at_column: Some(ColumnToggle::add(false)),
                last_updated_at_column: Some(ColumnToggle::add(false)),
                ..TableOverrides::default()
            },
        ),
    ];

    for (ctx, overrides) in setting_sets {
        let mut catalog = seeded_catalog().await;

        let first = apply_settings(&mut catalog, &ctx, &orders(), &overrides).await.unwrap();
        let after_first = catalog.snapshot();
        let second = apply_settings(&mut catalog, &ctx, &orders(), &overrides).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(catalog.snapshot(), after_first, "second run changed the catalog for {overrides:?}");
    }
}

// ============================================================================
// Policy Replacement
// ============================================================================

#[tokio::test]
async fn test_policy_replacement_not_accumulation() {
    let mut catalog = seeded_catalog().await;
    apply_settings(&mut catalog, &SettingsContext::empty(), &orders(), &TableOverrides::default())
        .await
        .unwrap();

    apply_column_policy(&mut catalog, "mutator", &orders(), Privilege::Update, &[CREATED_AT])
        .await
        .unwrap();
    assert!(catalog.check_write("mutator", "shop", "orders", Privilege::Update, &[CREATED_AT]).is_err());

    apply_column_policy(&mut catalog, "mutator", &orders(), Privilege::Update, &[LAST_UPDATED_AT])
        .await
        .unwrap();
    assert!(catalog.check_write("mutator", "shop", "orders", Privilege::Update, &[CREATED_AT]).is_ok());
    assert!(catalog
        .check_write("mutator", "shop", "orders", Privilege::Update, &[LAST_UPDATED_AT])
        .is_err());
}

// ============================================================================
// Validation Boundary
// ============================================================================

#[test]
fn test_domain_validation_boundary() {
    let registry = DomainRegistry::with_builtins();

    assert!(registry.validate("label", &"a".repeat(128)).is_ok());
    let err = registry.validate("label", &"a".repeat(129)).unwrap_err();
    assert_eq!(err.error_code(), "VALIDATION_ERROR");

    assert_eq!(registry.validate("code2", "en").unwrap().value, "en");
    assert!(registry.validate("code2", "EN").is_err());
    assert!(registry.validate("code2", "eng").is_err());
}

// ============================================================================
// Login Toggle
// ============================================================================

#[tokio::test]
async fn test_login_toggle_sequence() {
    let mut catalog = MemoryCatalog::new();
    ensure_role(&mut catalog, "importer", RoleArchetype::Importer.description()).await.unwrap();

    let none = Credentials::new();
    let some = Credentials::new().with_password("importer", "correct horse");

    assert_eq!(ensure_login(&mut catalog, &none, "importer").await.unwrap(), LoginState::NoLogin);
    let role = catalog.role("importer").unwrap();
    assert!(!role.attributes.login);
    assert!(role.password.is_none());

    assert_eq!(ensure_login(&mut catalog, &some, "importer").await.unwrap(), LoginState::Login);
    let role = catalog.role("importer").unwrap();
    assert!(role.attributes.login);
    assert_eq!(role.password.as_deref(), Some("correct horse"));

    assert_eq!(ensure_login(&mut catalog, &none, "importer").await.unwrap(), LoginState::NoLogin);
    let role = catalog.role("importer").unwrap();
    assert!(!role.attributes.login);
    assert!(role.password.is_none());
}

#[tokio::test]
async fn test_password_never_rendered() {
    let mut catalog = MemoryCatalog::new();
    ensure_role(&mut catalog, "importer", "Loads rows").await.unwrap();
    let credentials = Credentials::new().with_password("importer", "hunter2");
    ensure_login(&mut catalog, &credentials, "importer").await.unwrap();

    let rendered: Vec<String> = catalog.executed().iter().map(ToString::to_string).collect();
    assert!(rendered.iter().all(|s| !s.contains("hunter2")));
    assert!(rendered.iter().any(|s| s.contains("LOGIN PASSWORD '********'")));
}

// ============================================================================
// Audit Trigger Singularity
// ============================================================================

#[tokio::test]
async fn test_single_trigger_advances_last_updated_at() {
    let mut catalog = seeded_catalog().await;
    let ctx = SettingsContext::empty();
    for _ in 0..2 {
        apply_settings(&mut catalog, &ctx, &orders(), &TableOverrides::default()).await.unwrap();
    }
    assert_eq!(catalog.triggers("shop", "orders"), vec!["orders_90_set_last_updated_at"]);

    let row = catalog
        .simulate_update(
            "mutator",
            "shop",
            "orders",
            &[("note", "gift"), (LAST_UPDATED_AT, "1999-12-31T23:59:59+00:00")],
        )
        .unwrap();

    assert_eq!(row["note"], "gift");
    let stamped: DateTime<Utc> = DateTime::parse_from_rfc3339(&row[LAST_UPDATED_AT]).unwrap().into();
    let drift = (Utc::now() - stamped).num_seconds().abs();
    assert!(drift < 5, "last_updated_at was {stamped}");
}

// ============================================================================
// Created-At Immutability
// ============================================================================

#[tokio::test]
async fn test_created_at_immutable_for_mutator() {
    let mut catalog = seeded_catalog().await;
    apply_settings(&mut catalog, &SettingsContext::empty(), &orders(), &TableOverrides::default())
        .await
        .unwrap();

    for privilege in [Privilege::Update, Privilege::Insert] {
        let err = catalog
            .check_write("mutator", "shop", "orders", privilege, &["total", CREATED_AT])
            .unwrap_err();
        assert!(err.message().contains("permission denied for column created_at"));

        assert!(catalog.check_write("mutator", "shop", "orders", privilege, &["total"]).is_ok());
        assert!(catalog
            .check_write("manager", "shop", "orders", privilege, &["total", CREATED_AT])
            .is_ok());
    }
}

#[tokio::test]
async fn test_created_at_disabled_leaves_mutator_untouched() {
    let mut catalog = seeded_catalog().await;
    let ctx = SettingsContext::empty().with(CREATED_AT_COLUMN, "off");
    apply_settings(&mut catalog, &ctx, &orders(), &TableOverrides::default()).await.unwrap();

    assert!(!catalog.columns("shop", "orders").contains(&CREATED_AT.to_string()));
    assert!(catalog
        .check_write("mutator", "shop", "orders", Privilege::Update, &["total", LAST_UPDATED_AT])
        .is_ok());
}
