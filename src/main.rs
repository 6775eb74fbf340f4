//! Tablewright CLI Entry Point
//!
//! Subcommands:
//! - `apply` - Run a manifest against the configured database
//! - `settings` - Print the resolved feature toggles
//!
//! All output to stdout is JSON-only, one envelope per invocation. Logs go to
//! stderr, filtered by `TABLEWRIGHT_LOG` (default `warn`).

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use tablewright::augment::{resolve_settings, DEFAULT_MUTATOR_ROLE, DEFAULT_SOURCE_TABLE, DEFAULT_TENANT_TABLE};
use tablewright::settings::{resolve_string, TableOverrides, MUTATOR_ROLE, SOURCE_TABLE, TENANT_TABLE};
use tablewright::{
    load_with_precedence, manifest, Config, ErrorEnvelope, Manifest, Metadata, Result, SuccessEnvelope,
    TablewrightError,
};

/// Tablewright - schema augmentation and column-level access control
#[derive(Parser)]
#[command(name = "tablewright")]
#[command(about = "Idempotent schema augmentation and column-scoped grants for PostgreSQL")]
#[command(version)]
struct Cli {
    /// Config file to use instead of the local/global pair
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a manifest: domains, roles, table augmentation and policies
    Apply {
        /// Path to the manifest JSON file
        #[arg(long)]
        manifest: PathBuf,

        /// Run against an in-memory catalog seeded from the manifest
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the resolved feature toggles
    Settings,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();
    let started = Instant::now();

    let (command, result) = match &cli.command {
        Commands::Apply { manifest, dry_run } => {
            ("apply", apply(cli.config.as_deref(), manifest, *dry_run, started).await)
        }
        Commands::Settings => ("settings", settings(cli.config.as_deref(), started)),
    };

    match result {
        Ok((data, meta)) => {
            print_json(&SuccessEnvelope::new(command, data, meta));
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(code = err.error_code(), "{command} failed");
            print_json(&ErrorEnvelope::from_error(command, &err));
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("TABLEWRIGHT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{json}"),
        Err(e) => println!(
            r#"{{"ok": false, "error": {{"code": "ENGINE_ERROR", "message": "Could not serialize output: {e}"}}}}"#
        ),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| TablewrightError::invalid_input(format!("Could not serialize output: {e}")))
}

async fn apply(
    config_path: Option<&Path>,
    manifest_path: &Path,
    dry_run: bool,
    started: Instant,
) -> Result<(Value, Metadata)> {
    let config = load_with_precedence(config_path)?;
    let manifest = Manifest::from_path(manifest_path)?;

    if dry_run {
        let mut catalog = manifest.dry_run_catalog(&config.settings)?;
        let report = manifest::run(&mut catalog, &config.settings, &config.roles, &manifest).await?;
        let statements: Vec<String> = catalog.executed().iter().map(ToString::to_string).collect();
        let meta = Metadata::dry_run(elapsed_ms(started), statements.len());
        return Ok((json!({ "report": to_value(&report)?, "statements": statements }), meta));
    }

    let report = apply_live(&config, &manifest).await?;
    Ok((json!({ "report": to_value(&report)? }), Metadata::new(elapsed_ms(started))))
}

#[cfg(feature = "postgres")]
async fn apply_live(config: &Config, manifest: &Manifest) -> Result<tablewright::RunReport> {
    let mut catalog = tablewright::PgCatalog::connect(&config.connection()?).await?;
    manifest::run(&mut catalog, &config.settings, &config.roles, manifest).await
}

#[cfg(not(feature = "postgres"))]
async fn apply_live(_config: &Config, _manifest: &Manifest) -> Result<tablewright::RunReport> {
    Err(TablewrightError::config_error(
        "Built without the 'postgres' feature; only --dry-run is available",
    ))
}

fn settings(config_path: Option<&Path>, started: Instant) -> Result<(Value, Metadata)> {
    let config = load_with_precedence(config_path)?;
    let ctx = &config.settings;

    let enabled = resolve_settings(ctx, &TableOverrides::default())?;
    let data = json!({
        "enabled": to_value(&enabled)?,
        "mutator_role": resolve_string(ctx, MUTATOR_ROLE, DEFAULT_MUTATOR_ROLE, None)?,
        "tenant_table": resolve_string(ctx, TENANT_TABLE, DEFAULT_TENANT_TABLE, None)?,
        "source_table": resolve_string(ctx, SOURCE_TABLE, DEFAULT_SOURCE_TABLE, None)?,
    });
    Ok((data, Metadata::new(elapsed_ms(started))))
}
