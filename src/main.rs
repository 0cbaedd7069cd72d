//! usagebot - daily user activity digests posted to Slack
//!
//! Queries per-company usage metrics from BigQuery for each date not yet
//! reported, renders the joined table to an image, posts it to a Slack
//! channel and records the run in a SQLite ledger.
//!
//! Exit codes:
//!   0 - Success, or nothing left to report
//!   1 - Runtime error (config, credentials, warehouse, render, delivery, ledger)

mod aggregate;
mod cli;
mod config;
mod delivery;
mod driver;
mod error;
mod ledger;
mod models;
mod render;
mod report;
mod schedule;
mod table;
mod telemetry;
mod warehouse;

use aggregate::CompanyNames;
use anyhow::{Context, Result};
use chrono::Utc;
use cli::Args;
use config::{Config, DEFAULT_CONFIG_FILE};
use delivery::SlackDelivery;
use driver::{BatchOutcome, BatchSettings, RunDriver};
use ledger::RunLedger;
use models::RunType;
use render::ProcessRenderer;
use std::path::{Path, PathBuf};
use telemetry::RunTelemetry;
use tracing::{debug, error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use warehouse::BigQueryWarehouse;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Config is read before logging so [general].verbose can set the level
    let (mut config, source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(args.log_level(config.general.verbose));

    info!("usagebot v{}", env!("CARGO_PKG_VERSION"));
    source.log();
    debug!("Arguments: {:?}", args);

    match run(args, config).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .usagebot.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", DEFAULT_CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to set companies, start_date, channel and warehouse tables.");
    Ok(())
}

/// Initialize logging. `RUST_LOG` wins over the verbosity settings when set.
fn init_logging(level: tracing::Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(LevelFilter::from_level(level).into()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run one batch end to end.
async fn run(args: Args, config: Config) -> Result<()> {
    config.validate(args.dryrun)?;

    let slack_token = read_token(args.slack_token_path.as_deref(), "Slack")?;
    let warehouse_token = read_token(args.warehouse_token_path.as_deref(), "BigQuery")?;

    let warehouse = BigQueryWarehouse::new(config.bigquery(), warehouse_token)?;
    let delivery = SlackDelivery::new(
        config.slack.api_url.clone(),
        slack_token,
        config.slack.timeout_seconds,
    )?;
    let renderer = ProcessRenderer::new(&config.renderer.program, config.renderer.args.clone());

    let mut ledger = RunLedger::open(&config.ledger_path())?;
    if args.purge {
        ledger.purge()?;
        info!(
            "Ledger purged: {} scheduled, {} dry runs left",
            ledger.count(RunType::Scheduled)?,
            ledger.count(RunType::DryRun)?
        );
    }

    let names = if args.dryrun {
        CompanyNames::default()
    } else {
        CompanyNames::load(&warehouse)
            .await
            .context("Failed to load company names")?
    };

    let settings = BatchSettings {
        companies: config.company_ids(),
        channel: config.general.target_channel.clone(),
        min_start_date: config.schedule.start_date,
        max_days: config.schedule.n_days,
        dry_run: args.dryrun,
        artifacts_dir: config.rundata_dir(),
    };
    let run_type = if args.dryrun {
        warn!("Dry run: posting synthetic tables to {}", settings.channel);
        RunType::DryRun
    } else {
        RunType::Scheduled
    };

    println!("📊 Posting usage digests to #{}", settings.channel);
    println!(
        "   Companies: {} ({} display names known)",
        settings.companies.len(),
        names.len()
    );
    println!("   Ledger: {}", config.ledger_path().display());

    let mut telemetry = RunTelemetry::new(run_type);
    let today = Utc::now().date_naive();
    let mut driver = RunDriver::new(&warehouse, &names, &renderer, &delivery, &mut ledger, settings);

    let outcome = driver.run(today, &mut telemetry).await?;
    let stats = telemetry.stats();

    match outcome {
        BatchOutcome::UpToDate(range) => {
            println!("\n✅ Already up to date (next date: {}).", range.start);
        }
        BatchOutcome::Completed {
            range,
            delivered,
            skipped,
        } => {
            println!("\n✅ Batch complete for {}", range);
            println!("   Delivered: {}", delivered.len());
            println!("   Recorded: {}", stats.recorded.len());
            if !skipped.is_empty() {
                let dates: Vec<String> = skipped.iter().map(|d| d.to_string()).collect();
                println!("   Skipped (no data): {}", dates.join(", "));
            }
        }
    }
    println!(
        "   Ledger holds {} {} runs",
        ledger.count(run_type)?,
        run_type
    );

    Ok(())
}

/// Read a bearer token from a credential file.
fn read_token(path: Option<&Path>, service: &str) -> Result<String> {
    let path = path.with_context(|| format!("{} token path is required", service))?;
    let token = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} token: {}", service, path.display()))?;

    let token = token.trim().to_string();
    if token.is_empty() {
        anyhow::bail!("{} token file is empty: {}", service, path.display());
    }
    Ok(token)
}

/// Where the configuration came from, reported once logging is up.
enum ConfigSource {
    File(PathBuf),
    DefaultFile,
    Builtin,
    Unreadable(String),
}

impl ConfigSource {
    fn log(&self) {
        match self {
            ConfigSource::File(path) => info!("Loaded config from: {}", path.display()),
            ConfigSource::DefaultFile => info!("Loaded default config from {}", DEFAULT_CONFIG_FILE),
            ConfigSource::Builtin => debug!("No config file found, using defaults"),
            ConfigSource::Unreadable(e) => warn!("Failed to load config: {}", e),
        }
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<(Config, ConfigSource)> {
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, ConfigSource::File(config_path.clone())));
    }

    match Config::load_default() {
        Ok(Some(config)) => Ok((config, ConfigSource::DefaultFile)),
        Ok(None) => Ok((Config::default(), ConfigSource::Builtin)),
        Err(e) => Ok((Config::default(), ConfigSource::Unreadable(format!("{:#}", e)))),
    }
}
