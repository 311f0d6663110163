//! Caregate operator CLI
//!
//! Applies and rolls back the schema migrations and answers the two
//! questions operators ask most: which slots a doctor still has open, and
//! how many beds a hospital has free.

use anyhow::{Context, Result};
use caregate::config::CaregateConfig;
use caregate::migration::{MigrationStatus, Migrator};
use caregate::{CareService, PgExecutor, PgPool, PgStore, SystemClock};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::process;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "caregate")]
#[command(about = "Scheduling core administration for Caregate")]
#[command(version = "0.1.0")]
struct Cli {
    /// Database connection URL
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the database schema
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },

    /// Bookable dates for a doctor, or open slots on one date
    Slots {
        #[arg(long)]
        doctor: Uuid,

        /// Date as YYYY-MM-DD; omit to list bookable dates instead
        #[arg(long)]
        date: Option<NaiveDate>,

        #[arg(long)]
        json: bool,
    },

    /// Bed occupancy for a hospital right now
    Beds {
        #[arg(long)]
        hospital: Uuid,

        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Show migration status (applied vs pending)
    Status,

    /// Apply pending migrations
    Up {
        /// Number of migrations to apply (default: all pending)
        #[arg(long)]
        steps: Option<usize>,

        /// Dry run - show what would be executed without running
        #[arg(long)]
        dry_run: bool,
    },

    /// Roll back applied migrations
    Down {
        /// Number of migrations to roll back (default: 1)
        #[arg(long, default_value = "1")]
        steps: usize,

        /// Dry run - show what would be rolled back
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli) {
        Ok(()) => process::exit(0),
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = CaregateConfig::load().context("loading configuration")?;
    config.runtime.configure_runtime();
    let url = cli.database_url;

    match cli.command {
        Commands::Migrate { action } => {
            let pool = open_database(url, &config)?;
            let session = pool.acquire().context("checking out a database session")?;
            let migrator = Migrator::new();
            match action {
                MigrateAction::Status => handle_status(&migrator, &session, cli.quiet),
                MigrateAction::Up { steps, dry_run } => handle_up(&migrator, &session, steps, dry_run),
                MigrateAction::Down { steps, dry_run } => handle_down(&migrator, &session, steps, dry_run),
            }
        }
        Commands::Slots { doctor, date, json } => {
            let store = PgStore::new(open_database(url, &config)?);
            let service = CareService::new(store, SystemClock).with_scheduling(config.scheduling);
            handle_slots(&service, doctor, date, json)
        }
        Commands::Beds { hospital, json } => {
            let store = PgStore::new(open_database(url, &config)?);
            handle_beds(&CareService::new(store, SystemClock), hospital, json)
        }
    }
}

/// `--database-url`, then `CAREGATE_DATABASE_URL`, then `DATABASE_URL`,
/// then the configured URL.
fn open_database(url: Option<String>, config: &CaregateConfig) -> Result<PgPool> {
    let database_url = url
        .or_else(|| std::env::var("CAREGATE_DATABASE_URL").ok())
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .unwrap_or_else(|| config.database.url.clone());
    log::debug!("opening database connection");
    PgPool::open(&database_url, &config.database).context("connecting to database")
}

type PgService = CareService<PgStore<PgPool>, SystemClock>;

fn handle_status(migrator: &Migrator, executor: &PgExecutor, quiet: bool) -> Result<()> {
    let status = migrator.status(executor)?;
    if quiet {
        return Ok(());
    }
    print_status(&status);
    Ok(())
}

fn print_status(status: &MigrationStatus) {
    println!("\n{}\n", "Migration status".bold());

    if status.applied.is_empty() {
        println!("Applied: none");
    } else {
        println!("Applied ({}):", status.applied_count);
        for record in &status.applied {
            let took = record
                .execution_time_ms
                .map_or_else(|| "n/a".to_string(), |ms| format!("{ms}ms"));
            println!(
                "  {} {}_{} ({}, {})",
                "✓".green(),
                record.version,
                record.name,
                record.applied_at.format("%Y-%m-%d %H:%M:%S"),
                took
            );
        }
    }

    println!();
    if status.pending.is_empty() {
        println!("Pending: none");
    } else {
        println!("Pending ({}):", status.pending_count);
        for pending in &status.pending {
            println!("  {} {}_{}", "…".yellow(), pending.version, pending.name);
        }
    }

    println!(
        "\nSummary: {} applied, {} pending",
        status.applied_count, status.pending_count
    );
}

fn handle_up(migrator: &Migrator, executor: &PgExecutor, steps: Option<usize>, dry_run: bool) -> Result<()> {
    if dry_run {
        let status = migrator.status(executor)?;
        if status.pending.is_empty() {
            println!("No pending migrations to apply");
            return Ok(());
        }
        let to_apply = steps.unwrap_or(status.pending.len()).min(status.pending.len());
        println!("Would apply {to_apply} migration(s):");
        for (i, pending) in status.pending.iter().take(to_apply).enumerate() {
            println!("  {}. {}_{}", i + 1, pending.version, pending.name);
        }
        return Ok(());
    }

    let applied = migrator.up(executor, steps)?;
    log::info!("migrate up finished, {applied} applied");
    if applied > 0 {
        println!("{} applied {applied} migration(s)", "ok".green().bold());
    } else {
        println!("{} no migrations to apply", "ok".green().bold());
    }
    Ok(())
}

fn handle_down(migrator: &Migrator, executor: &PgExecutor, steps: usize, dry_run: bool) -> Result<()> {
    if dry_run {
        let mut applied = migrator.status(executor)?.applied;
        if applied.is_empty() {
            println!("No applied migrations to roll back");
            return Ok(());
        }
        applied.sort_by_key(|m| std::cmp::Reverse(m.version));
        let to_rollback = steps.min(applied.len());
        println!("Would roll back {to_rollback} migration(s):");
        for (i, record) in applied.iter().take(to_rollback).enumerate() {
            println!("  {}. {}_{}", i + 1, record.version, record.name);
        }
        return Ok(());
    }

    let rolled_back = migrator.down(executor, Some(steps))?;
    log::info!("migrate down finished, {rolled_back} rolled back");
    println!("{} rolled back {rolled_back} migration(s)", "ok".green().bold());
    Ok(())
}

fn handle_slots(service: &PgService, doctor: Uuid, date: Option<NaiveDate>, json: bool) -> Result<()> {
    match date {
        Some(date) => {
            let slots = service.slots_for_date(doctor, date)?;
            let formatted: Vec<String> = slots.iter().map(|t| t.format("%H:%M").to_string()).collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&formatted)?);
            } else if formatted.is_empty() {
                println!("No open slots on {date}");
            } else {
                println!("Open slots on {date}:");
                for slot in formatted {
                    println!("  {slot}");
                }
            }
        }
        None => {
            let dates = service.bookable_dates(doctor)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&dates)?);
            } else {
                println!("Bookable dates:");
                for d in dates {
                    println!("  {}", d.format("%a %Y-%m-%d"));
                }
            }
        }
    }
    Ok(())
}

fn handle_beds(service: &PgService, hospital: Uuid, json: bool) -> Result<()> {
    let summary = service.bed_summary(hospital, Utc::now())?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    let available = if summary.available > 0 {
        summary.available.to_string().green()
    } else {
        summary.available.to_string().red()
    };
    println!(
        "total {}  occupied {}  available {}",
        summary.total, summary.occupied, available
    );
    Ok(())
}
