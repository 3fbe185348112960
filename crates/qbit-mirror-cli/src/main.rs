mod commands;
mod logging;
mod progress;

use std::process::{self, ExitCode};

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use progress::CliReporter;
use qbit_mirror_core::config::{load_configuration, resolve_config_path};
use qbit_mirror_core::storage::models::StoreStats;
use qbit_mirror_core::storage::Database;
use qbit_mirror_core::{
    AppConfig, PassReport, QbitClient, RemoteEndpoint, SingleOutcome, SyncEngine,
};
use tracing::{error, info, warn};

fn main() -> ExitCode {
    dotenv().ok();
    let args = Cli::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let config = match load_configuration(&config_path) {
        Ok(config) => config,
        Err(err) => {
            logging::init_console_only();
            error!("Error loading configuration {}: {}", config_path.display(), err);
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = logging::init_logger(&config) {
        logging::init_console_only();
        error!("Fatal: {:#}", err);
        return ExitCode::FAILURE;
    }

    if let Err(err) = ctrlc::set_handler(|| {
        eprintln!("\n{}", "Interrupted, exiting".yellow());
        process::exit(0);
    }) {
        warn!("Could not install Ctrl-C handler: {}", err);
    }

    let outcome = match args.command {
        Some(Commands::PrintConfig) => {
            print_config(&config);
            Ok(())
        }
        Some(Commands::Stats) => run_stats(&config),
        Some(Commands::Blacklist) => run_blacklist(&config),
        None => run(&config, args.hash.as_deref()),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Fatal: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn open_database(config: &AppConfig) -> Result<Database> {
    Database::open(&config.database_file)
        .with_context(|| format!("opening state store {}", config.database_file.display()))
}

fn run(config: &AppConfig, hash: Option<&str>) -> Result<()> {
    print_banner(config, hash);

    let db = open_database(config)?;
    let timeout = config.request_timeout();
    let source = QbitClient::connect("source", &config.source, timeout)
        .with_context(|| format!("connecting to source {}", config.source.base_url()))?;
    let destination = QbitClient::connect("destination", &config.destination, timeout)
        .with_context(|| {
            format!("connecting to destination {}", config.destination.base_url())
        })?;

    for client in [&source, &destination] {
        match client.version() {
            Ok(version) => info!("Connected to {} ({})", client.label(), version),
            Err(err) => warn!("Could not read {} version: {}", client.label(), err),
        }
    }

    print_stats("Store before", &db.stats()?);

    let engine = SyncEngine::new(&source, &destination, &db, config);
    let reporter = CliReporter::new();

    match hash {
        Some(id) => {
            let outcome = engine.run_single(id, &reporter)?;
            print_single_outcome(id, &outcome);
        }
        None => {
            let report = engine.run_pass(&reporter)?;
            print_report(&report);
        }
    }

    print_stats("Store after", &db.stats()?);
    Ok(())
}

fn run_stats(config: &AppConfig) -> Result<()> {
    let db = open_database(config)?;
    print_stats("Store", &db.stats()?);

    let recent = db.recent_audit(10)?;
    if !recent.is_empty() {
        println!("{}", "Recent operations".bold());
        for entry in recent {
            println!(
                "  {} {:<11} {} {}",
                entry.timestamp.dimmed(),
                entry.operation.cyan(),
                entry.item_name,
                entry.details.unwrap_or_default().dimmed()
            );
        }
    }
    Ok(())
}

fn run_blacklist(config: &AppConfig) -> Result<()> {
    let db = open_database(config)?;
    let entries = db.list_blacklist()?;
    if entries.is_empty() {
        println!("Blacklist is empty");
        return Ok(());
    }

    println!("{} ({})", "Blacklist".bold(), entries.len());
    for entry in entries {
        println!(
            "  {} {} x{} {} {}",
            entry.blacklisted_at.dimmed(),
            entry.reason.red(),
            entry.attempt_count,
            entry.id.dimmed(),
            entry.display_name
        );
    }
    Ok(())
}

fn print_config(config: &AppConfig) {
    let mut shown = config.clone();
    shown.source = config.source.redacted();
    shown.destination = config.destination.redacted();
    println!("Configuration: {:#?}", shown);
}

fn print_banner(config: &AppConfig, hash: Option<&str>) {
    println!("{}", "qbit-mirror".bold().cyan());
    println!(
        "  {} -> {}",
        config.source.base_url().green(),
        config.destination.base_url().green()
    );
    let mode = match hash {
        Some(id) => format!("single item {}", id),
        None => "full pass".to_string(),
    };
    println!("  mode: {}", mode.yellow());

    let replication = &config.replication;
    println!(
        "  cleanup: {}, skip checking: {}, paused: {}, force start: {}, interval: {}s",
        replication.cleanup_mode,
        replication.skip_checking,
        replication.start_paused,
        replication.force_active,
        replication.sync_interval_secs
    );

    let policy = &config.policy;
    let categories = policy
        .categories
        .as_ref()
        .map(|c| c.join(", "))
        .unwrap_or_else(|| "all".to_string());
    println!(
        "  seeding only: {}, categories: {}, min size: {}, min ratio: {}, min upload: {}",
        policy.only_seeding_states,
        categories,
        threshold(policy.min_size_gb, " GB"),
        threshold(policy.min_ratio, ""),
        threshold(policy.min_upload_gb, " GB"),
    );
    println!();
}

fn threshold(value: Option<f64>, unit: &str) -> String {
    value
        .map(|v| format!("{}{}", v, unit))
        .unwrap_or_else(|| "-".to_string())
}

fn print_stats(title: &str, stats: &StoreStats) {
    println!("{}", title.bold());
    println!(
        "  source snapshot: {} items, {:.2} GB",
        stats.snapshot_count,
        stats.snapshot_gib()
    );
    println!(
        "  replicated:      {} items, {:.2} GB",
        stats.replicated_count,
        stats.replicated_gib()
    );
    println!("  blacklisted:     {}", stats.blacklist_count);
    if !stats.operations_24h.is_empty() {
        let ops: Vec<String> = stats
            .operations_24h
            .iter()
            .map(|(op, count)| format!("{} {}", op, count))
            .collect();
        println!("  last 24h:        {}", ops.join(", "));
    }
}

fn print_report(report: &PassReport) {
    println!();
    info!(
        "Source: {} listed, {} eligible | Blacklist: {} pruned, {} skipped",
        report.source_listed,
        report.source_eligible,
        report.blacklist_pruned,
        report.skipped_blacklisted
    );
    info!(
        "Replicated: {} | Failed: {}",
        format!("{}", report.replicated).green(),
        format!("{}", report.replication_failed).red(),
    );
    info!(
        "Orphans removed: {} | Failed: {}",
        format!("{}", report.orphans_removed).cyan(),
        format!("{}", report.orphans_failed).red(),
    );
    info!(
        "Unwanted removed: {} ({} transferring, {} errored) | Failed: {}",
        format!("{}", report.unwanted_removed).yellow(),
        report.unwanted_transferring,
        report.unwanted_errored,
        format!("{}", report.unwanted_failed).red(),
    );
    info!(
        "Pass finished in {}",
        format!("{:.2}s", report.duration.as_secs_f64()).green()
    );
}

fn print_single_outcome(id: &str, outcome: &SingleOutcome) {
    match outcome {
        SingleOutcome::Replicated => info!("{} {}", id, "replicated".green()),
        SingleOutcome::AlreadyPresent => info!("{} already on destination", id),
        SingleOutcome::Blacklisted => info!("{} is {}", id, "blacklisted".red()),
        SingleOutcome::NotFound => warn!("{} not found on source", id),
        SingleOutcome::Filtered(reason) => info!("{} filtered: {}", id, reason),
        SingleOutcome::Failed => error!("{} replication failed", id),
    }
}
