//! Coursewatch CLI
//!
//! Runs the watcher and offers a few inspection and maintenance commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use coursewatch::{
    error::{AppError, Result},
    models::{Config, Item, WatcherConfig, retention_cutoff},
    pipeline,
    services::{ConfigSourceFactory, SourceFactory, build_notifier},
    storage::{HealthStore, JsonFile, SeenSetFile, SeenStore},
    utils::log::{self as report, humanize},
};
use tokio_util::sync::CancellationToken;

/// Coursewatch - free course listing watcher
#[derive(Parser, Debug)]
#[command(
    name = "coursewatch",
    version,
    about = "Watches course listings and emails a digest of new free courses"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "coursewatch.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the watcher until interrupted
    Run,

    /// Run a single cycle and exit
    Once,

    /// Show the health file and seen-set statistics
    Status,

    /// Remove seen entries not sighted within the retention window
    Prune {
        /// Retention in days (default: watcher.retention_days)
        #[arg(
            long,
            value_parser = clap::value_parser!(u64).range(1..=WatcherConfig::MAX_RETENTION_DAYS)
        )]
        days: Option<u64>,
    },

    /// Send a sample digest through the configured notifier
    TestNotify,

    /// Validate the configuration
    Validate,

    /// Write the default configuration to the config path
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Initialize logging. `RUST_LOG` overrides the level.
fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Load the config file, or defaults when it does not exist.
fn load_config(path: &Path) -> Result<(Config, bool)> {
    if path.exists() {
        Ok((Config::load(path)?, true))
    } else {
        Ok((Config::default(), false))
    }
}

/// Cancel `token` on SIGINT or SIGTERM.
#[cfg(unix)]
fn install_shutdown(token: CancellationToken) -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => log::info!("Received SIGINT, shutting down"),
            _ = sigterm.recv() => log::info!("Received SIGTERM, shutting down"),
        }
        token.cancel();
    });
    Ok(())
}

#[cfg(not(unix))]
fn install_shutdown(token: CancellationToken) -> Result<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Received Ctrl-C, shutting down");
            token.cancel();
        }
    });
    Ok(())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, from_file) = match cli.command {
        Command::InitConfig { .. } => (Config::default(), false),
        _ => load_config(&cli.config)?,
    };
    init_logging(if cli.verbose {
        "debug"
    } else {
        &config.logging.level
    });
    if from_file {
        log::info!("Loaded configuration from {}", cli.config.display());
    } else if !matches!(cli.command, Command::InitConfig { .. }) {
        log::warn!(
            "No configuration at {}, using defaults",
            cli.config.display()
        );
    }
    let config = Arc::new(config);

    match cli.command {
        Command::Run => {
            config.validate()?;
            let shutdown = CancellationToken::new();
            install_shutdown(shutdown.clone())?;
            pipeline::run_forever(config, shutdown).await?;
        }

        Command::Once => {
            config.validate()?;
            let result = pipeline::run_once(config).await?;
            log::info!(
                "Cycle {}: {} fetched, {} new",
                if result.success { "succeeded" } else { "failed" },
                result.fetched,
                result.new_count
            );
            if !result.success {
                std::process::exit(1);
            }
        }

        Command::Status => show_status(&config).await?,

        Command::Prune { days } => {
            let days = days.unwrap_or(config.watcher.retention_days);
            prune(&config, days).await?;
        }

        Command::TestNotify => {
            let notifier = build_notifier(&config)?;
            let sample = vec![Item::new(
                "coursewatch-test",
                "Coursewatch test course",
                "https://example.com/course/coursewatch-test/",
                Utc::now(),
            )];
            if !notifier.notify(&sample).await {
                return Err(AppError::notify("test digest was not delivered"));
            }
            log::info!("Test digest delivered to {}", config.notifier.recipient);
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            let source = ConfigSourceFactory::new(Arc::clone(&config)).create()?;
            log::info!("✓ Listing source: {}", source.name());
            build_notifier(&config)?;
            log::info!("✓ Notifier: {:?}", config.notifier.kind);
            log::info!("All validations passed!");
        }

        Command::InitConfig { force } => init_config(&cli.config, force)?,
    }

    Ok(())
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(AppError::config(format!(
            "{} already exists. Use --force to overwrite.",
            path.display()
        )));
    }
    std::fs::write(path, Config::default().to_toml_string()?)?;
    log::info!("Wrote default configuration to {}", path.display());
    Ok(())
}

/// Entries listed by `status`.
const RECENT_LISTED: usize = 10;

async fn show_status(config: &Config) -> Result<()> {
    let now = Utc::now();
    report::header("Coursewatch status");

    match HealthStore::new(&config.paths.health_file).read().await? {
        Some(health) => {
            let mut rows = vec![
                ("Status", health.status.to_string()),
                ("PID", health.pid.to_string()),
                ("Uptime", humanize(now - health.start_time)),
                ("Courses found", health.total_courses_found.to_string()),
                ("Emails sent", health.emails_sent.to_string()),
                ("Errors", health.errors.to_string()),
            ];
            if let Some(at) = health.last_check {
                rows.push(("Last check", format!("{} ago", humanize(now - at))));
            }
            report::summary("Health", &rows);
        }
        None => report::sub_item(&format!(
            "No health file at {}",
            config.paths.health_file.display()
        )),
    }

    let seen_file = JsonFile::new(&config.paths.seen_file);
    match seen_file.read_json::<SeenSetFile>().await? {
        Some(data) => {
            let seen = &data.seen_courses;
            let mut rows = vec![("Tracked courses", seen.len().to_string())];
            if let Some(updated) = &data.last_updated {
                rows.push(("Last updated", updated.to_string()));
            }
            let newest = seen
                .iter()
                .filter_map(|(_, e)| e.first_seen.instant())
                .max();
            if let Some(at) = newest {
                rows.push(("Newest course", format!("{} ago", humanize(now - at))));
            }
            if let Some(cutoff) = retention_cutoff(now, config.watcher.retention_days) {
                let expiring = seen
                    .iter()
                    .filter_map(|(_, e)| e.last_seen.instant())
                    .filter(|at| *at < cutoff + chrono::Duration::days(1))
                    .count();
                rows.push(("Expiring within a day", expiring.to_string()));
            }
            report::summary("Seen-set", &rows);

            let recent = seen.newest(RECENT_LISTED);
            if !recent.is_empty() {
                log::info!("Recently seen courses:");
                for (id, entry) in recent {
                    report::sub_item(&format!(
                        "{} [{}] first seen {}",
                        entry.title, id, entry.first_seen
                    ));
                    report::sub_item(&format!("  {}", entry.url));
                }
            }
        }
        None => report::sub_item(&format!(
            "No seen-set at {}",
            config.paths.seen_file.display()
        )),
    }
    Ok(())
}

async fn prune(config: &Config, days: u64) -> Result<()> {
    let store = SeenStore::new(&config.paths.seen_file);
    let mut seen = store.load().await?;
    let now = Utc::now();

    let Some(removed) = seen.prune_retained(now, days) else {
        return Err(AppError::validation(format!(
            "retention of {days} days is out of range"
        )));
    };
    if removed.is_empty() {
        log::info!("Nothing older than {} days", days);
        return Ok(());
    }
    for id in &removed {
        report::sub_item(id);
    }
    store.save(&seen, now).await?;
    log::info!(
        "Pruned {} entries, {} remain",
        removed.len(),
        seen.len()
    );
    Ok(())
}
