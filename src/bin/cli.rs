//! kita-watch CLI
//!
//! Polls the free places page on a randomized schedule and mails new
//! listings of interest.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use kita_watch::{
    error::Result,
    models::{Config, MailTransport},
    pipeline::{self, CycleOutcome, DiffCalculator, Poller},
    services::{HttpSource, PageSource, StaticSource, notifier},
    storage::{LocalStorage, SnapshotStore},
    utils::http,
};

/// kita-watch - free daycare places watcher
#[derive(Parser, Debug)]
#[command(
    name = "kita-watch",
    version,
    about = "Parses berlin.de for new kita places and sends a notification if something of interest pops up"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the snapshot storage directory
    #[arg(short, long)]
    storage_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Send email notifications
    #[arg(short = 'n', long)]
    send_notification: bool,

    /// Mail login user
    #[arg(short = 'u', long)]
    email_user: Option<String>,

    /// Mail login password
    #[arg(short = 'p', long)]
    email_password: Option<String>,

    /// SMTP server
    #[arg(short = 'H', long)]
    email_host: Option<String>,

    /// SMTP port
    #[arg(short = 'P', long)]
    email_port: Option<u16>,

    /// Deliver through this HTTP mail relay instead of SMTP
    #[arg(long)]
    email_endpoint: Option<String>,

    /// Sender address
    #[arg(short = 'f', long)]
    email_from: Option<String>,

    /// Recipient address (repeatable)
    #[arg(short = 't', long)]
    email_to: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll continuously with randomized pauses
    Run {
        /// Stop after this many cycles
        #[arg(long)]
        cycles: Option<usize>,
    },

    /// Run a single poll cycle
    Once {
        /// Read the page from a saved HTML file instead of fetching it
        #[arg(long)]
        from_file: Option<PathBuf>,
    },

    /// Validate configuration
    Validate,

    /// Show latest snapshot info
    Info,
}

/// Initialize logging. Everything passes the filter until the configuration
/// is read; `apply_log_level` narrows it afterwards.
fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace"))
        .format_timestamp_secs()
        .init();
}

/// `RUST_LOG` wins, then `--verbose`, then `logging.level`.
fn apply_log_level(verbose: bool, config: &Config) {
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        config.logging.level.parse().unwrap_or_else(|_| {
            log::warn!("Unknown log level '{}', using info", config.logging.level);
            log::LevelFilter::Info
        })
    };
    log::set_max_level(level);
}

/// Fold command line overrides into the loaded configuration.
fn apply_overrides(cli: &Cli, config: &mut Config) {
    if let Some(dir) = &cli.storage_dir {
        config.storage.dir = dir.clone();
    }
    if cli.send_notification {
        config.notify.enabled = true;
    }
    if cli.email_user.is_some() {
        config.notify.user = cli.email_user.clone();
    }
    if cli.email_password.is_some() {
        config.notify.password = cli.email_password.clone();
    }
    if let Some(host) = &cli.email_host {
        config.notify.host = host.clone();
    }
    if let Some(port) = cli.email_port {
        config.notify.port = port;
    }
    if cli.email_endpoint.is_some() {
        config.notify.transport = MailTransport::Relay;
        config.notify.endpoint = cli.email_endpoint.clone();
    }
    if cli.email_from.is_some() {
        config.notify.sender = cli.email_from.clone();
    }
    if !cli.email_to.is_empty() {
        config.notify.recipients = cli.email_to.clone();
    }
}

fn storage_for(config: &Config) -> LocalStorage {
    LocalStorage::new(&config.storage.dir).with_retention(config.storage.keep_snapshots)
}

fn build_poller(config: &Config, from_file: Option<PathBuf>) -> Result<Poller> {
    let client = http::create_async_client(&config.source)?;

    let source: Box<dyn PageSource> = match from_file {
        Some(path) => {
            log::info!("Reading listing page from {}", path.display());
            Box::new(StaticSource::new(std::fs::read_to_string(path)?))
        }
        None => {
            let source = HttpSource::new(client.clone(), config.source.listing_url());
            log::info!("Watching {}", source.url());
            Box::new(source)
        }
    };
    let notifier = notifier::from_config(&config.notify, client)?;

    Ok(Poller::new(
        config,
        source,
        Box::new(storage_for(config)),
        notifier,
    ))
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging();

    let mut config = Config::load_or_default(&cli.config);
    apply_log_level(cli.verbose, &config);
    apply_overrides(&cli, &mut config);

    match cli.command {
        Command::Run { cycles } => {
            config.validate()?;
            let poller = build_poller(&config, None)?;
            pipeline::run_forever(&poller, &config.schedule, cycles).await;
        }

        Command::Once { from_file } => {
            config.validate()?;
            let poller = build_poller(&config, from_file)?;
            let mut previous = poller.load_previous().await;

            match poller.run_cycle(&mut previous).await? {
                CycleOutcome::Completed(summary) => log::info!(
                    "Stored {} kitas at {} ({} of interest, notified: {})",
                    summary.kita_count,
                    summary.timestamp,
                    summary.report.interesting.len(),
                    summary.notified
                ),
                CycleOutcome::Empty => log::warn!("Nothing stored - listing table was empty"),
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK");
        }

        Command::Info => {
            let storage = storage_for(&config);
            log::info!("Storage directory: {}", storage.root_dir().display());

            match storage.load_pointer().await? {
                Some(pointer) => log::info!("Last run: {}", pointer.last_modified),
                None => log::info!("No snapshot found yet."),
            }

            if let Some(snapshot) = storage.load_previous().await? {
                let calculator = DiffCalculator::new(&config.filter.target_hours);
                let interesting = snapshot
                    .entities
                    .values()
                    .filter(|kita| calculator.is_interesting(kita))
                    .count();
                if snapshot.is_empty() {
                    log::warn!("Latest snapshot holds no kitas");
                }
                log::info!(
                    "kitas(with_free): {}({})",
                    snapshot.len(),
                    interesting
                );
            }

            log::info!(
                "Snapshot files on disk: {}",
                storage.list_snapshots().await?.len()
            );
        }
    }

    Ok(())
}
