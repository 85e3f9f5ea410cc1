//! Merch CLI - spend and send merch store coins from your terminal

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod output;

use commands::{auth, buy, doctor, history, info, items, logs, send, Credentials, Session};
use merchstore_core::config::{Config, LogMode};
use merchstore_core::{Error, OperationResult};

/// Exit status for business rejections (unknown user, not enough coins, ...)
const EXIT_REJECTED: u8 = 1;
/// Exit status for storage, configuration and other internal failures
const EXIT_FAILED: u8 = 2;

/// Merch - coin ledger for the merch store
#[derive(Parser)]
#[command(name = "merch", version, about, long_about = None)]
struct Cli {
    /// Account name to act as (created on first use)
    #[arg(long, short, global = true, env = "MERCH_USER")]
    user: Option<String>,

    /// Account password
    #[arg(long, global = true, env = "MERCH_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in, creating the account on first use
    Auth,

    /// Show coins, inventory and coin history
    Info,

    /// Send coins to another user
    Send {
        /// Recipient account name
        to: String,
        /// Number of coins to send
        #[arg(allow_negative_numbers = true)]
        amount: i64,
    },

    /// Buy one item from the catalog
    Buy {
        /// Item name
        item: String,
    },

    /// Show coin transfers, newest first
    History,

    /// List catalog items and prices
    Items,

    /// Run ledger consistency checks
    Doctor {
        /// Show verbose output
        #[arg(long, short)]
        verbose: bool,
    },

    /// View and manage the event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let json = cli.json;

    match run(cli) {
        Ok(code) => code,
        Err(e) => report_failure(&e, json),
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let data_dir = commands::get_data_dir()?;
    let config = Config::load(&data_dir).context("Failed to load configuration")?;
    init_logging(&config);
    tracing::debug!(data_dir = %data_dir.display(), "configuration loaded");

    let credentials = Credentials {
        user: cli.user,
        password: cli.password,
    };

    let command = match cli.command {
        Commands::Logs { command } => {
            logs::run(&config, command, cli.json)?;
            return Ok(ExitCode::SUCCESS);
        }
        other => other,
    };

    let session = Session::open(config, credentials, cli.json)?;
    match command {
        Commands::Auth => auth::run(&session)?,
        Commands::Info => info::run(&session)?,
        Commands::Send { to, amount } => send::run(&session, &to, amount)?,
        Commands::Buy { item } => buy::run(&session, &item)?,
        Commands::History => history::run(&session)?,
        Commands::Items => items::run(&session)?,
        Commands::Doctor { verbose } => {
            if !doctor::run(&session, verbose)? {
                return Ok(ExitCode::from(EXIT_REJECTED));
            }
        }
        Commands::Logs { .. } => {}
    }

    Ok(ExitCode::SUCCESS)
}

/// Install the process logger
///
/// `RUST_LOG` wins over the configured level. Logs go to stderr so command
/// output on stdout stays parseable.
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    match config.log_mode {
        LogMode::Json => registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .init(),
        LogMode::Text => registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init(),
    }
}

/// Print an error and pick the exit status from its kind
fn report_failure(e: &anyhow::Error, json: bool) -> ExitCode {
    let core_error = e.downcast_ref::<Error>();

    if json {
        let result: OperationResult<()> = match core_error {
            Some(err) => OperationResult::fail(err),
            None => OperationResult {
                success: false,
                data: None,
                error: Some(format!("{:#}", e)),
                error_kind: None,
                context: None,
            },
        };
        if output::print_json(&result).is_err() {
            output::error(&format!("{:#}", e));
        }
    } else {
        output::error(&format!("{:#}", e));
    }

    match core_error {
        Some(err) if err.is_rejection() => ExitCode::from(EXIT_REJECTED),
        _ => ExitCode::from(EXIT_FAILED),
    }
}
