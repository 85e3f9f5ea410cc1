//! Logs command - view and manage the ledger event log

use anyhow::{bail, Result};
use chrono::{TimeZone, Utc};
use clap::Subcommand;
use colored::Colorize;

use crate::output;
use merchstore_core::config::Config;
use merchstore_core::services::LoggingService;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Subcommand)]
pub enum LogsCommands {
    /// Show recent log entries
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Show only rejected or failed operations
        #[arg(long)]
        errors: bool,
    },
    /// Delete old log entries
    Clear {
        /// Delete entries older than N days
        #[arg(long, default_value = "30")]
        older_than_days: u64,
        /// Delete every entry
        #[arg(long, conflicts_with = "older_than_days")]
        all: bool,
    },
    /// Show per-event statistics and the database path
    Stats,
}

fn get_logging_service(config: &Config) -> Result<LoggingService> {
    if !config.event_log {
        bail!("Event log is disabled (logging.eventLog = false)");
    }
    std::fs::create_dir_all(&config.data_dir)?;
    LoggingService::new(&config.data_dir, env!("CARGO_PKG_VERSION"))
}

fn format_timestamp(timestamp_ms: i64) -> String {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| output::format_time(&dt))
        .unwrap_or_else(|| timestamp_ms.to_string())
}

pub fn run(config: &Config, command: LogsCommands, json: bool) -> Result<()> {
    let service = get_logging_service(config)?;

    match command {
        LogsCommands::List { limit, errors } => {
            let entries = if errors {
                service.get_errors(limit)?
            } else {
                service.get_recent(limit)?
            };

            if json {
                return output::print_ok(&entries);
            }

            if entries.is_empty() {
                output::info("No log entries found.");
                return Ok(());
            }

            let mut table = output::create_table();
            table.set_header(vec!["Time", "Event", "Account", "Details", "Outcome"]);

            for entry in &entries {
                let details = [
                    entry.counterparty.as_ref().map(|c| format!("to {}", c)),
                    entry.item.clone(),
                    entry.amount.map(|a| format!("{} coins", a)),
                ]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(", ");

                let outcome = match &entry.error_kind {
                    Some(kind) => kind.red().to_string(),
                    None => "ok".green().to_string(),
                };

                table.add_row(vec![
                    format_timestamp(entry.timestamp),
                    entry.event.clone(),
                    entry.account_id.map(|id| id.to_string()).unwrap_or_default(),
                    details,
                    outcome,
                ]);
            }

            println!("{}", table);

            if !errors {
                let recent_errors: Vec<_> =
                    entries.iter().filter(|e| e.error_kind.is_some()).take(3).collect();
                if !recent_errors.is_empty() {
                    println!();
                    println!("{}", "Recent Errors:".red().bold());
                    for err in recent_errors {
                        println!(
                            "  {} [{}]: {}",
                            format_timestamp(err.timestamp).dimmed(),
                            err.event,
                            err.error_message.as_deref().unwrap_or("Unknown error")
                        );
                    }
                }
            }
        }
        LogsCommands::Clear {
            older_than_days,
            all,
        } => {
            let deleted = if all {
                service.clear()?
            } else {
                let cutoff_ms = Utc::now().timestamp_millis() - older_than_days as i64 * DAY_MS;
                service.delete_before(cutoff_ms)?
            };

            if json {
                return output::print_ok(serde_json::json!({ "deleted": deleted }));
            }
            println!("Deleted {} log entries", deleted);
        }
        LogsCommands::Stats => {
            let stats = service.stats()?;
            let total = service.count()?;
            let db_path = service.db_path().to_path_buf();
            let size_bytes = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

            if json {
                return output::print_ok(serde_json::json!({
                    "total_entries": total,
                    "events": stats,
                    "database_path": db_path.to_string_lossy(),
                    "database_size_bytes": size_bytes
                }));
            }

            println!("{}", "Event Log Statistics".bold());
            println!("  Total entries: {}", total);
            println!("  Database: {}", db_path.display());
            println!("  Size: {} bytes", size_bytes);
            println!();

            if !stats.is_empty() {
                let mut table = output::create_table();
                table.set_header(vec!["Event", "Total", "Errors"]);
                for row in &stats {
                    table.add_row(vec![
                        row.event.clone(),
                        row.total.to_string(),
                        row.errors.to_string(),
                    ]);
                }
                println!("{}", table);
            }
        }
    }

    Ok(())
}
