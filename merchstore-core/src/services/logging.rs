//! Logging service - persistent ledger event log in DuckDB
//!
//! Stores every [`LedgerEvent`] in `logs.duckdb`, separate from the ledger
//! database, so the history of operations (including rejected ones) can be
//! inspected after the fact. Credentials are never written here.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use chrono::Utc;
use duckdb::Connection;
use serde::{Deserialize, Serialize};

use crate::log_migrations::LOG_MIGRATIONS;
use crate::ports::{EventSink, LedgerEvent};
use crate::services::MigrationService;

/// Counter for generating unique IDs within the same millisecond
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique ID based on timestamp + counter
fn generate_id(timestamp_ms: i64) -> u64 {
    // Lower 16 bits hold the counter (65536 unique IDs per millisecond)
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed) & 0xFFFF;
    ((timestamp_ms.max(0) as u64) << 16) | counter
}

const ENTRY_COLUMNS: &str = "id, timestamp, operation_id, app_version, event, account_id, \
     counterparty, item, amount, error_kind, error_message";

/// A log entry as stored in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    /// Unix milliseconds
    pub timestamp: i64,
    pub operation_id: String,
    pub app_version: String,
    pub event: String,
    pub account_id: Option<i64>,
    pub counterparty: Option<String>,
    pub item: Option<String>,
    pub amount: Option<i64>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
}

impl LogEntry {
    fn from_row(row: &duckdb::Row) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            operation_id: row.get(2)?,
            app_version: row.get(3)?,
            event: row.get(4)?,
            account_id: row.get(5)?,
            counterparty: row.get(6)?,
            item: row.get(7)?,
            amount: row.get(8)?,
            error_kind: row.get(9)?,
            error_message: row.get(10)?,
        })
    }
}

/// Per-event totals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStats {
    pub event: String,
    pub total: u64,
    pub errors: u64,
}

/// Service for persistent event logging
///
/// Implements [`EventSink`]; a write failure is reported through `tracing`
/// and never reaches the ledger operation that produced the event.
pub struct LoggingService {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    app_version: String,
}

impl LoggingService {
    /// Open or create logs.duckdb in the data directory and run any pending
    /// log migrations
    pub fn new(data_dir: &Path, app_version: impl Into<String>) -> Result<Self> {
        let db_path = data_dir.join("logs.duckdb");
        let conn = Connection::open(&db_path)?;
        MigrationService::with_migrations(&conn, LOG_MIGRATIONS).run_pending()?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
            app_version: app_version.into(),
        })
    }

    /// Record one event
    pub fn log(&self, event: &LedgerEvent) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;
        let timestamp = event.timestamp.timestamp_millis();

        conn.execute(
            &format!(
                "INSERT INTO sys_logs ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                ENTRY_COLUMNS
            ),
            duckdb::params![
                generate_id(timestamp),
                timestamp,
                event.operation_id.to_string(),
                &self.app_version,
                &event.event,
                event.account_id,
                &event.counterparty,
                &event.item,
                event.amount,
                event.error_kind.map(|k| k.as_str()),
                &event.error_message,
            ],
        )?;

        Ok(())
    }

    fn query(&self, filter: &str, limit: usize) -> Result<Vec<LogEntry>> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sys_logs {} ORDER BY timestamp DESC, id DESC LIMIT ?",
            ENTRY_COLUMNS, filter
        ))?;
        let rows = stmt.query_map([limit as i64], LogEntry::from_row)?;

        let mut entries = Vec::new();
        for entry in rows {
            entries.push(entry?);
        }
        Ok(entries)
    }

    /// Most recent entries, newest first
    pub fn get_recent(&self, limit: usize) -> Result<Vec<LogEntry>> {
        self.query("", limit)
    }

    /// Most recent failed or rejected operations
    pub fn get_errors(&self, limit: usize) -> Result<Vec<LogEntry>> {
        self.query("WHERE error_kind IS NOT NULL", limit)
    }

    /// Totals per event name
    pub fn stats(&self) -> Result<Vec<EventStats>> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;
        let mut stmt = conn.prepare(
            "SELECT event, COUNT(*), COUNT(error_kind)
             FROM sys_logs
             GROUP BY event
             ORDER BY event",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(EventStats {
                event: row.get(0)?,
                total: row.get::<_, i64>(1)? as u64,
                errors: row.get::<_, i64>(2)? as u64,
            })
        })?;

        let mut stats = Vec::new();
        for row in rows {
            stats.push(row?);
        }
        Ok(stats)
    }

    /// Get the total number of log entries
    pub fn count(&self) -> Result<u64> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sys_logs", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Delete logs older than the specified timestamp (unix ms)
    pub fn delete_before(&self, timestamp_ms: i64) -> Result<u64> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;
        let deleted = conn.execute("DELETE FROM sys_logs WHERE timestamp < ?", [timestamp_ms])?;
        Ok(deleted as u64)
    }

    /// Delete every entry
    pub fn clear(&self) -> Result<u64> {
        self.delete_before(Utc::now().timestamp_millis() + 1)
    }

    /// Get the path to the logs database
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

impl EventSink for LoggingService {
    fn emit(&self, event: &LedgerEvent) {
        if let Err(e) = self.log(event) {
            tracing::warn!(event = %event.event, error = %e, "failed to persist ledger event");
        }
    }
}
