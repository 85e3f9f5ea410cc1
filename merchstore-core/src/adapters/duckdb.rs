//! DuckDB repository implementation

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use duckdb::{params, Connection, OptionalExt};

use crate::domain::result::{Error, Result};
use crate::domain::{
    Account, AccountId, Inventory, Item, NewAccount, NewTransaction, Transaction,
};
use crate::ports::{AccountStore, CatalogLookup, Repository, TransactionLog, UnitOfWork};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Timestamp layout written to and read from TIMESTAMP columns
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

/// DuckDB repository implementation
///
/// Auto-committing operations share one connection behind a mutex. Each unit
/// of work gets its own cloned connection, so units run their storage
/// transactions independently of each other.
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl DuckDbRepository {
    /// Open (or create) a database file
    ///
    /// Includes retry logic with exponential backoff for file locking errors,
    /// which occur when another process briefly holds the file.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            delay_ms = delay.as_millis() as u64,
                            attempt = attempt + 1,
                            max_retries = MAX_RETRIES,
                            error = %err_msg,
                            "database busy, retrying"
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::storage(format!("Failed to open database after {} retries", MAX_RETRIES))
        }))
    }

    /// Open a private in-memory database (tests, dry runs)
    pub fn open_in_memory() -> Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_in_memory_with_flags(config)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
        })
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Extension autoloading stays off; nothing here needs one
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::storage(format!("Lock poisoned: {}", e)))
    }

    /// Path of the database file, `None` for in-memory databases
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Run database migrations using the MigrationService
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.lock()?;
        MigrationService::new(&conn).run_pending()
    }

    /// Insert or reprice a catalog item
    ///
    /// Catalog data is reference data owned outside the ledger; this exists
    /// for seeding and tests and is not part of the ledger ports.
    pub fn seed_item(&self, item: &Item) -> Result<()> {
        item.validate()?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO items (name, price) VALUES (?, ?)
             ON CONFLICT (name) DO UPDATE SET price = EXCLUDED.price",
            params![item.name, item.price],
        )?;
        Ok(())
    }

    /// Total number of logged transfers
    pub fn count_transactions(&self) -> Result<i64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl AccountStore for DuckDbRepository {
    fn get_account_by_id(&self, id: AccountId) -> Result<Account> {
        select_account_by_id(&*self.lock()?, id)
    }

    fn get_account_by_name(&self, name: &str) -> Result<Account> {
        select_account_by_name(&*self.lock()?, name)
    }

    fn create_account(&self, account: &NewAccount) -> Result<AccountId> {
        insert_account(&*self.lock()?, account)
    }

    fn update_account(&self, account: &Account) -> Result<()> {
        write_account(&*self.lock()?, account)
    }
}

impl CatalogLookup for DuckDbRepository {
    fn get_item_by_name(&self, name: &str) -> Result<Item> {
        select_item(&*self.lock()?, name)
    }

    fn list_items(&self) -> Result<Vec<Item>> {
        select_items(&*self.lock()?)
    }
}

impl TransactionLog for DuckDbRepository {
    fn append_transaction(&self, tx: &NewTransaction) -> Result<Transaction> {
        insert_transaction(&*self.lock()?, tx)
    }

    fn list_transactions_by_user(&self, account_id: AccountId) -> Result<Vec<Transaction>> {
        select_transactions_by_user(&*self.lock()?, account_id)
    }
}

impl Repository for DuckDbRepository {
    fn ensure_schema(&self) -> Result<()> {
        let result = self.run_migrations()?;
        if !result.applied.is_empty() {
            tracing::info!(applied = ?result.applied, "applied ledger migrations");
        }
        Ok(())
    }

    fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>> {
        let conn = self.lock()?.try_clone()?;
        Ok(Box::new(DuckDbUnit::begin(conn)?))
    }

    fn list_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, password_hash, coins, inventory FROM accounts ORDER BY id",
        )?;
        let rows = stmt.query_map([], row_to_account_parts)?;

        let mut accounts = Vec::new();
        for row in rows {
            accounts.push(account_from_parts(row?)?);
        }
        Ok(accounts)
    }

    fn find_orphaned_transactions(&self) -> Result<Vec<Transaction>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT t.id, t.from_account, t.to_account, t.amount, t.created_at::VARCHAR
             FROM transactions t
             WHERE NOT EXISTS (SELECT 1 FROM accounts a WHERE a.id = t.from_account)
                OR NOT EXISTS (SELECT 1 FROM accounts a WHERE a.id = t.to_account)
             ORDER BY t.id",
        )?;
        collect_transactions(stmt.query_map([], row_to_transaction_parts)?)
    }
}

/// A storage transaction on a dedicated connection
///
/// Rolled back on drop unless committed.
struct DuckDbUnit {
    conn: Connection,
    finished: bool,
}

impl DuckDbUnit {
    fn begin(conn: Connection) -> Result<Self> {
        conn.execute_batch("BEGIN TRANSACTION")?;
        Ok(Self {
            conn,
            finished: false,
        })
    }
}

impl Drop for DuckDbUnit {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                tracing::warn!(error = %e, "rollback of unit of work failed");
            }
        }
    }
}

impl UnitOfWork for DuckDbUnit {
    fn commit(mut self: Box<Self>) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }
}

impl AccountStore for DuckDbUnit {
    fn get_account_by_id(&self, id: AccountId) -> Result<Account> {
        select_account_by_id(&self.conn, id)
    }

    fn get_account_by_name(&self, name: &str) -> Result<Account> {
        select_account_by_name(&self.conn, name)
    }

    fn create_account(&self, account: &NewAccount) -> Result<AccountId> {
        insert_account(&self.conn, account)
    }

    fn update_account(&self, account: &Account) -> Result<()> {
        write_account(&self.conn, account)
    }
}

impl CatalogLookup for DuckDbUnit {
    fn get_item_by_name(&self, name: &str) -> Result<Item> {
        select_item(&self.conn, name)
    }

    fn list_items(&self) -> Result<Vec<Item>> {
        select_items(&self.conn)
    }
}

impl TransactionLog for DuckDbUnit {
    fn append_transaction(&self, tx: &NewTransaction) -> Result<Transaction> {
        insert_transaction(&self.conn, tx)
    }

    fn list_transactions_by_user(&self, account_id: AccountId) -> Result<Vec<Transaction>> {
        select_transactions_by_user(&self.conn, account_id)
    }
}

// === Queries shared by the repository and its units ===

type AccountParts = (i64, String, String, i64, String);
type TransactionParts = (i64, i64, i64, i64, String);

fn row_to_account_parts(row: &duckdb::Row) -> duckdb::Result<AccountParts> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn account_from_parts(parts: AccountParts) -> Result<Account> {
    let (id, name, password_hash, coins, inventory_json) = parts;
    let inventory: Inventory = serde_json::from_str(&inventory_json)
        .map_err(|e| Error::storage(format!("corrupt inventory for account {}: {}", id, e)))?;
    Ok(Account {
        id,
        name,
        password_hash,
        coins,
        inventory,
    })
}

fn select_account_by_id(conn: &Connection, id: AccountId) -> Result<Account> {
    let parts = conn
        .query_row(
            "SELECT id, name, password_hash, coins, inventory FROM accounts WHERE id = ?",
            params![id],
            row_to_account_parts,
        )
        .optional()?
        .ok_or_else(|| Error::not_found(format!("account {}", id)))?;
    account_from_parts(parts)
}

fn select_account_by_name(conn: &Connection, name: &str) -> Result<Account> {
    let parts = conn
        .query_row(
            "SELECT id, name, password_hash, coins, inventory FROM accounts WHERE name = ?",
            params![name],
            row_to_account_parts,
        )
        .optional()?
        .ok_or_else(|| Error::not_found(format!("account '{}'", name)))?;
    account_from_parts(parts)
}

fn insert_account(conn: &Connection, account: &NewAccount) -> Result<AccountId> {
    account.validate()?;
    let id: i64 = conn.query_row(
        "INSERT INTO accounts (name, password_hash, coins, inventory)
         VALUES (?, ?, ?, '{}')
         RETURNING id",
        params![account.name, account.password_hash, account.coins],
        |row| row.get(0),
    )?;
    Ok(id)
}

fn write_account(conn: &Connection, account: &Account) -> Result<()> {
    let inventory_json = serde_json::to_string(&account.inventory)?;
    let updated = conn.execute(
        "UPDATE accounts SET coins = ?, inventory = ? WHERE id = ?",
        params![account.coins, inventory_json, account.id],
    )?;
    if updated == 0 {
        return Err(Error::not_found(format!("account {}", account.id)));
    }
    Ok(())
}

fn select_item(conn: &Connection, name: &str) -> Result<Item> {
    conn.query_row(
        "SELECT name, price FROM items WHERE name = ?",
        params![name],
        |row| Ok(Item::new(row.get::<_, String>(0)?, row.get(1)?)),
    )
    .optional()?
    .ok_or_else(|| Error::not_found(format!("item '{}'", name)))
}

fn select_items(conn: &Connection) -> Result<Vec<Item>> {
    let mut stmt = conn.prepare("SELECT name, price FROM items ORDER BY name")?;
    let rows = stmt.query_map([], |row| Ok(Item::new(row.get::<_, String>(0)?, row.get(1)?)))?;

    let mut items = Vec::new();
    for item in rows {
        items.push(item?);
    }
    Ok(items)
}

fn insert_transaction(conn: &Connection, tx: &NewTransaction) -> Result<Transaction> {
    tx.validate()?;
    let created_at = tx.created_at.format(TIMESTAMP_FORMAT).to_string();
    let id: i64 = conn.query_row(
        "INSERT INTO transactions (from_account, to_account, amount, created_at)
         VALUES (?, ?, ?, CAST(? AS TIMESTAMP))
         RETURNING id",
        params![tx.from_account, tx.to_account, tx.amount, created_at],
        |row| row.get(0),
    )?;
    Ok(tx.clone().into_transaction(id))
}

fn select_transactions_by_user(conn: &Connection, account_id: AccountId) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(
        "SELECT id, from_account, to_account, amount, created_at::VARCHAR
         FROM transactions
         WHERE from_account = ? OR to_account = ?
         ORDER BY created_at DESC, id DESC",
    )?;
    collect_transactions(stmt.query_map(params![account_id, account_id], row_to_transaction_parts)?)
}

fn row_to_transaction_parts(row: &duckdb::Row) -> duckdb::Result<TransactionParts> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn collect_transactions<I>(rows: I) -> Result<Vec<Transaction>>
where
    I: Iterator<Item = duckdb::Result<TransactionParts>>,
{
    let mut transactions = Vec::new();
    for row in rows {
        let (id, from_account, to_account, amount, created_at) = row?;
        transactions.push(Transaction {
            id,
            from_account,
            to_account,
            amount,
            created_at: parse_timestamp(&created_at)?,
        });
    }
    Ok(transactions)
}

/// Parse a TIMESTAMP rendered as VARCHAR; DuckDB drops the fraction when it is zero
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .map_err(|e| Error::storage(format!("invalid timestamp '{}': {}", s, e)))?;
    Ok(Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn repo() -> DuckDbRepository {
        let repo = DuckDbRepository::open_in_memory().unwrap();
        repo.ensure_schema().unwrap();
        repo
    }

    fn create(repo: &DuckDbRepository, name: &str, coins: i64) -> AccountId {
        repo.create_account(&NewAccount::new(name, "hash", coins)).unwrap()
    }

    #[test]
    fn test_parse_timestamp_with_and_without_fraction() {
        let with = parse_timestamp("2025-02-10 12:30:45.123456").unwrap();
        assert_eq!(with.nanosecond(), 123_456_000);

        let without = parse_timestamp("2025-02-10 12:30:45").unwrap();
        assert_eq!(without.nanosecond(), 0);

        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_is_retryable_error() {
        assert!(is_retryable_error("IO Error: Database is locked"));
        assert!(is_retryable_error("Resource temporarily unavailable"));
        assert!(!is_retryable_error("Catalog Error: Table does not exist"));
    }

    #[test]
    fn test_account_round_trip() {
        let repo = repo();
        let id = create(&repo, "alice", 100);

        let mut account = repo.get_account_by_name("alice").unwrap();
        assert_eq!(account.id, id);
        assert_eq!(account.coins, 100);
        assert!(account.inventory.is_empty());

        account.coins = 80;
        account.inventory.add("cup", 1);
        repo.update_account(&account).unwrap();

        let reloaded = repo.get_account_by_id(id).unwrap();
        assert_eq!(reloaded.coins, 80);
        assert_eq!(reloaded.inventory.quantity("cup"), 1);
    }

    #[test]
    fn test_missing_rows_are_not_found() {
        let repo = repo();
        assert!(matches!(repo.get_account_by_id(42), Err(Error::NotFound(_))));
        assert!(matches!(repo.get_account_by_name("ghost"), Err(Error::NotFound(_))));
        assert!(matches!(repo.get_item_by_name("yacht"), Err(Error::NotFound(_))));

        let ghost = Account {
            id: 42,
            name: "ghost".to_string(),
            password_hash: String::new(),
            coins: 0,
            inventory: Inventory::new(),
        };
        assert!(matches!(repo.update_account(&ghost), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let repo = repo();
        create(&repo, "alice", 100);
        assert!(repo.create_account(&NewAccount::new("alice", "h", 5)).is_err());
    }

    #[test]
    fn test_negative_balance_blocked_by_schema() {
        let repo = repo();
        let id = create(&repo, "alice", 10);
        let mut account = repo.get_account_by_id(id).unwrap();
        account.coins = -1;
        assert!(matches!(repo.update_account(&account), Err(Error::Storage(_))));
        assert_eq!(repo.get_account_by_id(id).unwrap().coins, 10);
    }

    #[test]
    fn test_seed_item_reprices() {
        let repo = repo();
        repo.seed_item(&Item::new("cup", 50)).unwrap();
        assert_eq!(repo.get_item_by_name("cup").unwrap().price, 50);

        repo.seed_item(&Item::new("sticker", 1)).unwrap();
        let names: Vec<String> = repo.list_items().unwrap().into_iter().map(|i| i.name).collect();
        assert!(names.contains(&"sticker".to_string()));
        assert!(names.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_transactions_listed_newest_first() {
        let repo = repo();
        let a = create(&repo, "a", 100);
        let b = create(&repo, "b", 100);
        let c = create(&repo, "c", 100);

        let first = repo.append_transaction(&NewTransaction::new(a, b, 5)).unwrap();
        let second = repo.append_transaction(&NewTransaction::new(b, a, 7)).unwrap();
        repo.append_transaction(&NewTransaction::new(b, c, 9)).unwrap();

        let for_a = repo.list_transactions_by_user(a).unwrap();
        let ids: Vec<i64> = for_a.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert_eq!(for_a[1].created_at, first.created_at);

        assert!(repo.list_transactions_by_user(999).unwrap().is_empty());
    }

    #[test]
    fn test_unit_rolls_back_on_drop() {
        let repo = repo();
        let a = create(&repo, "a", 100);
        let b = create(&repo, "b", 0);

        {
            let unit = repo.begin().unwrap();
            let mut from = unit.get_account_by_id(a).unwrap();
            from.coins -= 40;
            unit.update_account(&from).unwrap();
            unit.append_transaction(&NewTransaction::new(a, b, 40)).unwrap();

            // Own writes are visible inside the unit
            assert_eq!(unit.get_account_by_id(a).unwrap().coins, 60);
        }

        assert_eq!(repo.get_account_by_id(a).unwrap().coins, 100);
        assert_eq!(repo.count_transactions().unwrap(), 0);
    }

    #[test]
    fn test_unit_commit_is_visible() {
        let repo = repo();
        let a = create(&repo, "a", 100);
        let b = create(&repo, "b", 0);

        let unit = repo.begin().unwrap();
        let mut to = unit.get_account_by_id(b).unwrap();
        to.coins += 40;
        unit.update_account(&to).unwrap();
        unit.append_transaction(&NewTransaction::new(a, b, 40)).unwrap();
        unit.commit().unwrap();

        assert_eq!(repo.get_account_by_id(b).unwrap().coins, 40);
        assert_eq!(repo.count_transactions().unwrap(), 1);
    }

    #[test]
    fn test_orphaned_transactions_detected() {
        let repo = repo();
        let a = create(&repo, "a", 100);
        repo.append_transaction(&NewTransaction::new(a, 777, 1)).unwrap();

        let orphans = repo.find_orphaned_transactions().unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].to_account, 777);
    }
}
