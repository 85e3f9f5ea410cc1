//! Repository port - ledger storage abstraction
//!
//! The ledger engine only talks to storage through these traits. Every
//! mutation it performs goes through a [`UnitOfWork`], so a transfer's debit,
//! credit and log append either all become visible or none do.

use crate::domain::result::Result;
use crate::domain::{Account, AccountId, Item, NewAccount, NewTransaction, Transaction};

/// Accounts: balance, inventory and credentials
pub trait AccountStore {
    /// Get account by id, `NotFound` if missing
    fn get_account_by_id(&self, id: AccountId) -> Result<Account>;

    /// Get account by unique name, `NotFound` if missing
    fn get_account_by_name(&self, name: &str) -> Result<Account>;

    /// Insert a new account and return its id
    fn create_account(&self, account: &NewAccount) -> Result<AccountId>;

    /// Replace balance and inventory of an existing account
    fn update_account(&self, account: &Account) -> Result<()>;
}

/// Read-only item price lookup
pub trait CatalogLookup {
    /// Get item by name, `NotFound` if missing
    fn get_item_by_name(&self, name: &str) -> Result<Item>;

    /// All items, ordered by name
    fn list_items(&self) -> Result<Vec<Item>>;
}

/// Append-only log of completed transfers
pub trait TransactionLog {
    /// Append a transfer record and return it with its assigned id
    fn append_transaction(&self, tx: &NewTransaction) -> Result<Transaction>;

    /// Transfers where the account is source or destination, newest first
    fn list_transactions_by_user(&self, account_id: AccountId) -> Result<Vec<Transaction>>;
}

/// One storage-level transaction
///
/// Reads through a unit see its own uncommitted writes. Dropping a unit
/// without calling [`UnitOfWork::commit`] rolls everything back.
pub trait UnitOfWork: AccountStore + CatalogLookup + TransactionLog + Send {
    fn commit(self: Box<Self>) -> Result<()>;
}

/// Storage backend: auto-committing reads/writes plus units of work
pub trait Repository: AccountStore + CatalogLookup + TransactionLog + Send + Sync {
    /// Run pending schema migrations
    fn ensure_schema(&self) -> Result<()>;

    /// Start a unit of work
    fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>>;

    /// All accounts, ordered by id (maintenance and consistency checks)
    fn list_accounts(&self) -> Result<Vec<Account>>;

    /// Transfers referencing an account id that does not exist
    fn find_orphaned_transactions(&self) -> Result<Vec<Transaction>>;
}
