//! In-memory repository and event sink
//!
//! Mirrors the DuckDB adapter's semantics without touching disk: units of
//! work stage their writes and apply them under the state lock on commit.
//! Failure switches let tests break an append or a commit on purpose.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::domain::result::{Error, Result};
use crate::domain::transaction::sort_newest_first;
use crate::domain::{
    Account, AccountId, Inventory, Item, NewAccount, NewTransaction, Transaction,
};
use crate::ports::{
    AccountStore, CatalogLookup, EventSink, LedgerEvent, Repository, TransactionLog, UnitOfWork,
};

#[derive(Debug, Default)]
struct MemoryState {
    accounts: BTreeMap<AccountId, Account>,
    items: BTreeMap<String, Item>,
    transactions: Vec<Transaction>,
}

/// Repository backed by process memory
#[derive(Debug)]
pub struct MemoryRepository {
    state: Mutex<MemoryState>,
    next_account_id: AtomicI64,
    next_transaction_id: AtomicI64,
    fail_next_append: AtomicBool,
    fail_next_commit: AtomicBool,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            next_account_id: AtomicI64::new(1),
            next_transaction_id: AtomicI64::new(1),
            fail_next_append: AtomicBool::new(false),
            fail_next_commit: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|e| Error::storage(format!("Lock poisoned: {}", e)))
    }

    /// Insert or reprice a catalog item
    pub fn seed_item(&self, item: &Item) -> Result<()> {
        item.validate()?;
        self.lock()?.items.insert(item.name.clone(), item.clone());
        Ok(())
    }

    /// Make the next transaction append fail with a storage error
    pub fn fail_next_append(&self) {
        self.fail_next_append.store(true, Ordering::SeqCst);
    }

    /// Make the next unit commit fail with a storage error
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Sum of all balances
    pub fn total_coins(&self) -> Result<i64> {
        Ok(self.lock()?.accounts.values().map(|a| a.coins).sum())
    }

    pub fn count_transactions(&self) -> Result<usize> {
        Ok(self.lock()?.transactions.len())
    }

    fn take_append_failure(&self) -> Result<()> {
        if self.fail_next_append.swap(false, Ordering::SeqCst) {
            return Err(Error::storage("injected append failure"));
        }
        Ok(())
    }

    fn allocate_transaction(&self, tx: &NewTransaction) -> Result<Transaction> {
        tx.validate()?;
        self.take_append_failure()?;
        let id = self.next_transaction_id.fetch_add(1, Ordering::SeqCst);
        Ok(tx.clone().into_transaction(id))
    }

    fn build_account(&self, account: &NewAccount) -> Result<Account> {
        account.validate()?;
        Ok(Account {
            id: self.next_account_id.fetch_add(1, Ordering::SeqCst),
            name: account.name.clone(),
            password_hash: account.password_hash.clone(),
            coins: account.coins,
            inventory: Inventory::new(),
        })
    }
}

fn name_taken(state: &MemoryState, name: &str) -> bool {
    state.accounts.values().any(|a| a.name == name)
}

fn check_balance(account: &Account) -> Result<()> {
    if account.coins < 0 {
        return Err(Error::storage(format!(
            "balance of account {} would become negative",
            account.id
        )));
    }
    Ok(())
}

fn transactions_for(transactions: &[Transaction], account_id: AccountId) -> Vec<Transaction> {
    let mut matching: Vec<Transaction> = transactions
        .iter()
        .filter(|t| t.involves(account_id))
        .cloned()
        .collect();
    sort_newest_first(&mut matching);
    matching
}

impl AccountStore for MemoryRepository {
    fn get_account_by_id(&self, id: AccountId) -> Result<Account> {
        self.lock()?
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("account {}", id)))
    }

    fn get_account_by_name(&self, name: &str) -> Result<Account> {
        self.lock()?
            .accounts
            .values()
            .find(|a| a.name == name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("account '{}'", name)))
    }

    fn create_account(&self, account: &NewAccount) -> Result<AccountId> {
        let mut state = self.lock()?;
        if name_taken(&state, &account.name) {
            return Err(Error::storage(format!(
                "duplicate account name '{}'",
                account.name
            )));
        }
        let created = self.build_account(account)?;
        let id = created.id;
        state.accounts.insert(id, created);
        Ok(id)
    }

    fn update_account(&self, account: &Account) -> Result<()> {
        check_balance(account)?;
        let mut state = self.lock()?;
        match state.accounts.get_mut(&account.id) {
            Some(stored) => {
                stored.coins = account.coins;
                stored.inventory = account.inventory.clone();
                Ok(())
            }
            None => Err(Error::not_found(format!("account {}", account.id))),
        }
    }
}

impl CatalogLookup for MemoryRepository {
    fn get_item_by_name(&self, name: &str) -> Result<Item> {
        self.lock()?
            .items
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("item '{}'", name)))
    }

    fn list_items(&self) -> Result<Vec<Item>> {
        Ok(self.lock()?.items.values().cloned().collect())
    }
}

impl TransactionLog for MemoryRepository {
    fn append_transaction(&self, tx: &NewTransaction) -> Result<Transaction> {
        let transaction = self.allocate_transaction(tx)?;
        self.lock()?.transactions.push(transaction.clone());
        Ok(transaction)
    }

    fn list_transactions_by_user(&self, account_id: AccountId) -> Result<Vec<Transaction>> {
        Ok(transactions_for(&self.lock()?.transactions, account_id))
    }
}

impl Repository for MemoryRepository {
    fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>> {
        Ok(Box::new(MemoryUnit {
            repo: self,
            staged: Mutex::new(Staged::default()),
        }))
    }

    fn list_accounts(&self) -> Result<Vec<Account>> {
        Ok(self.lock()?.accounts.values().cloned().collect())
    }

    fn find_orphaned_transactions(&self) -> Result<Vec<Transaction>> {
        let state = self.lock()?;
        Ok(state
            .transactions
            .iter()
            .filter(|t| {
                !state.accounts.contains_key(&t.from_account)
                    || !state.accounts.contains_key(&t.to_account)
            })
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
struct Staged {
    created: Vec<Account>,
    updated: HashMap<AccountId, Account>,
    transactions: Vec<Transaction>,
}

impl Staged {
    fn account(&self, id: AccountId) -> Option<&Account> {
        self.updated
            .get(&id)
            .or_else(|| self.created.iter().find(|a| a.id == id))
    }
}

/// Writes staged until commit
struct MemoryUnit<'a> {
    repo: &'a MemoryRepository,
    staged: Mutex<Staged>,
}

impl MemoryUnit<'_> {
    fn staged(&self) -> Result<MutexGuard<'_, Staged>> {
        self.staged
            .lock()
            .map_err(|e| Error::storage(format!("Lock poisoned: {}", e)))
    }
}

impl AccountStore for MemoryUnit<'_> {
    fn get_account_by_id(&self, id: AccountId) -> Result<Account> {
        if let Some(account) = self.staged()?.account(id) {
            return Ok(account.clone());
        }
        self.repo.get_account_by_id(id)
    }

    fn get_account_by_name(&self, name: &str) -> Result<Account> {
        let committed = match self.repo.get_account_by_name(name) {
            Ok(account) => Some(account),
            Err(Error::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        let staged = self.staged()?;
        if let Some(account) = committed {
            return Ok(staged.account(account.id).cloned().unwrap_or(account));
        }
        staged
            .created
            .iter()
            .find(|a| a.name == name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("account '{}'", name)))
    }

    fn create_account(&self, account: &NewAccount) -> Result<AccountId> {
        let taken = name_taken(&*self.repo.lock()?, &account.name);
        let mut staged = self.staged()?;
        if taken || staged.created.iter().any(|a| a.name == account.name) {
            return Err(Error::storage(format!(
                "duplicate account name '{}'",
                account.name
            )));
        }
        let created = self.repo.build_account(account)?;
        let id = created.id;
        staged.created.push(created);
        Ok(id)
    }

    fn update_account(&self, account: &Account) -> Result<()> {
        check_balance(account)?;
        // Fails with NotFound for unknown ids
        let mut current = self.get_account_by_id(account.id)?;
        current.coins = account.coins;
        current.inventory = account.inventory.clone();

        let mut staged = self.staged()?;
        if let Some(created) = staged.created.iter_mut().find(|a| a.id == account.id) {
            *created = current;
        } else {
            staged.updated.insert(account.id, current);
        }
        Ok(())
    }
}

impl CatalogLookup for MemoryUnit<'_> {
    fn get_item_by_name(&self, name: &str) -> Result<Item> {
        self.repo.get_item_by_name(name)
    }

    fn list_items(&self) -> Result<Vec<Item>> {
        self.repo.list_items()
    }
}

impl TransactionLog for MemoryUnit<'_> {
    fn append_transaction(&self, tx: &NewTransaction) -> Result<Transaction> {
        let transaction = self.repo.allocate_transaction(tx)?;
        self.staged()?.transactions.push(transaction.clone());
        Ok(transaction)
    }

    fn list_transactions_by_user(&self, account_id: AccountId) -> Result<Vec<Transaction>> {
        let mut all = self.repo.lock()?.transactions.clone();
        all.extend(self.staged()?.transactions.iter().cloned());
        Ok(transactions_for(&all, account_id))
    }
}

impl UnitOfWork for MemoryUnit<'_> {
    fn commit(self: Box<Self>) -> Result<()> {
        let unit = *self;
        if unit.repo.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(Error::storage("injected commit failure"));
        }

        let staged = unit
            .staged
            .into_inner()
            .map_err(|e| Error::storage(format!("Lock poisoned: {}", e)))?;
        let mut state = unit.repo.lock()?;

        // Validate everything before touching state so a failed commit applies nothing
        for created in &staged.created {
            if name_taken(&state, &created.name) {
                return Err(Error::storage(format!(
                    "duplicate account name '{}'",
                    created.name
                )));
            }
        }
        for id in staged.updated.keys() {
            if !state.accounts.contains_key(id) {
                return Err(Error::not_found(format!("account {}", id)));
            }
        }

        for created in staged.created {
            state.accounts.insert(created.id, created);
        }
        for (id, account) in staged.updated {
            state.accounts.insert(id, account);
        }
        state.transactions.extend(staged.transactions);
        Ok(())
    }
}

/// Event sink that keeps every event in memory
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<LedgerEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LedgerEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Event names in emission order
    pub fn names(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.event).collect()
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: &LedgerEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
