//! Ledger service - coin transfers, purchases and history
//!
//! Every mutation runs under the gates of the accounts it touches and inside
//! one storage unit of work. Balances are re-read and re-validated inside the
//! unit, so a check made before the gates were taken is never trusted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{
    AccountId, AccountSnapshot, CoinHistory, Direction, Item, NewTransaction, Transaction,
    TransactionView,
};
use crate::ports::{EventSink, LedgerEvent, Repository};
use crate::services::gate::AccountGates;

/// Default bound on one ledger operation, gate waits included
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_millis(5000);

pub const EVENT_TRANSFER: &str = "transfer_coins";
pub const EVENT_BUY: &str = "buy_item";
pub const EVENT_LIST_TRANSACTIONS: &str = "list_transactions";
pub const EVENT_COIN_HISTORY: &str = "coin_history";
pub const EVENT_SNAPSHOT: &str = "account_snapshot";

/// Deadline and cancellation state consulted between unit steps
#[derive(Debug, Clone)]
struct Checkpoint {
    deadline: std::time::Instant,
    cancelled: Arc<AtomicBool>,
}

impl Checkpoint {
    fn check(&self) -> Result<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(Error::Cancelled);
        }
        if std::time::Instant::now() >= self.deadline {
            return Err(Error::Timeout);
        }
        Ok(())
    }
}

/// One in-flight operation
///
/// Dropping the scope before [`OperationScope::finish`] means the caller gave
/// up on the operation; the unit of work sees the raised flag at its next
/// checkpoint and rolls back.
struct OperationScope {
    id: Uuid,
    deadline: Instant,
    cancelled: Arc<AtomicBool>,
    finished: bool,
}

impl OperationScope {
    fn start(timeout: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            deadline: Instant::now() + timeout,
            cancelled: Arc::new(AtomicBool::new(false)),
            finished: false,
        }
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            deadline: self.deadline.into_std(),
            cancelled: self.cancelled.clone(),
        }
    }

    fn event(&self, name: &str) -> LedgerEvent {
        LedgerEvent::new(name).with_operation_id(self.id)
    }

    fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for OperationScope {
    fn drop(&mut self) {
        if !self.finished {
            self.cancelled.store(true, Ordering::SeqCst);
        }
    }
}

fn report<T>(events: &dyn EventSink, event: LedgerEvent, result: &Result<T>) {
    let event = match result {
        Ok(_) => event,
        Err(e) => event.with_error(e),
    };
    events.emit(&event);
}

/// Debit, credit and log one transfer inside a single unit of work
fn transfer_in_unit<R: Repository + ?Sized>(
    repo: &R,
    from_id: AccountId,
    to_id: AccountId,
    amount: i64,
    checkpoint: &Checkpoint,
) -> Result<Transaction> {
    checkpoint.check()?;
    let unit = repo.begin()?;

    let mut from = unit.get_account_by_id(from_id)?;
    let mut to = unit.get_account_by_id(to_id)?;
    if from.id == to.id {
        return Err(Error::SelfTransfer);
    }
    if amount <= 0 {
        return Err(Error::InvalidAmount(amount));
    }
    from.debit(amount)?;
    to.credit(amount)?;

    checkpoint.check()?;
    unit.update_account(&from)?;
    unit.update_account(&to)?;
    let transaction = unit.append_transaction(&NewTransaction::new(from.id, to.id, amount))?;

    checkpoint.check()?;
    unit.commit()?;
    Ok(transaction)
}

/// Charge the item price and add one unit to the inventory
fn buy_in_unit<R: Repository + ?Sized>(
    repo: &R,
    user_id: AccountId,
    item: &Item,
    checkpoint: &Checkpoint,
) -> Result<()> {
    checkpoint.check()?;
    let unit = repo.begin()?;

    let mut account = unit.get_account_by_id(user_id)?;
    account.debit(item.price)?;
    account.inventory.add(&item.name, 1);

    checkpoint.check()?;
    unit.update_account(&account)?;

    checkpoint.check()?;
    unit.commit()
}

fn split_history(account_id: AccountId, transactions: &[Transaction]) -> CoinHistory {
    let mut history = CoinHistory::default();
    for view in transactions.iter().filter_map(|t| t.view_for(account_id)) {
        match view.direction {
            Direction::Received => history.received.push(view),
            Direction::Sent => history.sent.push(view),
        }
    }
    history
}

/// Service for moving coins between accounts and into merchandise
pub struct LedgerService<R: Repository + 'static> {
    repo: Arc<R>,
    events: Arc<dyn EventSink>,
    gates: Arc<AccountGates>,
    prices: Arc<DashMap<String, Item>>,
    operation_timeout: Duration,
}

impl<R: Repository + 'static> Clone for LedgerService<R> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            events: self.events.clone(),
            gates: self.gates.clone(),
            prices: self.prices.clone(),
            operation_timeout: self.operation_timeout,
        }
    }
}

impl<R: Repository + 'static> LedgerService<R> {
    pub fn new(repo: Arc<R>, events: Arc<dyn EventSink>) -> Self {
        Self {
            repo,
            events,
            gates: Arc::new(AccountGates::new()),
            prices: Arc::new(DashMap::new()),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    /// Forget cached item prices; the next purchase re-reads the catalog
    pub fn clear_price_cache(&self) {
        self.prices.clear();
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&R) -> Result<T> + Send + 'static,
    {
        let repo = self.repo.clone();
        tokio::task::spawn_blocking(move || f(repo.as_ref()))
            .await
            .map_err(|e| Error::storage(format!("ledger task failed: {}", e)))?
    }

    /// Side-effect free storage work bounded by the operation deadline
    async fn read<T, F>(&self, scope: &OperationScope, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&R) -> Result<T> + Send + 'static,
    {
        tokio::time::timeout_at(scope.deadline, self.blocking(f))
            .await
            .map_err(|_| Error::Timeout)?
    }

    fn reject<T>(&self, scope: OperationScope, event: LedgerEvent, error: Error) -> Result<T> {
        self.events.emit(&event.with_error(&error));
        scope.finish();
        Err(error)
    }

    /// Move `amount` coins from `from_id` to the account named `to_name`
    ///
    /// Rejections, in the order they are checked: unknown source or
    /// destination (`NotFound`), sending to oneself (`SelfTransfer`), a
    /// non-positive amount (`InvalidAmount`) and a balance below `amount`
    /// (`InsufficientFunds`). On success both balances and the log entry are
    /// committed together; on any failure none of them are.
    pub async fn transfer_coins(
        &self,
        from_id: AccountId,
        amount: i64,
        to_name: &str,
    ) -> Result<Transaction> {
        let scope = OperationScope::start(self.operation_timeout);
        let event = scope
            .event(EVENT_TRANSFER)
            .with_account(from_id)
            .with_counterparty(to_name)
            .with_amount(amount);

        let to_id = match self.resolve_transfer(&scope, from_id, amount, to_name).await {
            Ok(id) => id,
            Err(e) => return self.reject(scope, event, e),
        };

        let gates = match self.gates.acquire(&[from_id, to_id], scope.deadline).await {
            Ok(gates) => gates,
            Err(e) => return self.reject(scope, event, e),
        };

        let checkpoint = scope.checkpoint();
        let events = self.events.clone();
        let result = self
            .blocking(move |repo| {
                let _gates = gates;
                let result = transfer_in_unit(repo, from_id, to_id, amount, &checkpoint);
                report(&*events, event, &result);
                result
            })
            .await;

        scope.finish();
        result
    }

    async fn resolve_transfer(
        &self,
        scope: &OperationScope,
        from_id: AccountId,
        amount: i64,
        to_name: &str,
    ) -> Result<AccountId> {
        let to_name = to_name.to_string();
        self.read(scope, move |repo| {
            let from = repo.get_account_by_id(from_id)?;
            let to = repo.get_account_by_name(&to_name)?;
            if from.id == to.id {
                return Err(Error::SelfTransfer);
            }
            if amount <= 0 {
                return Err(Error::InvalidAmount(amount));
            }
            Ok(to.id)
        })
        .await
    }

    /// Buy one unit of `item_name` for the account
    ///
    /// Purchases are not written to the transaction log.
    pub async fn buy_item(&self, user_id: AccountId, item_name: &str) -> Result<()> {
        let scope = OperationScope::start(self.operation_timeout);
        let event = scope
            .event(EVENT_BUY)
            .with_account(user_id)
            .with_item(item_name);

        let item = match self.resolve_purchase(&scope, user_id, item_name).await {
            Ok(item) => item,
            Err(e) => return self.reject(scope, event, e),
        };
        let event = event.with_amount(item.price);

        let gates = match self.gates.acquire(&[user_id], scope.deadline).await {
            Ok(gates) => gates,
            Err(e) => return self.reject(scope, event, e),
        };

        let checkpoint = scope.checkpoint();
        let events = self.events.clone();
        let result = self
            .blocking(move |repo| {
                let _gates = gates;
                let result = buy_in_unit(repo, user_id, &item, &checkpoint);
                report(&*events, event, &result);
                result
            })
            .await;

        scope.finish();
        result
    }

    async fn resolve_purchase(
        &self,
        scope: &OperationScope,
        user_id: AccountId,
        item_name: &str,
    ) -> Result<Item> {
        let prices = self.prices.clone();
        let name = item_name.to_string();
        self.read(scope, move |repo| {
            repo.get_account_by_id(user_id)?;
            if let Some(cached) = prices.get(&name) {
                return Ok(cached.value().clone());
            }
            let item = repo.get_item_by_name(&name)?;
            prices.insert(name, item.clone());
            Ok(item)
        })
        .await
    }

    /// Transfers the account took part in, newest first
    pub async fn list_transactions(&self, user_id: AccountId) -> Result<Vec<Transaction>> {
        let scope = OperationScope::start(self.operation_timeout);
        let event = scope.event(EVENT_LIST_TRANSACTIONS).with_account(user_id);

        let result = self
            .read(&scope, move |repo| repo.list_transactions_by_user(user_id))
            .await;

        report(&*self.events, event, &result);
        scope.finish();
        result
    }

    /// Transfers seen from the account's side
    pub async fn coin_history(&self, user_id: AccountId) -> Result<Vec<TransactionView>> {
        let scope = OperationScope::start(self.operation_timeout);
        let event = scope.event(EVENT_COIN_HISTORY).with_account(user_id);

        let result = self
            .read(&scope, move |repo| {
                let transactions = repo.list_transactions_by_user(user_id)?;
                Ok(transactions
                    .iter()
                    .filter_map(|t| t.view_for(user_id))
                    .collect::<Vec<_>>())
            })
            .await;

        report(&*self.events, event, &result);
        scope.finish();
        result
    }

    /// Balance, inventory and coin history read from one storage snapshot
    pub async fn account_snapshot(&self, user_id: AccountId) -> Result<AccountSnapshot> {
        let scope = OperationScope::start(self.operation_timeout);
        let event = scope.event(EVENT_SNAPSHOT).with_account(user_id);

        let result = self
            .read(&scope, move |repo| {
                let unit = repo.begin()?;
                let account = unit.get_account_by_id(user_id)?;
                let transactions = unit.list_transactions_by_user(user_id)?;
                Ok(AccountSnapshot {
                    coins: account.coins,
                    inventory: account.inventory,
                    coin_history: split_history(user_id, &transactions),
                })
            })
            .await;

        report(&*self.events, event, &result);
        scope.finish();
        result
    }
}
