//! Integration tests for merchstore-core services
//!
//! These tests run the ledger against a real DuckDB file.
//!
//! Run with: cargo test --test integration_tests -- --nocapture

use std::sync::Arc;

use tempfile::TempDir;

use merchstore_core::adapters::{DuckDbRepository, MemoryEventSink};
use merchstore_core::config::Config;
use merchstore_core::domain::{Direction, Item, NewAccount};
use merchstore_core::ports::{AccountStore, CatalogLookup, Repository, TransactionLog};
use merchstore_core::services::{LedgerService, EVENT_TRANSFER};
use merchstore_core::{AccountId, Error, ErrorKind, MerchStoreContext};

// ============================================================================
// Test Helpers
// ============================================================================

/// Create a test repository with schema initialized
fn create_test_repo(temp_dir: &TempDir) -> Arc<DuckDbRepository> {
    let db_path = temp_dir.path().join("test.duckdb");
    let repo = DuckDbRepository::new(&db_path).expect("Failed to create repository");
    repo.ensure_schema().expect("Failed to initialize schema");
    Arc::new(repo)
}

fn create_account(repo: &DuckDbRepository, name: &str, coins: i64) -> AccountId {
    repo.create_account(&NewAccount::new(name, "not-a-real-hash", coins))
        .expect("Failed to create account")
}

fn ledger(repo: &Arc<DuckDbRepository>) -> (LedgerService<DuckDbRepository>, Arc<MemoryEventSink>) {
    let events = Arc::new(MemoryEventSink::new());
    (LedgerService::new(Arc::clone(repo), events.clone()), events)
}

fn coins(repo: &DuckDbRepository, id: AccountId) -> i64 {
    repo.get_account_by_id(id).unwrap().coins
}

// ============================================================================
// Ledger scenarios
// ============================================================================

#[tokio::test]
async fn test_end_to_end_transfer_and_purchases() {
    let temp_dir = TempDir::new().unwrap();
    let repo = create_test_repo(&temp_dir);
    repo.seed_item(&Item::new("cup", 50)).unwrap();
    let a = create_account(&repo, "a", 100_000);
    let b = create_account(&repo, "b", 0);
    let (service, events) = ledger(&repo);

    let tx = service.transfer_coins(a, 250, "b").await.unwrap();
    assert_eq!(coins(&repo, a), 99_750);
    assert_eq!(coins(&repo, b), 250);

    let logged = repo.list_transactions_by_user(b).unwrap();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0], tx);

    service.buy_item(a, "cup").await.unwrap();
    let snapshot = service.account_snapshot(a).await.unwrap();
    assert_eq!(snapshot.coins, 99_700);
    assert_eq!(snapshot.inventory.quantity("cup"), 1);

    service.buy_item(a, "cup").await.unwrap();
    let snapshot = service.account_snapshot(a).await.unwrap();
    assert_eq!(snapshot.coins, 99_650);
    assert_eq!(snapshot.inventory.quantity("cup"), 2);
    assert_eq!(snapshot.inventory.len(), 1);
    assert_eq!(snapshot.coin_history.sent.len(), 1);
    assert!(snapshot.coin_history.received.is_empty());

    // Purchases never reach the transaction log
    assert_eq!(repo.count_transactions().unwrap(), 1);
    assert_eq!(events.names()[0], EVENT_TRANSFER);
}

#[tokio::test]
async fn test_rejections_leave_database_untouched() {
    let temp_dir = TempDir::new().unwrap();
    let repo = create_test_repo(&temp_dir);
    let alice = create_account(&repo, "alice", 100);
    let bob = create_account(&repo, "bob", 0);
    let (service, events) = ledger(&repo);

    let cases = [
        (service.transfer_coins(alice, 0, "bob").await, ErrorKind::InvalidAmount),
        (service.transfer_coins(alice, -10, "bob").await, ErrorKind::InvalidAmount),
        (service.transfer_coins(alice, 101, "bob").await, ErrorKind::InsufficientFunds),
        (service.transfer_coins(alice, 10, "nobody").await, ErrorKind::NotFound),
        (service.transfer_coins(alice, 10, "alice").await, ErrorKind::SelfTransfer),
    ];
    for (result, kind) in cases {
        let err = result.unwrap_err();
        assert_eq!(err.kind(), kind);
        assert!(err.is_rejection());
    }

    let err = service.buy_item(alice, "no-such-item").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    // Seeded catalog: pink-hoody costs 500
    let err = service.buy_item(alice, "pink-hoody").await.unwrap_err();
    assert!(matches!(err, Error::InsufficientFunds { balance: 100, required: 500 }));

    assert_eq!(coins(&repo, alice), 100);
    assert_eq!(coins(&repo, bob), 0);
    assert!(repo.get_account_by_id(alice).unwrap().inventory.is_empty());
    assert_eq!(repo.count_transactions().unwrap(), 0);
    assert!(events.events().iter().all(|e| e.is_error()));
}

#[tokio::test]
async fn test_history_is_newest_first_per_participant() {
    let temp_dir = TempDir::new().unwrap();
    let repo = create_test_repo(&temp_dir);
    let a = create_account(&repo, "a", 1000);
    let b = create_account(&repo, "b", 1000);
    let c = create_account(&repo, "c", 1000);
    let (service, _) = ledger(&repo);

    let t1 = service.transfer_coins(a, 10, "b").await.unwrap();
    let t2 = service.transfer_coins(b, 20, "c").await.unwrap();
    let t3 = service.transfer_coins(c, 30, "a").await.unwrap();

    let for_b: Vec<i64> = service
        .list_transactions(b)
        .await
        .unwrap()
        .iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(for_b, vec![t2.id, t1.id]);

    let history = service.coin_history(a).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].transaction_id, t3.id);
    assert_eq!(history[0].direction, Direction::Received);
    assert_eq!(history[0].counterparty, c);
    assert_eq!(history[1].direction, Direction::Sent);
    assert_eq!(history[1].amount, 10);

    let stranger = create_account(&repo, "d", 0);
    assert!(service.list_transactions(stranger).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let (a, b) = {
        let repo = create_test_repo(&temp_dir);
        let a = create_account(&repo, "a", 500);
        let b = create_account(&repo, "b", 0);
        let (service, _) = ledger(&repo);
        service.transfer_coins(a, 200, "b").await.unwrap();
        service.buy_item(a, "pen").await.unwrap();
        (a, b)
    };

    let repo = create_test_repo(&temp_dir);
    assert_eq!(coins(&repo, a), 290);
    assert_eq!(coins(&repo, b), 200);
    assert_eq!(repo.get_account_by_id(a).unwrap().inventory.quantity("pen"), 1);
    assert_eq!(repo.list_transactions_by_user(a).unwrap().len(), 1);
    assert_eq!(repo.get_item_by_name("pen").unwrap().price, 10);
}

// ============================================================================
// Context wiring
// ============================================================================

#[tokio::test]
async fn test_context_persists_events_and_provisions_accounts() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = Config::defaults(temp_dir.path());
    config.initial_balance = 1_000;
    let ctx = MerchStoreContext::new(config).unwrap();

    let alice = ctx.auth_service.authenticate("alice", "pw-a").unwrap();
    let bob = ctx.auth_service.authenticate("bob", "pw-b").unwrap();
    assert_eq!(alice.coins, 1_000);

    ctx.ledger_service
        .transfer_coins(alice.id, 300, "bob")
        .await
        .unwrap();
    ctx.ledger_service
        .transfer_coins(bob.id, 5_000, "alice")
        .await
        .unwrap_err();

    let logs = ctx.logging_service.as_ref().expect("event log enabled");
    let errors = logs.get_errors(10).unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error_kind.as_deref(), Some("insufficient_funds"));
    // two account_created + two transfers
    assert_eq!(logs.count().unwrap(), 4);

    let report = ctx.doctor_service.run_checks().unwrap();
    assert!(report.is_healthy());
    assert!(matches!(
        ctx.auth_service.authenticate("alice", "wrong"),
        Err(Error::InvalidCredentials)
    ));
}

#[test]
fn test_context_without_event_log() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = Config::defaults(temp_dir.path());
    config.event_log = false;

    let ctx = MerchStoreContext::new(config).unwrap();

    assert!(ctx.logging_service.is_none());
    assert!(!temp_dir.path().join("logs.duckdb").exists());
    assert_eq!(ctx.repository.list_items().unwrap().len(), 10);
}
