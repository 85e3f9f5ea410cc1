//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod account;
mod item;
pub mod result;
pub mod transaction;

pub use account::{Account, AccountId, AccountSnapshot, CoinHistory, Inventory, NewAccount};
pub use item::Item;
pub use transaction::{Direction, NewTransaction, Transaction, TransactionView};
