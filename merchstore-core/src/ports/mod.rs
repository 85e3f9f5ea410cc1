//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The core domain
//! depends only on these traits, not on concrete implementations.

mod events;
mod repository;

pub use events::{CompositeEventSink, EventSink, LedgerEvent, NullEventSink};
pub use repository::{AccountStore, CatalogLookup, Repository, TransactionLog, UnitOfWork};
