//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

mod auth;
mod doctor;
pub mod gate;
mod ledger;
pub mod logging;
pub mod migration;

pub use auth::{AuthService, PasswordParams, DEFAULT_INITIAL_BALANCE};
pub use doctor::{CheckResult, DoctorResult, DoctorService, DoctorSummary};
pub use gate::{AccountGates, GateGuard};
pub use ledger::{
    LedgerService, DEFAULT_OPERATION_TIMEOUT, EVENT_BUY, EVENT_COIN_HISTORY,
    EVENT_LIST_TRANSACTIONS, EVENT_SNAPSHOT, EVENT_TRANSFER,
};
pub use logging::{EventStats, LogEntry, LoggingService};
pub use migration::{MigrationResult, MigrationService};
