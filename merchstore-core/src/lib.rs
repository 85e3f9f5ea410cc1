//! Merch Store Core - coin and inventory ledger
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core business entities (Account, Item, Transaction, etc.)
//! - **ports**: Trait definitions for storage and event reporting
//! - **services**: Business logic orchestration (ledger, auth, doctor)
//! - **adapters**: Concrete implementations (DuckDB, in-memory, tracing)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::sync::Arc;

use anyhow::{Context, Result};

use adapters::{DuckDbRepository, TracingEventSink};
use config::Config;
use ports::{CompositeEventSink, EventSink, Repository};
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::{Error, ErrorKind, OperationResult};
pub use domain::{Account, AccountId, AccountSnapshot, Item, Transaction, TransactionView};

/// Main context for merch store operations
///
/// This is the primary entry point for all business logic. It holds
/// the database, configuration, event sinks and all services.
pub struct MerchStoreContext {
    pub config: Config,
    pub repository: Arc<DuckDbRepository>,
    pub ledger_service: LedgerService<DuckDbRepository>,
    pub auth_service: AuthService<DuckDbRepository>,
    pub doctor_service: DoctorService<DuckDbRepository>,
    /// Present when `event_log` is enabled
    pub logging_service: Option<Arc<LoggingService>>,
}

impl MerchStoreContext {
    /// Create a context from resolved configuration
    pub fn new(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir).with_context(|| {
            format!("Failed to create data directory {}", config.data_dir.display())
        })?;

        let repository = Arc::new(DuckDbRepository::new(&config.db_path)?);

        // Initialize schema
        repository.ensure_schema()?;

        let logging_service = if config.event_log {
            Some(Arc::new(LoggingService::new(
                &config.data_dir,
                env!("CARGO_PKG_VERSION"),
            )?))
        } else {
            None
        };

        let mut sink = CompositeEventSink::new().with(Arc::new(TracingEventSink::new()));
        if let Some(logging) = &logging_service {
            sink = sink.with(logging.clone());
        }
        let events: Arc<dyn EventSink> = Arc::new(sink);

        let ledger_service = LedgerService::new(Arc::clone(&repository), events.clone())
            .with_operation_timeout(config.operation_timeout);
        let auth_service =
            AuthService::new(Arc::clone(&repository), events, config.initial_balance);
        let doctor_service = DoctorService::new(Arc::clone(&repository));

        Ok(Self {
            config,
            repository,
            ledger_service,
            auth_service,
            doctor_service,
            logging_service,
        })
    }

    /// Load configuration from `data_dir` and build the context
    pub fn open(data_dir: &std::path::Path) -> Result<Self> {
        Self::new(Config::load(data_dir)?)
    }
}
