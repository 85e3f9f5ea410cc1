//! CLI command implementations

pub mod auth;
pub mod buy;
pub mod doctor;
pub mod history;
pub mod info;
pub mod items;
pub mod logs;
pub mod send;

use std::future::Future;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::runtime::Runtime;

use merchstore_core::config::Config;
use merchstore_core::ports::AccountStore;
use merchstore_core::{Account, AccountId, Error, MerchStoreContext};

/// Caller credentials from `--user` / `--password`
pub struct Credentials {
    pub user: Option<String>,
    pub password: Option<String>,
}

/// Everything a ledger command needs: the store, a runtime to drive the
/// async engine, and who is asking
pub struct Session {
    pub ctx: MerchStoreContext,
    pub json: bool,
    runtime: Runtime,
    credentials: Credentials,
}

impl Session {
    pub fn open(config: Config, credentials: Credentials, json: bool) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Failed to start async runtime")?;
        let ctx = MerchStoreContext::new(config).context("Failed to initialize merch store")?;

        Ok(Self {
            ctx,
            json,
            runtime,
            credentials,
        })
    }

    /// Resolve the caller to an account, creating it on first use
    pub fn caller(&self) -> Result<Account> {
        let user = self
            .credentials
            .user
            .as_deref()
            .ok_or_else(|| Error::validation("--user (or MERCH_USER) is required"))?;
        let password = self
            .credentials
            .password
            .as_deref()
            .ok_or_else(|| Error::validation("--password (or MERCH_PASSWORD) is required"))?;

        Ok(self.ctx.auth_service.authenticate(user, password)?)
    }

    /// Drive a ledger operation to completion
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Name of an account for display, falling back to its id
    pub fn account_name(&self, id: AccountId) -> String {
        self.ctx
            .repository
            .get_account_by_id(id)
            .map(|a| a.name)
            .unwrap_or_else(|_| format!("#{}", id))
    }
}

/// Get the data directory from environment or default
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("MERCH_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".merchstore"))
        .context("Could not find home directory, set MERCH_DIR")
}
