//! Auth service - resolves a name and password to an account
//!
//! The first successful authentication of an unknown name creates the
//! account with the configured starting balance.

use std::sync::Arc;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::Rng;

use crate::domain::result::{Error, Result};
use crate::domain::{Account, NewAccount};
use crate::ports::{EventSink, LedgerEvent, Repository};

/// Starting balance of a freshly created account
pub const DEFAULT_INITIAL_BALANCE: i64 = 100_000;

pub const EVENT_ACCOUNT_CREATED: &str = "account_created";
pub const EVENT_AUTHENTICATE: &str = "authenticate";

/// Argon2id cost parameters for new password hashes
///
/// Verification always uses the parameters recorded in the stored hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordParams {
    pub time_cost: u32,
    /// KiB
    pub memory_cost: u32,
    pub parallelism: u32,
}

impl Default for PasswordParams {
    fn default() -> Self {
        Self {
            time_cost: Params::DEFAULT_T_COST,
            memory_cost: Params::DEFAULT_M_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

/// Service for authenticating (and provisioning) accounts
pub struct AuthService<R: Repository> {
    repo: Arc<R>,
    events: Arc<dyn EventSink>,
    initial_balance: i64,
    params: PasswordParams,
}

impl<R: Repository> AuthService<R> {
    pub fn new(repo: Arc<R>, events: Arc<dyn EventSink>, initial_balance: i64) -> Self {
        Self {
            repo,
            events,
            initial_balance,
            params: PasswordParams::default(),
        }
    }

    pub fn with_params(mut self, params: PasswordParams) -> Self {
        self.params = params;
        self
    }

    pub fn initial_balance(&self) -> i64 {
        self.initial_balance
    }

    fn hasher(&self) -> Result<Argon2<'static>> {
        let params = Params::new(
            self.params.memory_cost,
            self.params.time_cost,
            self.params.parallelism,
            None,
        )
        .map_err(|e| Error::Config(format!("invalid password hashing parameters: {}", e)))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Hash a password into a PHC string with a fresh random salt
    pub fn hash_password(&self, password: &str) -> Result<String> {
        let salt: [u8; 16] = rand::thread_rng().gen();
        let salt = SaltString::encode_b64(&salt)
            .map_err(|e| Error::storage(format!("failed to encode salt: {}", e)))?;

        let hash = self
            .hasher()?
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| Error::storage(format!("failed to hash password: {}", e)))?;
        Ok(hash.to_string())
    }

    /// Check a password against a stored PHC string
    pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(stored_hash)
            .map_err(|e| Error::storage(format!("corrupt password hash: {}", e)))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    /// Authenticate `name`, creating the account on first use
    ///
    /// Fails with `InvalidCredentials` when the account exists and the
    /// password does not match.
    pub fn authenticate(&self, name: &str, password: &str) -> Result<Account> {
        let result = self.resolve(name, password);
        if let Err(e) = &result {
            self.events.emit(
                &LedgerEvent::new(EVENT_AUTHENTICATE)
                    .with_counterparty(name)
                    .with_error(e),
            );
        }
        result
    }

    fn resolve(&self, name: &str, password: &str) -> Result<Account> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("username cannot be empty"));
        }
        if password.is_empty() {
            return Err(Error::validation("password cannot be empty"));
        }

        match self.repo.get_account_by_name(name) {
            Ok(account) => self.check(account, password),
            Err(Error::NotFound(_)) => self.provision(name, password),
            Err(e) => Err(e),
        }
    }

    fn check(&self, account: Account, password: &str) -> Result<Account> {
        if Self::verify_password(password, &account.password_hash)? {
            Ok(account)
        } else {
            Err(Error::InvalidCredentials)
        }
    }

    fn provision(&self, name: &str, password: &str) -> Result<Account> {
        let hash = self.hash_password(password)?;
        match self
            .repo
            .create_account(&NewAccount::new(name, hash, self.initial_balance))
        {
            Ok(id) => {
                self.events.emit(
                    &LedgerEvent::new(EVENT_ACCOUNT_CREATED)
                        .with_account(id)
                        .with_amount(self.initial_balance),
                );
                self.repo.get_account_by_id(id)
            }
            // A concurrent first login for the same name won the insert
            Err(create_err) => match self.repo.get_account_by_name(name) {
                Ok(account) => self.check(account, password),
                Err(_) => Err(create_err),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MemoryEventSink, MemoryRepository};
    use crate::domain::result::ErrorKind;
    use crate::ports::Repository;

    fn cheap() -> PasswordParams {
        PasswordParams {
            time_cost: 1,
            memory_cost: 8,
            parallelism: 1,
        }
    }

    fn service() -> (AuthService<MemoryRepository>, Arc<MemoryRepository>, Arc<MemoryEventSink>) {
        let repo = Arc::new(MemoryRepository::new());
        let events = Arc::new(MemoryEventSink::new());
        let auth = AuthService::new(repo.clone(), events.clone(), DEFAULT_INITIAL_BALANCE)
            .with_params(cheap());
        (auth, repo, events)
    }

    #[test]
    fn test_first_login_creates_account() {
        let (auth, repo, events) = service();

        let account = auth.authenticate("alice", "secret").unwrap();

        assert_eq!(account.name, "alice");
        assert_eq!(account.coins, DEFAULT_INITIAL_BALANCE);
        assert!(account.password_hash.starts_with("$argon2id$"));
        assert_eq!(repo.list_accounts().unwrap().len(), 1);
        assert_eq!(events.names(), vec![EVENT_ACCOUNT_CREATED]);
    }

    #[test]
    fn test_second_login_verifies_password() {
        let (auth, repo, events) = service();
        let created = auth.authenticate("alice", "secret").unwrap();

        let again = auth.authenticate("alice", "secret").unwrap();
        assert_eq!(again.id, created.id);

        let err = auth.authenticate("alice", "wrong").unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials));
        assert_eq!(repo.list_accounts().unwrap().len(), 1);
        assert_eq!(events.events()[1].error_kind, Some(ErrorKind::InvalidCredentials));
    }

    #[test]
    fn test_blank_input_rejected() {
        let (auth, repo, _) = service();
        assert!(matches!(auth.authenticate("  ", "pw"), Err(Error::Validation(_))));
        assert!(matches!(auth.authenticate("bob", ""), Err(Error::Validation(_))));
        assert!(repo.list_accounts().unwrap().is_empty());
    }

    #[test]
    fn test_hashes_are_salted() {
        let (auth, _, _) = service();
        let a = auth.hash_password("pw").unwrap();
        let b = auth.hash_password("pw").unwrap();
        assert_ne!(a, b);
        assert!(AuthService::<MemoryRepository>::verify_password("pw", &a).unwrap());
        assert!(!AuthService::<MemoryRepository>::verify_password("px", &b).unwrap());
        assert!(AuthService::<MemoryRepository>::verify_password("pw", "not-a-hash").is_err());
    }

    #[test]
    fn test_concurrent_first_logins_converge() {
        let (auth, repo, _) = service();

        let ids: Vec<i64> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| auth.authenticate("carol", "pw").map(|a| a.id)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect()
        });

        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(repo.list_accounts().unwrap().len(), 1);
    }
}
