//! Per-account serialization gates
//!
//! Every mutation of an account happens while its gate is held. Operations
//! that touch two accounts take both gates in ascending id order, so two
//! transfers running in opposite directions cannot wait on each other.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

use crate::domain::result::{Error, Result};
use crate::domain::AccountId;

/// Gates held for the duration of one operation, released on drop
#[derive(Debug)]
pub struct GateGuard {
    ids: Vec<AccountId>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl GateGuard {
    /// Account ids covered, in acquisition order
    pub fn ids(&self) -> &[AccountId] {
        &self.ids
    }
}

/// One async mutex per account id, created on first use
#[derive(Debug, Default)]
pub struct AccountGates {
    gates: DashMap<AccountId, Arc<Mutex<()>>>,
}

impl AccountGates {
    pub fn new() -> Self {
        Self::default()
    }

    fn gate(&self, id: AccountId) -> Arc<Mutex<()>> {
        self.gates
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire the gates of `ids` (duplicates collapse) before `deadline`
    ///
    /// Fails with [`Error::Timeout`] if any gate is still held by another
    /// operation when the deadline passes; gates taken so far are released.
    pub async fn acquire(&self, ids: &[AccountId], deadline: Instant) -> Result<GateGuard> {
        let mut ordered = ids.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for id in &ordered {
            let gate = self.gate(*id);
            let guard = tokio::time::timeout_at(deadline, gate.lock_owned())
                .await
                .map_err(|_| Error::Timeout)?;
            guards.push(guard);
        }

        Ok(GateGuard {
            ids: ordered,
            _guards: guards,
        })
    }

    /// Number of accounts that have had a gate created
    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn soon() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[tokio::test]
    async fn test_acquire_sorts_and_dedups() {
        let gates = AccountGates::new();
        let guard = gates.acquire(&[7, 3, 7], soon()).await.unwrap();
        assert_eq!(guard.ids(), &[3, 7]);
        assert_eq!(gates.len(), 2);
    }

    #[tokio::test]
    async fn test_held_gate_times_out() {
        let gates = AccountGates::new();
        let _held = gates.acquire(&[1], soon()).await.unwrap();

        let deadline = Instant::now() + Duration::from_millis(20);
        let result = gates.acquire(&[2, 1], deadline).await;
        assert!(matches!(result, Err(Error::Timeout)));

        // Gate 2 was released when the attempt gave up
        assert!(gates.acquire(&[2], soon()).await.is_ok());
    }

    #[tokio::test]
    async fn test_gate_released_on_drop() {
        let gates = AccountGates::new();
        {
            let _guard = gates.acquire(&[1, 2], soon()).await.unwrap();
        }
        assert!(gates.acquire(&[2, 1], soon()).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_opposite_orders_do_not_deadlock() {
        let gates = Arc::new(AccountGates::new());
        let mut handles = Vec::new();
        for i in 0..50 {
            let gates = gates.clone();
            handles.push(tokio::spawn(async move {
                let ids = if i % 2 == 0 { [1, 2] } else { [2, 1] };
                let _guard = gates.acquire(&ids, soon()).await?;
                tokio::task::yield_now().await;
                Ok::<_, Error>(())
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
    }
}
