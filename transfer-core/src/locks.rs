//! Concurrency Controller: per-account mutual exclusion
//!
//! Locks are plain async mutexes keyed by account id. A transfer always
//! acquires its two locks in ascending id order; that fixed total order is
//! the deadlock-avoidance invariant. Guards release on every exit path,
//! and no lock is shared across unrelated account pairs, so throughput
//! scales with the number of distinct accounts.

use crate::{
    error::{Error, Result},
    types::AccountId,
};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::{timeout, Duration};

/// Exclusive hold on a single account
pub struct AccountGuard {
    _guard: OwnedMutexGuard<()>,
}

/// Exclusive hold on two accounts, acquired in id order
pub struct PairGuard {
    _lower: OwnedMutexGuard<()>,
    _higher: OwnedMutexGuard<()>,
}

/// Per-account lock table with bounded acquisition wait
pub struct AccountLocks {
    locks: DashMap<AccountId, Arc<Mutex<()>>>,
    wait_limit: Duration,
}

impl AccountLocks {
    /// Create a lock table; `wait_limit` bounds every acquisition
    pub fn new(wait_limit: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            wait_limit,
        }
    }

    fn entry(&self, id: AccountId) -> Arc<Mutex<()>> {
        self.locks.entry(id).or_default().value().clone()
    }

    async fn acquire(&self, id: AccountId) -> Result<OwnedMutexGuard<()>> {
        let mutex = self.entry(id);
        timeout(self.wait_limit, mutex.lock_owned())
            .await
            .map_err(|_| Error::LockTimeout(id.to_string()))
    }

    /// Acquire exclusive access to one account (e.g. a deposit, or a
    /// balance read that must not race a concurrent transfer).
    pub async fn lock(&self, id: AccountId) -> Result<AccountGuard> {
        Ok(AccountGuard {
            _guard: self.acquire(id).await?,
        })
    }

    /// Acquire exclusive access to both accounts, always ordered by id
    /// ascending regardless of argument order.
    pub async fn lock_pair(&self, a: AccountId, b: AccountId) -> Result<PairGuard> {
        if a == b {
            return Err(Error::SameAccount);
        }

        let (lower, higher) = if a < b { (a, b) } else { (b, a) };

        let lower_guard = self.acquire(lower).await?;
        // If this wait times out, the lower guard drops and releases
        let higher_guard = self.acquire(higher).await?;

        Ok(PairGuard {
            _lower: lower_guard,
            _higher: higher_guard,
        })
    }
}
