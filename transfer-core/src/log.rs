//! Transaction Log: append-only record of transfer attempts
//!
//! Records are written once at `Pending` and mutated only by a terminal
//! status update. The per-account index serves recent-transaction queries
//! most-recent-first.

use crate::{
    error::{Error, Result},
    storage::Storage,
    types::{AccountId, FailureReason, TransferId, TransferRecord, TransferStatus},
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Append-only transfer log over shared storage
pub struct TransactionLog {
    storage: Arc<Storage>,

    /// Serializes the key-lookup-then-append step so two concurrent
    /// requests with the same idempotency key cannot both pass.
    key_gate: Mutex<()>,

    /// Test hook: number of upcoming status updates to reject
    #[cfg(test)]
    fail_updates: std::sync::atomic::AtomicU32,
}

impl TransactionLog {
    /// Create a log over shared storage
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            key_gate: Mutex::new(()),
            #[cfg(test)]
            fail_updates: std::sync::atomic::AtomicU32::new(0),
        }
    }

    /// Append a transfer record (idempotent: re-appending the same record
    /// id with identical content is a natural no-op).
    pub fn append(&self, record: &TransferRecord) -> Result<()> {
        self.storage.append_transfer(record)?;

        tracing::debug!(
            transfer_id = %record.id,
            status = %record.status,
            "Transfer recorded"
        );

        Ok(())
    }

    /// Append a fresh `Pending` record unless its idempotency key already
    /// points at a live attempt.
    ///
    /// Returns the existing record when the key matches a non-`Failed`
    /// attempt (the caller replays its outcome), `None` when the record
    /// was appended. Lookup and append happen under one gate, so a racing
    /// duplicate cannot slip between them.
    pub fn append_pending(&self, record: &TransferRecord) -> Result<Option<TransferRecord>> {
        let _gate = self.key_gate.lock();

        if let Some(existing) = self.find_by_idempotency_key(&record.idempotency_key)? {
            if existing.status != TransferStatus::Failed {
                return Ok(Some(existing));
            }
        }

        self.append(record)?;
        Ok(None)
    }

    /// Get a record by ID
    pub fn get(&self, id: TransferId) -> Result<Option<TransferRecord>> {
        self.storage.get_transfer(id)
    }

    /// Look up the record an idempotency key points at
    pub fn find_by_idempotency_key(&self, key: &str) -> Result<Option<TransferRecord>> {
        match self.storage.transfer_id_by_idempotency_key(key)? {
            Some(id) => self.storage.get_transfer(id),
            None => Ok(None),
        }
    }

    /// Move a record to a new status.
    ///
    /// Permitted transitions: `Pending` to a terminal status, or `Applied`
    /// to `Reversed`. Anything else fails with `InvalidStateTransition`.
    /// Outcome balances accompany the `Applied` update so an idempotent
    /// replay reports the original result.
    pub fn update_status(
        &self,
        id: TransferId,
        status: TransferStatus,
        reason: Option<FailureReason>,
        balances_after: Option<(Decimal, Decimal)>,
    ) -> Result<TransferRecord> {
        #[cfg(test)]
        self.maybe_fail_update()?;

        let mut record = self
            .storage
            .get_transfer(id)?
            .ok_or_else(|| Error::Storage(format!("Transfer not found: {}", id)))?;

        if !record.status.can_transition_to(status) {
            return Err(Error::InvalidStateTransition {
                from: record.status,
                to: status,
            });
        }

        record.status = status;
        record.reason = reason;
        if let Some((from_after, to_after)) = balances_after {
            record.from_balance_after = Some(from_after);
            record.to_balance_after = Some(to_after);
        }

        self.storage.put_transfer(&record)?;

        tracing::debug!(
            transfer_id = %record.id,
            status = %record.status,
            "Transfer status updated"
        );

        Ok(record)
    }

    /// List transfers touching an account, most recent first
    pub fn list_for_account(
        &self,
        account_id: AccountId,
        limit: usize,
    ) -> Result<Vec<TransferRecord>> {
        self.storage.transfers_for_account(account_id, limit)
    }

    /// Reject the next `n` status updates, for exercising recovery paths.
    #[cfg(test)]
    pub(crate) fn fail_next_status_updates(&self, n: u32) {
        self.fail_updates.store(n, std::sync::atomic::Ordering::SeqCst);
    }

    #[cfg(test)]
    fn maybe_fail_update(&self) -> Result<()> {
        use std::sync::atomic::Ordering;
        if self.fail_updates.load(Ordering::SeqCst) > 0 {
            self.fail_updates.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::Storage("status update rejected".to_string()));
        }
        Ok(())
    }
}
