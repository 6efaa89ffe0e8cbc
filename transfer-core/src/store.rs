//! Ledger Store: the only component permitted to mutate balances
//!
//! Every mutation runs inside a short critical section guarded by a write
//! gate, re-reads current state, and commits through an atomic RocksDB
//! batch. Partial application (debit without credit) is never observable:
//! either both rows land or neither does.
//!
//! The store performs no logging of transfer attempts; that separation
//! ("did the money move" vs "is there a durable record") belongs to the
//! orchestrator.

use crate::{
    error::{Error, Result},
    storage::Storage,
    types::{Account, AccountId},
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Outcome of a successful atomic apply
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedTransfer {
    /// Source balance after the debit
    pub from_balance: Decimal,
    /// Destination balance after the credit
    pub to_balance: Decimal,
    /// Source version after the apply
    pub from_version: u64,
    /// Destination version after the apply
    pub to_version: u64,
}

/// Durable keyed storage of account balances and versions
pub struct LedgerStore {
    storage: Arc<Storage>,

    /// Serializes the read-check-write step so the version compare and the
    /// balance check are atomic with the commit.
    write_gate: Mutex<()>,
}

impl LedgerStore {
    /// Create a store over shared storage
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            write_gate: Mutex::new(()),
        }
    }

    /// Read an account (versioned snapshot; never a torn value)
    pub fn get(&self, id: AccountId) -> Result<Option<Account>> {
        self.storage.get_account(id)
    }

    /// Insert a newly opened account.
    ///
    /// The unique-number constraint is checked under the write gate, so a
    /// racing insert with the same generated number loses cleanly with
    /// `DuplicateAccountNumber`.
    pub fn insert_account(&self, account: &Account) -> Result<()> {
        let _gate = self.write_gate.lock();
        self.storage.create_account(account)
    }

    /// Atomically debit `from` and credit `to` by `amount`.
    ///
    /// The existence, active-flag, version, and balance checks all happen
    /// under the same critical section that commits the mutation, so there
    /// is no time-of-check/time-of-use window. Version mismatches signal
    /// the caller to re-read and retry.
    pub fn apply_transfer(
        &self,
        from_id: AccountId,
        to_id: AccountId,
        amount: Decimal,
        expected_from_version: u64,
        expected_to_version: u64,
    ) -> Result<AppliedTransfer> {
        if from_id == to_id {
            return Err(Error::SameAccount);
        }
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount(format!(
                "transfer amount must be positive, got {}",
                amount
            )));
        }

        let _gate = self.write_gate.lock();

        let mut from = self.fetch_active(from_id)?;
        let mut to = self.fetch_active(to_id)?;

        if from.version != expected_from_version {
            return Err(Error::VersionConflict(from_id.to_string()));
        }
        if to.version != expected_to_version {
            return Err(Error::VersionConflict(to_id.to_string()));
        }

        if from.balance < amount {
            return Err(Error::InsufficientFunds {
                account: from.number.to_string(),
                requested: amount,
                available: from.balance,
            });
        }

        from.balance -= amount;
        from.version += 1;
        to.balance += amount;
        to.version += 1;

        self.storage.put_account_pair(&from, &to)?;

        Ok(AppliedTransfer {
            from_balance: from.balance,
            to_balance: to.balance,
            from_version: from.version,
            to_version: to.version,
        })
    }

    /// Credit a single account (external deposit).
    ///
    /// Deposits and withdrawals are the only operations that change the
    /// total value held across accounts; transfers conserve it.
    pub fn deposit(&self, id: AccountId, amount: Decimal) -> Result<Account> {
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount(format!(
                "deposit amount must be positive, got {}",
                amount
            )));
        }

        let _gate = self.write_gate.lock();

        let mut account = self.fetch_active(id)?;
        account.balance += amount;
        account.version += 1;
        self.storage.put_account(&account)?;

        Ok(account)
    }

    /// Debit a single account (external withdrawal); `balance >= 0` holds
    /// after every withdrawal.
    pub fn withdraw(&self, id: AccountId, amount: Decimal) -> Result<Account> {
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount(format!(
                "withdrawal amount must be positive, got {}",
                amount
            )));
        }

        let _gate = self.write_gate.lock();

        let mut account = self.fetch_active(id)?;
        if account.balance < amount {
            return Err(Error::InsufficientFunds {
                account: account.number.to_string(),
                requested: amount,
                available: account.balance,
            });
        }
        account.balance -= amount;
        account.version += 1;
        self.storage.put_account(&account)?;

        Ok(account)
    }

    /// Flip the active flag. Inactive accounts cannot participate in
    /// transfers, deposits, or withdrawals until reactivated.
    pub fn set_active(&self, id: AccountId, active: bool) -> Result<Account> {
        let _gate = self.write_gate.lock();

        let mut account = self
            .storage
            .get_account(id)?
            .ok_or_else(|| Error::AccountNotFound(id.to_string()))?;
        account.active = active;
        account.version += 1;
        self.storage.put_account(&account)?;

        Ok(account)
    }

    fn fetch_active(&self, id: AccountId) -> Result<Account> {
        let account = self
            .storage
            .get_account(id)?
            .ok_or_else(|| Error::AccountNotFound(id.to_string()))?;
        if !account.active {
            return Err(Error::AccountInactive(account.number.to_string()));
        }
        Ok(account)
    }
}
