//! Transfer Orchestrator: drives the transfer state machine
//!
//! A transfer moves `PENDING -> APPLIED` or `PENDING -> FAILED`, with a
//! narrow recovery path `APPLIED -> REVERSED` when the terminal log write
//! cannot be confirmed after a successful apply.
//!
//! Sequencing per transfer:
//!
//! 1. Idempotency check (a non-`FAILED` match replays its stored outcome)
//! 2. Resolve both account numbers through the directory
//! 3. Persist a `PENDING` record before any balance mutation
//! 4. Acquire both account locks in fixed id order
//! 5. Atomic apply through the Ledger Store, with bounded contention retry
//! 6. Persist the terminal status
//! 7. Release locks on every exit path
//!
//! This module also hosts the narrow API exposed to the presentation and
//! authentication collaborators.

use crate::{
    config::Config,
    directory::AccountDirectory,
    error::{Error, Result},
    locks::AccountLocks,
    log::TransactionLog,
    metrics::Metrics,
    storage::Storage,
    store::{AppliedTransfer, LedgerStore},
    types::{
        Account, AccountId, AccountNumber, AccountType, FailureReason, TransferOutcome,
        TransferRecord, TransferStatus, UserId, MONEY_SCALE,
    },
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::time::Duration;

/// A funds-transfer request
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Source account number
    pub from_number: AccountNumber,

    /// Destination account number
    pub to_number: AccountNumber,

    /// Positive amount, at most [`MONEY_SCALE`] fractional digits
    pub amount: Decimal,

    /// Caller-supplied description
    pub description: String,

    /// Caller-supplied token for at-most-once semantics on retries
    pub idempotency_key: String,
}

/// Main engine interface
pub struct TransferOrchestrator {
    /// Ledger Store (sole balance mutator)
    store: LedgerStore,

    /// Transaction Log
    log: TransactionLog,

    /// Account Directory (read path)
    directory: AccountDirectory,

    /// Concurrency Controller
    locks: AccountLocks,

    /// Metrics
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl TransferOrchestrator {
    /// Open the engine with configuration
    pub fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);

        let store = LedgerStore::new(storage.clone());
        let log = TransactionLog::new(storage.clone());
        let directory = AccountDirectory::new(storage, config.account.number_attempts);
        let locks = AccountLocks::new(Duration::from_millis(config.transfer.lock_timeout_ms));
        let metrics =
            Metrics::new().map_err(|e| Error::Other(format!("Metrics registration: {}", e)))?;

        Ok(Self {
            store,
            log,
            directory,
            locks,
            metrics,
            config,
        })
    }

    /// Metrics registry for scraping
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Initiate a funds transfer and run it to a terminal state.
    ///
    /// Business failures recorded in the log (`InsufficientFunds`,
    /// contention exhaustion, accounts vanishing under lock) return
    /// `Ok` with a `Failed` outcome; validation failures detected before
    /// the `PENDING` persist return `Err` and leave no record.
    pub async fn initiate_transfer(&self, request: TransferRequest) -> Result<TransferOutcome> {
        let timer = self.metrics.apply_duration.start_timer();
        let result = self.run_transfer(request).await;
        timer.observe_duration();
        result
    }

    async fn run_transfer(&self, request: TransferRequest) -> Result<TransferOutcome> {
        validate_amount(request.amount)?;

        // At-most-once semantics for retried client requests
        if let Some(existing) = self.log.find_by_idempotency_key(&request.idempotency_key)? {
            if existing.status != TransferStatus::Failed {
                tracing::debug!(
                    transfer_id = %existing.id,
                    status = %existing.status,
                    "Idempotency key matched, replaying stored outcome"
                );
                return Ok(TransferOutcome::from(&existing));
            }
            // A FAILED match is reprocessed under a fresh record
        }

        // Advisory resolution; re-validated under lock before the apply
        let from = self.resolve(&request.from_number)?;
        let to = self.resolve(&request.to_number)?;
        if from.id == to.id {
            return Err(Error::SameAccount);
        }

        // The audit trail precedes any balance mutation: from here the
        // transfer always reaches a terminal state. A duplicate that raced
        // past the check above loses the keyed append and replays instead.
        let record = TransferRecord::pending(
            from.id,
            to.id,
            request.amount,
            request.description,
            request.idempotency_key,
        );
        if let Some(existing) = self.log.append_pending(&record)? {
            return Ok(TransferOutcome::from(&existing));
        }

        let max_attempts = self.config.transfer.max_apply_attempts;
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.attempt_apply(&record).await {
                Ok(outcome) => return Ok(outcome),

                Err(e) if e.is_contention() => {
                    if attempts >= max_attempts {
                        tracing::warn!(
                            transfer_id = %record.id,
                            attempts,
                            "Contention retries exhausted"
                        );
                        let failed = self.log.update_status(
                            record.id,
                            TransferStatus::Failed,
                            Some(FailureReason::ConcurrencyExhausted),
                            None,
                        )?;
                        self.metrics.failed_total.inc();
                        return Ok(TransferOutcome::from(&failed));
                    }
                    self.metrics.retries_total.inc();
                }

                Err(e) => {
                    let reason = match &e {
                        Error::InsufficientFunds { .. } => Some(FailureReason::InsufficientFunds),
                        Error::AccountNotFound(_) => Some(FailureReason::AccountNotFound),
                        Error::AccountInactive(_) => Some(FailureReason::AccountInactive),
                        _ => None,
                    };

                    return match reason {
                        Some(reason) => {
                            tracing::info!(
                                transfer_id = %record.id,
                                error = %e,
                                "Transfer failed"
                            );
                            let failed = self.log.update_status(
                                record.id,
                                TransferStatus::Failed,
                                Some(reason),
                                None,
                            )?;
                            self.metrics.failed_total.inc();
                            Ok(TransferOutcome::from(&failed))
                        }
                        // Infrastructure failure: no balance change happened,
                        // record a terminal state best-effort and surface it
                        None => {
                            let _ = self.log.update_status(
                                record.id,
                                TransferStatus::Failed,
                                None,
                                None,
                            );
                            Err(e)
                        }
                    };
                }
            }
        }
    }

    /// One locked apply attempt. Both locks are held from acquisition to
    /// return; the guards release on every exit path.
    async fn attempt_apply(&self, record: &TransferRecord) -> Result<TransferOutcome> {
        let _locks = self
            .locks
            .lock_pair(record.from_account, record.to_account)
            .await?;

        // Re-read under lock; directory values taken before acquisition
        // are not trusted for the mutating decision.
        let from = self.fetch(record.from_account)?;
        let to = self.fetch(record.to_account)?;

        let applied = self.store.apply_transfer(
            record.from_account,
            record.to_account,
            record.amount,
            from.version,
            to.version,
        )?;

        match self.log.update_status(
            record.id,
            TransferStatus::Applied,
            None,
            Some((applied.from_balance, applied.to_balance)),
        ) {
            Ok(updated) => {
                tracing::info!(
                    transfer_id = %record.id,
                    amount = %record.amount,
                    "Transfer applied"
                );
                // Counted here, not on return to the caller, so an
                // idempotent replay does not recount the mutation
                self.metrics.applied_total.inc();
                Ok(TransferOutcome::from(&updated))
            }
            // Money moved but the durable record is unconfirmed: compensate
            // rather than leave an ambiguous APPLIED state.
            Err(log_err) => self.reverse_unconfirmed(record, &applied, log_err),
        }
    }

    /// Compensation path: undo an applied mutation whose terminal log entry
    /// could not be written. Runs while the pair locks are still held, so
    /// the destination is guaranteed to still hold the credited amount.
    fn reverse_unconfirmed(
        &self,
        record: &TransferRecord,
        applied: &AppliedTransfer,
        log_err: Error,
    ) -> Result<TransferOutcome> {
        tracing::error!(
            transfer_id = %record.id,
            error = %log_err,
            "Terminal log write unconfirmed after apply, compensating"
        );

        self.store.apply_transfer(
            record.to_account,
            record.from_account,
            record.amount,
            applied.to_version,
            applied.from_version,
        )?;

        let reversed = self.log.update_status(
            record.id,
            TransferStatus::Reversed,
            Some(FailureReason::LogUnconfirmed),
            None,
        )?;
        self.metrics.reversed_total.inc();

        Ok(TransferOutcome::from(&reversed))
    }

    fn resolve(&self, number: &AccountNumber) -> Result<Account> {
        let account = self
            .directory
            .find_by_number(number)?
            .ok_or_else(|| Error::AccountNotFound(number.to_string()))?;
        if !account.active {
            return Err(Error::AccountInactive(number.to_string()));
        }
        Ok(account)
    }

    fn fetch(&self, id: AccountId) -> Result<Account> {
        self.store
            .get(id)?
            .ok_or_else(|| Error::AccountNotFound(id.to_string()))
    }

    // Facade operations for the presentation collaborator

    /// Open a new account with zero balance and a freshly generated,
    /// collision-checked account number.
    pub fn open_account(&self, user_id: UserId, account_type: AccountType) -> Result<Account> {
        for _ in 0..self.config.account.number_attempts {
            let number = self.directory.generate_number()?;
            let account = Account::open(user_id, number, account_type);
            match self.store.insert_account(&account) {
                Ok(()) => {
                    tracing::info!(
                        account_id = %account.id,
                        number = %account.number,
                        "Account opened"
                    );
                    return Ok(account);
                }
                // Lost a race on the generated number; try a fresh one
                Err(Error::DuplicateAccountNumber(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(Error::AccountNumberExhausted)
    }

    /// List a user's accounts
    pub fn list_accounts(&self, user_id: UserId) -> Result<Vec<Account>> {
        self.directory.list_by_user(user_id)
    }

    /// Get an account by number
    pub fn get_account(&self, number: &AccountNumber) -> Result<Account> {
        self.directory
            .find_by_number(number)?
            .ok_or_else(|| Error::AccountNotFound(number.to_string()))
    }

    /// List transfers touching an account, most recent first. `limit`
    /// defaults to the configured history limit.
    pub fn list_transactions(
        &self,
        account_id: AccountId,
        limit: Option<usize>,
    ) -> Result<Vec<TransferRecord>> {
        if self.store.get(account_id)?.is_none() {
            return Err(Error::AccountNotFound(account_id.to_string()));
        }
        let limit = limit.unwrap_or(self.config.transfer.default_history_limit);
        self.log.list_for_account(account_id, limit)
    }

    /// External deposit into a single account
    pub async fn deposit(&self, account_id: AccountId, amount: Decimal) -> Result<Account> {
        validate_amount(amount)?;
        let _lock = self.locks.lock(account_id).await?;
        self.store.deposit(account_id, amount)
    }

    /// External withdrawal from a single account
    pub async fn withdraw(&self, account_id: AccountId, amount: Decimal) -> Result<Account> {
        validate_amount(amount)?;
        let _lock = self.locks.lock(account_id).await?;
        self.store.withdraw(account_id, amount)
    }

    /// Deactivate or reactivate an account
    pub async fn set_account_active(&self, account_id: AccountId, active: bool) -> Result<Account> {
        let _lock = self.locks.lock(account_id).await?;
        self.store.set_active(account_id, active)
    }
}

fn validate_amount(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(Error::InvalidAmount(format!(
            "amount must be positive, got {}",
            amount
        )));
    }
    // Trailing zeros are fine (30.000 == 30.00); only a genuinely finer
    // fraction is rejected.
    if amount.normalize().scale() > MONEY_SCALE {
        return Err(Error::InvalidAmount(format!(
            "amount {} exceeds {} fractional digits",
            amount, MONEY_SCALE
        )));
    }
    Ok(())
}
