//! Error types for the transfer engine

use crate::types::TransferStatus;
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for transfer-engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Transfer-engine errors
///
/// Grouped by handling policy: validation errors are surfaced verbatim and
/// never retried; contention errors are retried internally up to a bounded
/// count; `InsufficientFunds` is terminal and recorded as `FAILED`.
#[derive(Error, Debug)]
pub enum Error {
    /// Source and destination are the same account
    #[error("Source and destination accounts are identical")]
    SameAccount,

    /// Account missing
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Account deactivated
    #[error("Account inactive: {0}")]
    AccountInactive(String),

    /// Amount not positive or carries too many fractional digits
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Source balance below the requested amount at apply time
    #[error("Insufficient funds in {account}: requested {requested}, available {available}")]
    InsufficientFunds {
        /// Source account
        account: String,
        /// Requested amount
        requested: Decimal,
        /// Balance at apply time
        available: Decimal,
    },

    /// Optimistic-concurrency guard tripped; retryable
    #[error("Version conflict on account {0}")]
    VersionConflict(String),

    /// Bounded lock wait elapsed; retryable
    #[error("Lock acquisition timed out for account {0}")]
    LockTimeout(String),

    /// Contention retries exhausted; caller may resubmit with the same
    /// idempotency key
    #[error("Concurrency retries exhausted after {attempts} attempts")]
    ConcurrencyExhausted {
        /// Attempts made before giving up
        attempts: u32,
    },

    /// Transfer log status transition outside the state machine
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition {
        /// Current status
        from: TransferStatus,
        /// Requested status
        to: TransferStatus,
    },

    /// Generated account number already taken; generation is retried
    #[error("Duplicate account number: {0}")]
    DuplicateAccountNumber(String),

    /// Account-number generation retries exhausted
    #[error("Could not generate a unique account number")]
    AccountNumberExhausted,

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Contention errors are retried internally by the orchestrator.
    pub fn is_contention(&self) -> bool {
        matches!(self, Error::VersionConflict(_) | Error::LockTimeout(_))
    }

    /// Validation errors are surfaced verbatim; no state mutation occurred.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::SameAccount
                | Error::AccountNotFound(_)
                | Error::AccountInactive(_)
                | Error::InvalidAmount(_)
        )
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
