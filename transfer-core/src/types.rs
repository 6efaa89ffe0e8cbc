//! Core types for the transfer engine
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (Decimal for money)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Fractional digits carried by every monetary value (currency of record).
pub const MONEY_SCALE: u32 = 2;

/// Account identifier (opaque, immutable)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct AccountId(Uuid);

impl AccountId {
    /// Generate a fresh account ID (UUIDv7 for time-ordering)
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Raw bytes (storage key)
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transfer identifier (assigned on creation, never reused)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferId(Uuid);

impl TransferId {
    /// Generate a fresh transfer ID
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Raw bytes (storage key)
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque user identifier, received from the authentication collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Generate a fresh user ID
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Raw bytes (index key)
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique, immutable account number (customer-facing)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountNumber(String);

impl AccountNumber {
    /// Wrap a raw account number
    pub fn new(number: impl Into<String>) -> Self {
        Self(number.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Account type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    /// Checking account
    Checking,
    /// Savings account
    Savings,
}

impl AccountType {
    /// Human-readable name
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Checking => "CHECKING",
            AccountType::Savings => "SAVINGS",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A customer account
///
/// The balance is owned exclusively by the Ledger Store and mutated only
/// inside a transfer's atomic apply step (or a deposit/withdraw). The
/// version counter increments on every balance mutation and backs the
/// optimistic-concurrency guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Account identifier (immutable, opaque)
    pub id: AccountId,

    /// Owning user
    pub user_id: UserId,

    /// Unique account number
    pub number: AccountNumber,

    /// Account type
    pub account_type: AccountType,

    /// Current balance (exact decimal, `>= 0` at every observable point)
    pub balance: Decimal,

    /// Monotonically increasing version counter
    pub version: u64,

    /// Deactivated accounts cannot participate in transfers
    pub active: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Create a new active account with zero balance
    pub fn open(user_id: UserId, number: AccountNumber, account_type: AccountType) -> Self {
        Self {
            id: AccountId::generate(),
            user_id,
            number,
            account_type,
            balance: Decimal::ZERO,
            version: 0,
            active: true,
            created_at: Utc::now(),
        }
    }
}

/// Transfer status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferStatus {
    /// Persisted, not yet applied
    Pending,
    /// Debit and credit applied (terminal)
    Applied,
    /// Rejected or aborted, no balance change (terminal)
    Failed,
    /// Applied then compensated because the durable record could not be
    /// confirmed (terminal)
    Reversed,
}

impl TransferStatus {
    /// Terminal statuses are immutable
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Applied | TransferStatus::Failed | TransferStatus::Reversed
        )
    }

    /// Valid transitions: `Pending` to any terminal status, and
    /// `Applied` to `Reversed` for the compensation path.
    pub fn can_transition_to(&self, next: TransferStatus) -> bool {
        match (self, next) {
            (TransferStatus::Pending, n) if n.is_terminal() => true,
            (TransferStatus::Applied, TransferStatus::Reversed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransferStatus::Pending => "PENDING",
            TransferStatus::Applied => "APPLIED",
            TransferStatus::Failed => "FAILED",
            TransferStatus::Reversed => "REVERSED",
        };
        write!(f, "{}", s)
    }
}

/// Why a transfer reached `Failed` (or `Reversed`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// Source balance below the requested amount at apply time
    InsufficientFunds,
    /// An account disappeared between validation and apply
    AccountNotFound,
    /// An account was deactivated between validation and apply
    AccountInactive,
    /// Contention retries exhausted; safe to resubmit with the same key
    ConcurrencyExhausted,
    /// Terminal log write could not be confirmed after a successful apply
    LogUnconfirmed,
}

/// Durable record of a transfer attempt
///
/// Created in `Pending` before any balance mutation is attempted, so every
/// attempt is auditable even on crash. Only the status (and the
/// outcome fields that accompany it) mutate after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// Transfer identifier
    pub id: TransferId,

    /// Source account
    pub from_account: AccountId,

    /// Destination account (always distinct from source)
    pub to_account: AccountId,

    /// Positive amount, `MONEY_SCALE` fractional digits
    pub amount: Decimal,

    /// Caller-supplied description
    pub description: String,

    /// Request timestamp
    pub requested_at: DateTime<Utc>,

    /// Current status
    pub status: TransferStatus,

    /// Failure (or reversal) reason, set with the terminal status
    pub reason: Option<FailureReason>,

    /// Caller-supplied token for at-most-once semantics
    pub idempotency_key: String,

    /// Source balance after apply, recorded so an idempotent replay
    /// reports the same outcome as the original request
    pub from_balance_after: Option<Decimal>,

    /// Destination balance after apply
    pub to_balance_after: Option<Decimal>,
}

impl TransferRecord {
    /// Create a new `Pending` record
    pub fn pending(
        from_account: AccountId,
        to_account: AccountId,
        amount: Decimal,
        description: impl Into<String>,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            id: TransferId::generate(),
            from_account,
            to_account,
            amount,
            description: description.into(),
            requested_at: Utc::now(),
            status: TransferStatus::Pending,
            reason: None,
            idempotency_key: idempotency_key.into(),
            from_balance_after: None,
            to_balance_after: None,
        }
    }
}

/// Result returned to the caller of `initiate_transfer`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferOutcome {
    /// Transfer identifier
    pub transfer_id: TransferId,

    /// Terminal status
    pub status: TransferStatus,

    /// Failure reason, if any
    pub reason: Option<FailureReason>,

    /// Source balance after a successful apply
    pub from_balance_after: Option<Decimal>,

    /// Destination balance after a successful apply
    pub to_balance_after: Option<Decimal>,
}

impl From<&TransferRecord> for TransferOutcome {
    fn from(record: &TransferRecord) -> Self {
        Self {
            transfer_id: record.id,
            status: record.status,
            reason: record.reason,
            from_balance_after: record.from_balance_after,
            to_balance_after: record.to_balance_after,
        }
    }
}
