//! CoreBank Transfer Core
//!
//! Funds-transfer and ledger-consistency engine: validates, applies, and
//! records atomic balance changes across pairs of accounts.
//!
//! # Architecture
//!
//! - **Ledger Store**: sole owner of balances; atomic dual-mutation or no
//!   change at all
//! - **Transaction Log**: every attempt persisted before any mutation,
//!   terminal statuses immutable
//! - **Concurrency Controller**: per-account locks acquired in fixed id
//!   order (deadlock avoidance)
//! - **Optimistic versions**: balance rows carry version counters; stale
//!   writes retry, bounded
//!
//! # Invariants
//!
//! - Conservation: a transfer never changes the total value held
//! - `balance >= 0` for every account at every observable point
//! - Exact decimal arithmetic end to end; no floating-point money
//! - At-most-once application per idempotency key
//!
//! # Example
//!
//! ```no_run
//! use transfer_core::{Config, TransferOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> transfer_core::Result<()> {
//!     let config = Config::default();
//!     let engine = TransferOrchestrator::open(config)?;
//!
//!     // let outcome = engine.initiate_transfer(request).await?;
//!
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod auth;
pub mod config;
pub mod directory;
pub mod error;
pub mod locks;
pub mod log;
pub mod metrics;
pub mod orchestrator;
pub mod storage;
pub mod store;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use orchestrator::{TransferOrchestrator, TransferRequest};
pub use types::{
    Account, AccountId, AccountNumber, AccountType, FailureReason, TransferId, TransferOutcome,
    TransferRecord, TransferStatus, UserId,
};
