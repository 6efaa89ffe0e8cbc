//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `transfers_applied_total` - Transfers that reached `APPLIED`
//! - `transfers_failed_total` - Transfers that reached `FAILED`
//! - `transfers_reversed_total` - Compensated transfers
//! - `transfer_retries_total` - Contention retries (version conflicts,
//!   lock timeouts)
//! - `transfer_apply_duration_seconds` - End-to-end `initiate_transfer`
//!   latency

use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};
use std::sync::Arc;

/// Metrics collector
///
/// Counters live in a per-instance registry rather than the process-global
/// one, so multiple engines (tests in particular) can coexist.
#[derive(Clone)]
pub struct Metrics {
    /// Transfers applied
    pub applied_total: IntCounter,

    /// Transfers failed
    pub failed_total: IntCounter,

    /// Transfers reversed
    pub reversed_total: IntCounter,

    /// Contention retries
    pub retries_total: IntCounter,

    /// Transfer latency histogram
    pub apply_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create a metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let applied_total = IntCounter::new(
            "transfers_applied_total",
            "Transfers that reached APPLIED",
        )?;
        registry.register(Box::new(applied_total.clone()))?;

        let failed_total =
            IntCounter::new("transfers_failed_total", "Transfers that reached FAILED")?;
        registry.register(Box::new(failed_total.clone()))?;

        let reversed_total =
            IntCounter::new("transfers_reversed_total", "Compensated transfers")?;
        registry.register(Box::new(reversed_total.clone()))?;

        let retries_total = IntCounter::new(
            "transfer_retries_total",
            "Contention retries (version conflicts, lock timeouts)",
        )?;
        registry.register(Box::new(retries_total.clone()))?;

        let apply_duration = Histogram::with_opts(
            HistogramOpts::new(
                "transfer_apply_duration_seconds",
                "End-to-end initiate_transfer latency",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(apply_duration.clone()))?;

        Ok(Self {
            applied_total,
            failed_total,
            reversed_total,
            retries_total,
            apply_duration,
            registry,
        })
    }
}
