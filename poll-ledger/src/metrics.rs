//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `poll_ledger_polls_created_total` - Total polls created
//! - `poll_ledger_ballots_cast_total` - Total ballots accepted
//! - `poll_ledger_ballots_rejected_total` - Rejected ballots, by failure kind
//! - `poll_ledger_polls_swept_total` - Polls expired by the sweep
//! - `poll_ledger_cast_duration_seconds` - Histogram of cast latencies

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Total polls created
    pub polls_created: IntCounter,

    /// Total ballots accepted
    pub ballots_cast: IntCounter,

    /// Rejected ballots, labelled by failure kind
    pub ballots_rejected: IntCounterVec,

    /// Polls flipped to ended by the expiry sweep
    pub polls_swept: IntCounter,

    /// Cast latency histogram
    pub cast_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let polls_created = IntCounter::with_opts(Opts::new(
            "poll_ledger_polls_created_total",
            "Total polls created",
        ))?;
        registry.register(Box::new(polls_created.clone()))?;

        let ballots_cast = IntCounter::with_opts(Opts::new(
            "poll_ledger_ballots_cast_total",
            "Total ballots accepted",
        ))?;
        registry.register(Box::new(ballots_cast.clone()))?;

        let ballots_rejected = IntCounterVec::new(
            Opts::new(
                "poll_ledger_ballots_rejected_total",
                "Rejected ballots by failure kind",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(ballots_rejected.clone()))?;

        let polls_swept = IntCounter::with_opts(Opts::new(
            "poll_ledger_polls_swept_total",
            "Polls expired by the sweep",
        ))?;
        registry.register(Box::new(polls_swept.clone()))?;

        let cast_duration = Histogram::with_opts(
            HistogramOpts::new(
                "poll_ledger_cast_duration_seconds",
                "Histogram of cast latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(cast_duration.clone()))?;

        Ok(Self {
            polls_created,
            ballots_cast,
            ballots_rejected,
            polls_swept,
            cast_duration,
            registry,
        })
    }

    /// Record poll creation
    pub fn record_poll_created(&self) {
        self.polls_created.inc();
    }

    /// Record accepted ballot
    pub fn record_ballot_cast(&self) {
        self.ballots_cast.inc();
    }

    /// Record rejected ballot
    pub fn record_ballot_rejected(&self, reason: &str) {
        self.ballots_rejected.with_label_values(&[reason]).inc();
    }

    /// Record sweep result
    pub fn record_swept(&self, count: u64) {
        self.polls_swept.inc_by(count);
    }

    /// Record cast latency
    pub fn record_cast_duration(&self, duration_seconds: f64) {
        self.cast_duration.observe(duration_seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
