// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for ndn-sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding process is responsible for choosing the exporter.
//!
//! # Metric Naming Convention
//! - `ndn_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `exchange`: root_advise, node_fetch
//! - `outcome`: satisfied, timeout, digest_mismatch, malformed, ...
//! - `status`: complete, partial, cancelled

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

// ═══════════════════════════════════════════════════════════════════════════
// PROTOCOL EXCHANGES
// ═══════════════════════════════════════════════════════════════════════════

/// Record the outcome of one root-advise or node-fetch attempt
pub fn record_exchange(exchange: &'static str, outcome: &'static str) {
    counter!(
        "ndn_sync_exchanges_total",
        "exchange" => exchange,
        "outcome" => outcome
    )
    .increment(1);
}

/// Record exchange latency
pub fn record_exchange_latency(exchange: &'static str, duration: Duration) {
    histogram!(
        "ndn_sync_exchange_seconds",
        "exchange" => exchange
    )
    .record(duration.as_secs_f64());
}

/// Record a fetch that piggybacked on one already in flight
pub fn record_fetch_coalesced() {
    counter!("ndn_sync_fetches_coalesced_total").increment(1);
}

/// Record a request answered (or declined) by the local responder
pub fn record_request_served(exchange: &'static str, answered: bool) {
    let outcome = if answered { "answered" } else { "declined" };
    counter!(
        "ndn_sync_requests_served_total",
        "exchange" => exchange,
        "outcome" => outcome
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// RECONCILIATION
// ═══════════════════════════════════════════════════════════════════════════

/// Record a finished walk
pub fn record_walk(status: &'static str, duration: Duration) {
    counter!(
        "ndn_sync_walks_total",
        "status" => status
    )
    .increment(1);
    histogram!("ndn_sync_walk_seconds").record(duration.as_secs_f64());
}

/// Record names discovered by walks
pub fn record_names_discovered(count: usize) {
    counter!("ndn_sync_names_discovered_total").increment(count as u64);
}

/// Record names handed to listeners
pub fn record_names_delivered(count: usize) {
    counter!("ndn_sync_names_delivered_total").increment(count as u64);
}

// ═══════════════════════════════════════════════════════════════════════════
// TREE + CACHE
// ═══════════════════════════════════════════════════════════════════════════

/// Record a local tree build
pub fn record_build(duration: Duration, nodes_written: usize, nodes_reused: usize) {
    histogram!("ndn_sync_build_seconds").record(duration.as_secs_f64());
    counter!("ndn_sync_build_nodes_written_total").increment(nodes_written as u64);
    counter!("ndn_sync_build_nodes_reused_total").increment(nodes_reused as u64);
}

/// Record nodes added to a node cache
pub fn record_nodes_cached(count: usize) {
    counter!("ndn_sync_cache_nodes_inserted_total").increment(count as u64);
}

/// Record bytes rejected because they failed verification
pub fn record_rejected(reason: &'static str) {
    counter!(
        "ndn_sync_nodes_rejected_total",
        "reason" => reason
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// REGISTRY
// ═══════════════════════════════════════════════════════════════════════════

/// Set number of open slices
pub fn set_open_slices(count: usize) {
    gauge!("ndn_sync_open_slices").set(count as f64);
}

/// Set number of registered listeners across all slices
pub fn set_listeners(count: usize) {
    gauge!("ndn_sync_listeners").set(count as f64);
}

/// Record a slice status transition
pub fn set_slice_status(status: &'static str) {
    counter!(
        "ndn_sync_slice_transitions_total",
        "status" => status
    )
    .increment(1);
}

/// A timing guard that records exchange latency on drop
pub struct LatencyTimer {
    exchange: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    #[must_use]
    pub fn new(exchange: &'static str) -> Self {
        Self {
            exchange,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_exchange_latency(self.exchange, self.start.elapsed());
    }
}
