// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the sync monitor.
//!
//! # Example
//!
//! ```
//! use ndn_sync::SyncConfig;
//!
//! // Defaults
//! let config = SyncConfig::default();
//! assert_eq!(config.root_advise_timeout_ms, 20_000);
//! assert_eq!(config.node_split_trigger, 4000);
//!
//! // Tuned for a fast local network
//! let config = SyncConfig {
//!     poll_interval_ms: 500,
//!     node_fetch_timeout_ms: 250,
//!     ..Default::default()
//! };
//! assert_eq!(config.fetch_retries, 3);
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::merkle::SplitPolicy;
use crate::resilience::retry::RetryConfig;

/// Configuration for the sync monitor.
///
/// Every field has a default, so an empty document deserializes to
/// [`SyncConfig::default`]. The monitor re-reads the config through a
/// `tokio::sync::watch` channel at each poll.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SyncConfig {
    /// How long a root-advise waits for any peer to answer (default: 20 s)
    #[serde(default = "default_root_advise_timeout_ms")]
    pub root_advise_timeout_ms: u64,

    /// How long one node-fetch attempt waits (default: 4 s)
    #[serde(default = "default_node_fetch_timeout_ms")]
    pub node_fetch_timeout_ms: u64,

    /// Pause between root-advise rounds for a slice
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Attempts per node before a branch is abandoned
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: usize,

    /// Initial backoff between node-fetch attempts
    #[serde(default = "default_fetch_retry_delay_ms")]
    pub fetch_retry_delay_ms: u64,

    /// Node fetches a single walk keeps in flight
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Capacity of each listener's event channel
    #[serde(default = "default_listener_channel_capacity")]
    pub listener_channel_capacity: usize,

    /// Encoded node size above which the builder splits (bytes)
    #[serde(default = "default_node_split_trigger")]
    pub node_split_trigger: usize,

    /// Split-byte threshold that marks a range boundary
    #[serde(default = "default_hash_split_trigger")]
    pub hash_split_trigger: u8,
}

fn default_root_advise_timeout_ms() -> u64 { 20_000 }
fn default_node_fetch_timeout_ms() -> u64 { 4_000 }
fn default_poll_interval_ms() -> u64 { 4_000 }
fn default_fetch_retries() -> usize { 3 }
fn default_fetch_retry_delay_ms() -> u64 { 100 }
fn default_max_concurrent_fetches() -> usize { 16 }
fn default_listener_channel_capacity() -> usize { 1024 }
fn default_node_split_trigger() -> usize { crate::merkle::NODE_SPLIT_TRIGGER }
fn default_hash_split_trigger() -> u8 { crate::merkle::HASH_SPLIT_TRIGGER }

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            root_advise_timeout_ms: default_root_advise_timeout_ms(),
            node_fetch_timeout_ms: default_node_fetch_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            fetch_retries: default_fetch_retries(),
            fetch_retry_delay_ms: default_fetch_retry_delay_ms(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            listener_channel_capacity: default_listener_channel_capacity(),
            node_split_trigger: default_node_split_trigger(),
            hash_split_trigger: default_hash_split_trigger(),
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn root_advise_timeout(&self) -> Duration {
        Duration::from_millis(self.root_advise_timeout_ms)
    }

    #[must_use]
    pub fn node_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.node_fetch_timeout_ms)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Retry policy for node fetches.
    #[must_use]
    pub fn fetch_retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: Some(self.fetch_retries.max(1)),
            initial_delay: Duration::from_millis(self.fetch_retry_delay_ms),
            ..RetryConfig::node_fetch()
        }
    }

    /// Split thresholds for the node builder.
    #[must_use]
    pub fn split_policy(&self) -> SplitPolicy {
        SplitPolicy {
            node_split_trigger: self.node_split_trigger,
            hash_split_trigger: self.hash_split_trigger,
        }
    }
}
