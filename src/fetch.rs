// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Node fetching.
//!
//! Walkers obtain nodes through a [`NodeSource`]. The protocol-backed source,
//! [`ProtocolFetcher`], answers from the node cache when it can and
//! otherwise issues node-fetch requests. Each outstanding digest moves
//! through a small state machine:
//!
//! ```text
//!            ┌──────────► Satisfied   (verified, cached, waiters woken)
//!  Pending ──┼──────────► TimedOut    (after the retry budget is spent)
//!            └──────────► Rejected    (mismatched or undecodable content)
//! ```
//!
//! Concurrent requests for the same digest share one fetch. The fetch runs
//! as a detached task, so a walk that is cancelled mid-fetch still leaves
//! the node in the cache for the next one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::digest::Digest;
use crate::error::SyncError;
use crate::merkle::{NodeCache, TreeNode};
use crate::metrics::{self, LatencyTimer};
use crate::protocol;
use crate::resilience::retry::{retry_when, RetryConfig};
use crate::slice::Slice;
use crate::transport::{Scope, Transport};

/// Anything that can produce a node by digest.
#[async_trait]
pub trait NodeSource: Send + Sync {
    async fn fetch_node(&self, digest: Digest) -> Result<Arc<TreeNode>, SyncError>;
}

/// State of one outstanding fetch.
#[derive(Debug, Clone)]
pub enum FetchState {
    Pending,
    Satisfied(Arc<TreeNode>),
    TimedOut,
    Rejected(SyncError),
}

impl FetchState {
    fn into_result(self, digest: Digest) -> Option<Result<Arc<TreeNode>, SyncError>> {
        match self {
            Self::Pending => None,
            Self::Satisfied(node) => Some(Ok(node)),
            Self::TimedOut => Some(Err(SyncError::Timeout {
                what: "node-fetch",
                digest: Some(digest),
            })),
            Self::Rejected(err) => Some(Err(err)),
        }
    }
}

/// Fetches nodes of one slice over a [`Transport`].
#[derive(Clone)]
pub struct ProtocolFetcher {
    transport: Arc<dyn Transport>,
    slice: Slice,
    cache: Arc<NodeCache>,
    timeout: Duration,
    retry: RetryConfig,
    pending: Arc<DashMap<Digest, watch::Receiver<FetchState>>>,
}

impl ProtocolFetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        slice: Slice,
        cache: Arc<NodeCache>,
        timeout: Duration,
        retry: RetryConfig,
    ) -> Self {
        Self {
            transport,
            slice,
            cache,
            timeout,
            retry,
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Same slice, cache and in-flight table with new limits.
    #[must_use]
    pub fn reconfigured(&self, timeout: Duration, retry: RetryConfig) -> Self {
        Self {
            timeout,
            retry,
            ..self.clone()
        }
    }

    /// Digests currently being fetched.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    fn spawn_fetch(&self, digest: Digest, tx: watch::Sender<FetchState>) {
        let this = self.clone();
        tokio::spawn(async move {
            let result = retry_when(
                "node-fetch",
                &this.retry,
                || this.attempt(digest),
                SyncError::is_retryable,
            )
            .await;
            let state = match result {
                Ok(node) => FetchState::Satisfied(node),
                Err(SyncError::Timeout { .. }) => FetchState::TimedOut,
                Err(err) => FetchState::Rejected(err),
            };
            tx.send_replace(state);
            this.pending.remove(&digest);
        });
    }

    async fn attempt(&self, digest: Digest) -> Result<Arc<TreeNode>, SyncError> {
        let _timer = LatencyTimer::new("node_fetch");
        let name = protocol::node_fetch_name(&self.slice, &digest);
        let Some(bytes) = self.transport.request(&name, Scope::Any, self.timeout).await else {
            metrics::record_exchange("node_fetch", "timeout");
            debug!(%digest, "Node fetch timed out");
            return Err(SyncError::Timeout {
                what: "node-fetch",
                digest: Some(digest),
            });
        };
        match self.cache.put_verified(digest, &bytes) {
            Ok(node) => {
                metrics::record_exchange("node_fetch", "satisfied");
                Ok(node)
            }
            Err(err) => {
                metrics::record_exchange("node_fetch", err.kind());
                warn!(%digest, error = %err, "Discarding node-fetch response");
                Err(err)
            }
        }
    }
}

#[async_trait]
impl NodeSource for ProtocolFetcher {
    async fn fetch_node(&self, digest: Digest) -> Result<Arc<TreeNode>, SyncError> {
        if let Some(node) = self.cache.get(&digest) {
            return Ok(node);
        }

        let mut rx = match self.pending.entry(digest) {
            Entry::Occupied(entry) => {
                metrics::record_fetch_coalesced();
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                // Re-check under the entry lock, a fetch may have just landed
                if let Some(node) = self.cache.get(&digest) {
                    return Ok(node);
                }
                let (tx, rx) = watch::channel(FetchState::Pending);
                entry.insert(rx.clone());
                self.spawn_fetch(digest, tx);
                rx
            }
        };

        loop {
            let state = rx.borrow_and_update().clone();
            if let Some(result) = state.into_result(digest) {
                return result;
            }
            if rx.changed().await.is_err() {
                // Sender gone without a verdict
                return self.cache.get(&digest).ok_or(SyncError::Timeout {
                    what: "node-fetch",
                    digest: Some(digest),
                });
            }
        }
    }
}
