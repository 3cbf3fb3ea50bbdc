// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Background work per slice: root-advise polling, reconciliation walks and
//! catch-up walks for listeners that supplied a start hash.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Listener, MonitorInner, SliceShared, SliceStatus, SyncEvent};
use crate::config::SyncConfig;
use crate::digest::{digest, Digest};
use crate::error::SyncError;
use crate::merkle::NodeCache;
use crate::metrics::{self, LatencyTimer};
use crate::name::Name;
use crate::protocol;
use crate::reconcile::{Reconciler, WalkOptions, WalkReport};
use crate::resilience::retry::{retry_when, RetryConfig};
use crate::transport::Scope;

impl MonitorInner {
    /// Poll until aborted by the lifecycle code.
    pub(super) async fn poll_loop(self: Arc<Self>, shared: Arc<SliceShared>) {
        info!(slice = %shared.slice.hash(), "Polling started");
        loop {
            let config = self.config();
            match self.root_advise(&shared, &config).await {
                Ok(root) => {
                    let walked = *shared.remote_root.read();
                    let local = *shared.local_root.read();
                    if walked != Some(root) && local != Some(root) {
                        self.reconcile(&shared, root, &config).await;
                    }
                }
                Err(err @ SyncError::Timeout { .. }) => {
                    debug!(slice = %shared.slice.hash(), error = %err, "No root advised");
                }
                Err(err) => {
                    warn!(slice = %shared.slice.hash(), error = %err, "Root advise failed");
                }
            }

            tokio::time::sleep(config.poll_interval()).await;
        }
    }

    /// Ask adjacent peers for their root and cache the advised node.
    async fn root_advise(&self, shared: &SliceShared, config: &SyncConfig) -> Result<Digest, SyncError> {
        let name = &protocol::root_advise_name(&shared.slice);
        let timeout = config.root_advise_timeout();
        retry_when(
            "root-advise",
            &RetryConfig::root_advise(),
            || async move {
                let _timer = LatencyTimer::new("root_advise");
                let Some(bytes) = self.transport.request(name, Scope::Adjacent, timeout).await else {
                    metrics::record_exchange("root_advise", "timeout");
                    return Err(SyncError::Timeout {
                        what: "root-advise",
                        digest: None,
                    });
                };
                let root = digest(&bytes);
                match shared.cache.put_verified(root, &bytes) {
                    Ok(_) => {
                        metrics::record_exchange("root_advise", "satisfied");
                        Ok(root)
                    }
                    Err(err) => {
                        metrics::record_exchange("root_advise", err.kind());
                        Err(err)
                    }
                }
            },
            SyncError::is_retryable,
        )
        .await
    }

    /// Walk a newly advised root and fan names out to the slice's listeners.
    async fn reconcile(&self, shared: &Arc<SliceShared>, root: Digest, config: &SyncConfig) {
        // Idle or Closed means the last listener left while we were asking
        if !shared.transition(SliceStatus::Polling, SliceStatus::Reconciling) {
            return;
        }
        let slice_hash = shared.slice.hash();
        let advertised = shared.cache.entry(&root).map_or(0, |entry| entry.leaf_count);
        info!(slice = %slice_hash, %root, names = advertised, "Reconciling advised root");

        let walker = Reconciler::new(
            Arc::new(
                shared
                    .fetcher
                    .reconfigured(config.node_fetch_timeout(), config.fetch_retry()),
            ),
            Arc::clone(&shared.cache),
            WalkOptions {
                skip_resolved: true,
                max_concurrent: config.max_concurrent_fetches,
                slice: Some(shared.slice.clone()),
                ..Default::default()
            },
        );

        let (tx, mut rx) = mpsc::channel(config.listener_channel_capacity.max(1));
        let walk = async move {
            let report = walker.run(root, &tx).await;
            drop(tx);
            report
        };
        let deliver = async {
            let mut delivered = 0;
            while let Some(name) = rx.recv().await {
                if shared.has_locally(&name) {
                    continue;
                }
                let mut closed = Vec::new();
                for listener in self.targets(slice_hash, &name) {
                    if listener.send(SyncEvent::Name(name.clone())).await {
                        delivered += 1;
                    } else {
                        closed.push(listener.id());
                    }
                }
                if !closed.is_empty() {
                    debug!(slice = %slice_hash, closed = closed.len(), "Dropping closed listeners");
                    self.detach(slice_hash, &closed);
                }
            }
            delivered
        };
        let (report, delivered) = tokio::join!(walk, deliver);
        metrics::record_names_delivered(delivered);

        if report.is_complete() {
            *shared.remote_root.write() = Some(root);
        } else if !report.failed.is_empty() {
            let event = partial_event(&report);
            for listener in self.all_listeners(slice_hash) {
                listener.send(event.clone()).await;
            }
        }
        info!(
            slice = %slice_hash,
            %root,
            discovered = report.discovered,
            delivered,
            failed = report.failed.len(),
            "Reconciliation finished"
        );
        shared.transition(SliceStatus::Reconciling, SliceStatus::Polling);
    }

    /// Listeners of a slice that want `name`.
    fn targets(&self, slice_hash: Digest, name: &Name) -> Vec<Listener> {
        let slices = self.slices.lock();
        slices.get(&slice_hash).map_or_else(Vec::new, |state| {
            state
                .registrations
                .iter()
                .filter(|r| r.wants(name))
                .map(|r| r.listener.clone())
                .collect()
        })
    }

    fn all_listeners(&self, slice_hash: Digest) -> Vec<Listener> {
        let slices = self.slices.lock();
        slices.get(&slice_hash).map_or_else(Vec::new, |state| {
            state.registrations.iter().map(|r| r.listener.clone()).collect()
        })
    }

    /// Walk the tree under `root` in full for one new listener.
    pub(super) fn spawn_catch_up(
        shared: &Arc<SliceShared>,
        listener: Listener,
        root: Digest,
        floor: Option<Name>,
        config: &SyncConfig,
    ) -> JoinHandle<()> {
        let fetcher = shared
            .fetcher
            .reconfigured(config.node_fetch_timeout(), config.fetch_retry());
        // Private resolved set: marks from this walk must not hide names
        // from the shared poll walk
        let walker = Reconciler::new(
            Arc::new(fetcher),
            Arc::new(NodeCache::new()),
            WalkOptions {
                floor,
                exclude: listener.exclusions().clone(),
                skip_resolved: false,
                max_concurrent: config.max_concurrent_fetches,
                slice: Some(shared.slice.clone()),
            },
        );
        let capacity = config.listener_channel_capacity.max(1);
        let slice_hash = shared.slice.hash();

        tokio::spawn(async move {
            let (tx, mut rx) = mpsc::channel(capacity);
            let walk = async move {
                let report = walker.run(root, &tx).await;
                drop(tx);
                report
            };
            let target = listener.clone();
            let forward = async move {
                let mut delivered = 0;
                while let Some(name) = rx.recv().await {
                    if !target.send(SyncEvent::Name(name)).await {
                        break;
                    }
                    delivered += 1;
                }
                delivered
            };
            let (report, delivered) = tokio::join!(walk, forward);
            metrics::record_names_delivered(delivered);

            if !report.failed.is_empty() {
                listener.send(partial_event(&report)).await;
            }
            info!(
                slice = %slice_hash,
                listener = %listener.id(),
                %root,
                delivered,
                failed = report.failed.len(),
                "Catch-up walk finished"
            );
        })
    }
}

fn partial_event(report: &WalkReport) -> SyncEvent {
    SyncEvent::Partial {
        root: report.root,
        failed: report.failed.clone(),
    }
}
