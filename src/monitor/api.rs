// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Publishing and read-only accessors.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use super::{MonitorInner, SliceStatus, SyncMonitor};
use crate::digest::Digest;
use crate::error::SyncError;
use crate::merkle::{BuiltTree, NodeBuilder, NodeCache};
use crate::metrics;
use crate::name::Name;
use crate::slice::Slice;

impl SyncMonitor {
    /// Rebuild the local tree of `slice` from the full set of names this
    /// side holds, and advertise its root to peers.
    ///
    /// Opens and pins the slice if needed. Names the slice does not accept
    /// are left out. Nodes unchanged since the previous build are reused.
    pub fn publish_names(&self, slice: &Slice, names: &BTreeSet<Name>) -> Result<BuiltTree, SyncError> {
        let config = self.inner.config();
        let shared = {
            let mut slices = self.inner.slices.lock();
            let state = self.inner.ensure_open(&mut slices, slice);
            state.pinned = true;
            let shared = Arc::clone(&state.shared);
            MonitorInner::update_gauges(&slices);
            shared
        };

        let accepted: BTreeSet<Name> = names.iter().filter(|n| slice.accepts(n)).cloned().collect();
        let rejected = names.len() - accepted.len();
        if rejected > 0 {
            metrics::record_rejected("outside_slice");
            debug!(slice = %slice.hash(), rejected, "Names outside the slice left unpublished");
        }

        let built = NodeBuilder::new(config.split_policy()).build(&accepted, &shared.cache)?;
        *shared.local_root.write() = Some(built.root);
        info!(
            slice = %slice.hash(),
            root = %built.root,
            names = accepted.len(),
            written = built.nodes_written,
            reused = built.nodes_reused,
            "Published local tree"
        );
        Ok(built)
    }

    /// Node cache of an open slice.
    #[must_use]
    pub fn node_cache(&self, slice: &Slice) -> Option<Arc<NodeCache>> {
        self.inner
            .slices
            .lock()
            .get(&slice.hash())
            .map(|s| Arc::clone(&s.shared.cache))
    }

    /// Root of the last published local tree.
    #[must_use]
    pub fn local_root(&self, slice: &Slice) -> Option<Digest> {
        self.inner
            .slices
            .lock()
            .get(&slice.hash())
            .and_then(|s| *s.shared.local_root.read())
    }

    /// Last remote root walked to completion.
    #[must_use]
    pub fn remote_root(&self, slice: &Slice) -> Option<Digest> {
        self.inner
            .slices
            .lock()
            .get(&slice.hash())
            .and_then(|s| *s.shared.remote_root.read())
    }

    /// Watch a slice's status. The receiver sees `Closed` when the slice
    /// goes away.
    #[must_use]
    pub fn status(&self, slice: &Slice) -> Option<watch::Receiver<SliceStatus>> {
        self.inner
            .slices
            .lock()
            .get(&slice.hash())
            .map(|s| s.shared.status.subscribe())
    }

    #[must_use]
    pub fn listener_count(&self, slice: &Slice) -> usize {
        self.inner
            .slices
            .lock()
            .get(&slice.hash())
            .map_or(0, |s| s.registrations.len())
    }

    /// Hashes of all open slices.
    #[must_use]
    pub fn open_slices(&self) -> Vec<Digest> {
        self.inner.slices.lock().keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::SyncConfig;
    use crate::monitor::Listener;
    use crate::protocol;
    use crate::transport::{MemoryNetwork, Scope, Transport};

    fn n(s: &str) -> Name {
        s.parse().unwrap()
    }

    fn slice() -> Slice {
        Slice::new(n("/lan"), n("/data"), vec![]).unwrap()
    }

    fn monitor(net: &MemoryNetwork) -> SyncMonitor {
        let config = SyncConfig {
            root_advise_timeout_ms: 50,
            node_fetch_timeout_ms: 20,
            poll_interval_ms: 50,
            ..Default::default()
        };
        let (_tx, rx) = watch::channel(config);
        SyncMonitor::new(Arc::new(net.transport()), rx)
    }

    #[test]
    fn test_publish_filters_and_sets_root() {
        let net = MemoryNetwork::new();
        let m = monitor(&net);
        let s = slice();
        let names: BTreeSet<Name> = [n("/data/a"), n("/data/b"), n("/elsewhere/c")].into();

        let built = m.publish_names(&s, &names).unwrap();
        assert_eq!(m.local_root(&s), Some(built.root));

        let cache = m.node_cache(&s).unwrap();
        assert!(cache.contains_name(&built.root, &n("/data/a")));
        assert!(!cache.contains_name(&built.root, &n("/elsewhere/c")));
        assert!(cache.is_fully_resolved(&built.root));
    }

    #[test]
    fn test_open_and_close_slice() {
        let net = MemoryNetwork::new();
        let m = monitor(&net);
        let s = slice();

        m.open_slice(&s);
        let status = m.status(&s).unwrap();
        assert_eq!(*status.borrow(), SliceStatus::Idle);
        assert_eq!(m.open_slices(), vec![s.hash()]);

        assert_eq!(m.close_slice(&s), Ok(()));
        assert_eq!(*status.borrow(), SliceStatus::Closed);
        assert!(m.open_slices().is_empty());
        assert_eq!(m.close_slice(&s), Err(SyncError::UnknownSlice(s.hash())));
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let net = MemoryNetwork::new();
        let m = monitor(&net);
        let s = slice();
        let (listener, _rx) = Listener::channel(8);

        assert!(m.register_listener(&listener, &s, None, None));
        assert!(!m.register_listener(&listener.clone(), &s, None, None));
        assert_eq!(m.listener_count(&s), 1);
        m.shutdown();
    }

    #[tokio::test]
    async fn test_remove_unknown_listener_is_noop() {
        let net = MemoryNetwork::new();
        let m = monitor(&net);
        let s = slice();
        let (listener, _rx) = Listener::channel(8);
        assert!(!m.remove_listener(&listener, &s));

        m.open_slice(&s);
        assert!(!m.remove_listener(&listener, &s));
        assert_eq!(m.open_slices().len(), 1);
    }

    #[tokio::test]
    async fn test_polling_starts_and_stops_with_listeners() {
        let net = MemoryNetwork::new();
        let m = monitor(&net);
        let s = slice();
        m.open_slice(&s);
        let status = m.status(&s).unwrap();

        let (listener, _rx) = Listener::channel(8);
        m.register_listener(&listener, &s, None, None);
        tokio::task::yield_now().await;
        assert_eq!(*status.borrow(), SliceStatus::Polling);

        assert!(m.remove_listener(&listener, &s));
        assert_eq!(*status.borrow(), SliceStatus::Idle);
        // Pinned by open_slice, so still open
        assert_eq!(m.open_slices(), vec![s.hash()]);
    }

    #[tokio::test]
    async fn test_implicit_slice_released_with_last_listener() {
        let net = MemoryNetwork::new();
        let m = monitor(&net);
        let s = slice();
        let (listener, _rx) = Listener::channel(8);

        m.register_listener(&listener, &s, None, None);
        let status = m.status(&s).unwrap();
        assert!(m.remove_listener(&listener, &s));
        assert!(m.open_slices().is_empty());
        assert_eq!(*status.borrow(), SliceStatus::Closed);
    }

    #[tokio::test]
    async fn test_responder_serves_published_root_and_nodes() {
        let net = MemoryNetwork::new();
        let m = monitor(&net);
        let s = slice();
        let peer = net.transport();
        let wait = Duration::from_millis(10);

        // Nothing published yet: nobody answers
        m.open_slice(&s);
        assert_eq!(peer.request(&protocol::root_advise_name(&s), Scope::Adjacent, wait).await, None);

        let names: BTreeSet<Name> = (0..10).map(|i| n(&format!("/data/{i}"))).collect();
        let built = m.publish_names(&s, &names).unwrap();
        let cache = m.node_cache(&s).unwrap();

        let advised = peer
            .request(&protocol::root_advise_name(&s), Scope::Adjacent, wait)
            .await
            .unwrap();
        assert_eq!(crate::digest::digest(&advised), built.root);

        let fetched = peer
            .request(&protocol::node_fetch_name(&s, &built.root), Scope::Any, wait)
            .await;
        assert_eq!(fetched, cache.get_encoded(&built.root));

        // Unknown digests are declined
        let missing = crate::digest::digest(b"missing");
        assert_eq!(
            peer.request(&protocol::node_fetch_name(&s, &missing), Scope::Any, wait).await,
            None
        );

        m.close_slice(&s).unwrap();
        assert_eq!(peer.request(&protocol::root_advise_name(&s), Scope::Adjacent, wait).await, None);
    }
}
