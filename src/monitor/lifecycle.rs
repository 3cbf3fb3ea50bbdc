// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Registry lifecycle: slices and listeners coming and going.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tracing::{debug, info};

use super::responder::SliceResponder;
use super::{
    Listener, ListenerId, MonitorInner, Registration, SliceShared, SliceState, SliceStatus,
    SyncMonitor,
};
use crate::config::SyncConfig;
use crate::digest::Digest;
use crate::error::SyncError;
use crate::fetch::ProtocolFetcher;
use crate::merkle::NodeCache;
use crate::name::Name;
use crate::slice::Slice;
use crate::transport::Transport;

impl SyncMonitor {
    /// Create a monitor speaking over `transport`.
    ///
    /// `config_rx` carries runtime config updates; the current value is read
    /// at every poll.
    pub fn new(transport: Arc<dyn Transport>, config_rx: watch::Receiver<SyncConfig>) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                transport,
                config_rx,
                slices: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Open `slice` and keep it open until [`SyncMonitor::close_slice`],
    /// answering peers' requests even with no listeners. Idempotent.
    pub fn open_slice(&self, slice: &Slice) -> Arc<NodeCache> {
        let mut slices = self.inner.slices.lock();
        let state = self.inner.ensure_open(&mut slices, slice);
        state.pinned = true;
        let cache = Arc::clone(&state.shared.cache);
        MonitorInner::update_gauges(&slices);
        cache
    }

    /// Close `slice`: stop polling and walks, stop answering requests and
    /// drop all its listeners.
    ///
    /// # Errors
    ///
    /// [`SyncError::UnknownSlice`] if the slice is not open.
    pub fn close_slice(&self, slice: &Slice) -> Result<(), SyncError> {
        let mut slices = self.inner.slices.lock();
        let Some(state) = slices.remove(&slice.hash()) else {
            debug!(slice = %slice.hash(), "close_slice: slice not open");
            return Err(SyncError::UnknownSlice(slice.hash()));
        };
        self.inner.release(state);
        MonitorInner::update_gauges(&slices);
        Ok(())
    }

    /// Subscribe `listener` to names discovered in `slice`.
    ///
    /// The first listener opens the slice and starts root-advise polling.
    /// With `start_hash`, the tree under that root is first walked in full
    /// for this listener alone. Names ordered before `start_name` are never
    /// delivered to it. Registering an already registered listener is a
    /// logged no-op returning `false`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn register_listener(
        &self,
        listener: &Listener,
        slice: &Slice,
        start_hash: Option<Digest>,
        start_name: Option<Name>,
    ) -> bool {
        let config = self.inner.config();
        let mut slices = self.inner.slices.lock();
        let state = self.inner.ensure_open(&mut slices, slice);

        if state.registrations.iter().any(|r| r.listener.id() == listener.id()) {
            debug!(listener = %listener.id(), slice = %slice.hash(), "Listener already registered");
            return false;
        }

        let catch_up = start_hash.map(|root| {
            MonitorInner::spawn_catch_up(
                &state.shared,
                listener.clone(),
                root,
                start_name.clone(),
                &config,
            )
        });
        state.registrations.push(Registration {
            listener: listener.clone(),
            floor: start_name,
            catch_up,
        });

        if state.poller.is_none() {
            state.shared.set_status(SliceStatus::Polling);
            let inner = Arc::clone(&self.inner);
            let shared = Arc::clone(&state.shared);
            state.poller = Some(tokio::spawn(inner.poll_loop(shared)));
        }

        info!(
            listener = %listener.id(),
            slice = %slice.hash(),
            listeners = state.registrations.len(),
            catch_up = start_hash.is_some(),
            "Listener registered"
        );
        MonitorInner::update_gauges(&slices);
        true
    }

    /// Unsubscribe `listener` from `slice`. The last removal stops polling
    /// and cancels outstanding walks. Removing an unknown listener is a
    /// logged no-op returning `false`.
    pub fn remove_listener(&self, listener: &Listener, slice: &Slice) -> bool {
        let removed = self.inner.detach(slice.hash(), &[listener.id()]);
        if removed == 0 {
            debug!(listener = %listener.id(), slice = %slice.hash(), "Listener not registered");
            return false;
        }
        info!(listener = %listener.id(), slice = %slice.hash(), "Listener removed");
        true
    }

    /// Close every slice.
    pub fn shutdown(&self) {
        let mut slices = self.inner.slices.lock();
        let count = slices.len();
        for (_, state) in slices.drain() {
            self.inner.release(state);
        }
        MonitorInner::update_gauges(&slices);
        info!(slices = count, "Sync monitor shut down");
    }
}

impl MonitorInner {
    pub(super) fn ensure_open<'a>(
        &self,
        slices: &'a mut HashMap<Digest, SliceState>,
        slice: &Slice,
    ) -> &'a mut SliceState {
        match slices.entry(slice.hash()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let config = self.config();
                let cache = Arc::new(NodeCache::new());
                let fetcher = ProtocolFetcher::new(
                    Arc::clone(&self.transport),
                    slice.clone(),
                    Arc::clone(&cache),
                    config.node_fetch_timeout(),
                    config.fetch_retry(),
                );
                let (status, _) = watch::channel(SliceStatus::Idle);
                let shared = Arc::new(SliceShared {
                    slice: slice.clone(),
                    cache,
                    fetcher,
                    local_root: RwLock::new(None),
                    remote_root: RwLock::new(None),
                    status,
                });
                SliceResponder::register(self.transport.as_ref(), &shared);
                info!(
                    slice = %slice.hash(),
                    topology = %slice.topology(),
                    prefix = %slice.prefix(),
                    "Slice opened"
                );
                entry.insert(SliceState {
                    shared,
                    registrations: Vec::new(),
                    poller: None,
                    pinned: false,
                })
            }
        }
    }

    /// Remove the given listeners from a slice, winding it down if none are
    /// left. Returns how many were removed.
    pub(super) fn detach(&self, slice_hash: Digest, ids: &[ListenerId]) -> usize {
        let mut slices = self.slices.lock();
        let Some(state) = slices.get_mut(&slice_hash) else {
            return 0;
        };

        let before = state.registrations.len();
        state.registrations.retain_mut(|r| {
            let keep = !ids.contains(&r.listener.id());
            if !keep {
                if let Some(task) = r.catch_up.take() {
                    task.abort();
                }
            }
            keep
        });
        let removed = before - state.registrations.len();

        if removed > 0 && state.registrations.is_empty() {
            if let Some(poller) = state.poller.take() {
                poller.abort();
            }
            state.shared.set_status(SliceStatus::Idle);
            if !state.pinned {
                if let Some(state) = slices.remove(&slice_hash) {
                    self.release(state);
                }
            }
        }
        MonitorInner::update_gauges(&slices);
        removed
    }

    /// Tear down a slice already taken out of the registry.
    pub(super) fn release(&self, mut state: SliceState) {
        if let Some(poller) = state.poller.take() {
            poller.abort();
        }
        for registration in &mut state.registrations {
            if let Some(task) = registration.catch_up.take() {
                task.abort();
            }
        }
        SliceResponder::unregister(self.transport.as_ref(), &state.shared);
        state.shared.set_status(SliceStatus::Closed);
        info!(
            slice = %state.shared.slice.hash(),
            listeners = state.registrations.len(),
            "Slice closed"
        );
    }
}
