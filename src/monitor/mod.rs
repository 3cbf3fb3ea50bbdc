// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync monitor.
//!
//! The [`SyncMonitor`] owns the slice registry and ties the pieces together:
//! - answers root-advise and node-fetch requests for open slices
//! - polls peers with root-advise while a slice has listeners
//! - walks newly advised roots and hands discovered names to listeners
//! - rebuilds the local tree when the application publishes names
//!
//! # Lifecycle
//!
//! ```text
//! open_slice / first register_listener ──► Idle ──► Polling ⇄ Reconciling
//! last remove_listener ──► Idle (or released if never opened explicitly)
//! close_slice / shutdown ──► Closed
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ndn_sync::{Listener, MemoryNetwork, Slice, SyncConfig, SyncEvent, SyncMonitor};
//! use tokio::sync::watch;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let net = MemoryNetwork::new();
//! let (_tx, rx) = watch::channel(SyncConfig::default());
//! let monitor = SyncMonitor::new(Arc::new(net.transport()), rx);
//!
//! let slice = Slice::new("/lan".parse().unwrap(), "/photos".parse().unwrap(), vec![]).unwrap();
//! let (listener, mut events) = Listener::channel(64);
//! monitor.register_listener(&listener, &slice, None, None);
//!
//! while let Some(SyncEvent::Name(name)) = events.recv().await {
//!     println!("peer has {name}");
//! }
//! # }
//! ```

mod api;
mod lifecycle;
mod poll;
mod responder;
mod types;

pub use types::{Listener, ListenerId, SliceStatus, SyncEvent};

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::SyncConfig;
use crate::digest::Digest;
use crate::fetch::ProtocolFetcher;
use crate::merkle::NodeCache;
use crate::metrics;
use crate::name::Name;
use crate::slice::Slice;
use crate::transport::Transport;

/// Name-set synchronization over a request/response transport.
///
/// Cheap to clone; clones share the registry. Call [`SyncMonitor::shutdown`]
/// to stop background tasks.
#[derive(Clone)]
pub struct SyncMonitor {
    pub(super) inner: Arc<MonitorInner>,
}

pub(super) struct MonitorInner {
    pub(super) transport: Arc<dyn Transport>,

    /// Runtime config updates, re-read at every poll
    pub(super) config_rx: watch::Receiver<SyncConfig>,

    /// Open slices by slice hash
    pub(super) slices: Mutex<HashMap<Digest, SliceState>>,
}

/// Registry entry for one open slice.
pub(super) struct SliceState {
    pub(super) shared: Arc<SliceShared>,
    pub(super) registrations: Vec<Registration>,
    pub(super) poller: Option<JoinHandle<()>>,
    /// Opened explicitly, survives the last listener leaving
    pub(super) pinned: bool,
}

/// Per-slice state shared with background tasks and the responder.
pub(super) struct SliceShared {
    pub(super) slice: Slice,
    pub(super) cache: Arc<NodeCache>,
    pub(super) fetcher: ProtocolFetcher,
    /// Root of the locally built tree (single writer: publish path)
    pub(super) local_root: RwLock<Option<Digest>>,
    /// Last remote root walked to completion
    pub(super) remote_root: RwLock<Option<Digest>>,
    pub(super) status: watch::Sender<SliceStatus>,
}

impl SliceShared {
    pub(super) fn set_status(&self, status: SliceStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            metrics::set_slice_status(status.as_str());
        }
    }

    /// Move from `from` to `to`, leaving any other status alone.
    pub(super) fn transition(&self, from: SliceStatus, to: SliceStatus) -> bool {
        let changed = self.status.send_if_modified(|status| {
            if *status == from {
                *status = to;
                true
            } else {
                false
            }
        });
        if changed {
            metrics::set_slice_status(to.as_str());
        }
        changed
    }

    /// Whether the locally built tree already holds `name`.
    pub(super) fn has_locally(&self, name: &Name) -> bool {
        self.local_root
            .read()
            .is_some_and(|root| self.cache.contains_name(&root, name))
    }
}

/// One listener's subscription to one slice.
pub(super) struct Registration {
    pub(super) listener: Listener,
    /// Names before this are not delivered
    pub(super) floor: Option<Name>,
    pub(super) catch_up: Option<JoinHandle<()>>,
}

impl Registration {
    pub(super) fn wants(&self, name: &Name) -> bool {
        self.floor.as_ref().map_or(true, |floor| name >= floor)
            && !self.listener.exclusions().contains(name)
    }
}

impl MonitorInner {
    pub(super) fn config(&self) -> SyncConfig {
        self.config_rx.borrow().clone()
    }

    pub(super) fn update_gauges(slices: &HashMap<Digest, SliceState>) {
        metrics::set_open_slices(slices.len());
        metrics::set_listeners(slices.values().map(|s| s.registrations.len()).sum());
    }
}
