// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the sync monitor.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::digest::Digest;
use crate::error::SyncError;
use crate::name::Name;

/// Per-slice lifecycle state.
///
/// ```text
/// Idle → Polling ⇄ Reconciling
///   ↑       │
///   └───────┘ (last listener removed)        any → Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceStatus {
    /// Open, nobody listening
    Idle,
    /// Periodically asking peers for their root
    Polling,
    /// Walking a newly advised remote root
    Reconciling,
    /// Slice closed, its state released
    Closed,
}

impl SliceStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Polling => "Polling",
            Self::Reconciling => "Reconciling",
            Self::Closed => "Closed",
        }
    }
}

impl std::fmt::Display for SliceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a listener receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A name a peer has that this side did not.
    Name(Name),
    /// A walk of `root` ended with some subtrees unobtained. Each failed
    /// subtree is listed once.
    Partial {
        root: Digest,
        failed: Vec<(Digest, SyncError)>,
    },
}

/// Stable identity of a listener, shared by its clones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

static NEXT_LISTENER: AtomicU64 = AtomicU64::new(1);

/// The sending half of a subscription.
///
/// Clones share an id, so registering a clone of an already registered
/// listener is a no-op.
#[derive(Debug, Clone)]
pub struct Listener {
    id: ListenerId,
    tx: mpsc::Sender<SyncEvent>,
    exclude: Arc<BTreeSet<Name>>,
}

impl Listener {
    /// Wrap an existing sender.
    #[must_use]
    pub fn new(tx: mpsc::Sender<SyncEvent>) -> Self {
        Self {
            id: ListenerId(NEXT_LISTENER.fetch_add(1, Ordering::Relaxed)),
            tx,
            exclude: Arc::default(),
        }
    }

    /// Create a listener and the receiver its events arrive on.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SyncEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Names this listener already has and never wants delivered.
    #[must_use]
    pub fn excluding(mut self, names: BTreeSet<Name>) -> Self {
        self.exclude = Arc::new(names);
        self
    }

    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    #[must_use]
    pub fn exclusions(&self) -> &BTreeSet<Name> {
        &self.exclude
    }

    /// The receiver has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Deliver an event, waiting for room. `false` once the receiver is gone.
    pub(crate) async fn send(&self, event: SyncEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }
}
