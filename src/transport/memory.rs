// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process transport for tests and demos.
//!
//! Every [`MemoryTransport`] attached to the same [`MemoryNetwork`] is one
//! hop from every other. A request is offered to the other peers in attach
//! order; the first handler whose prefix matches and which does not decline
//! supplies the content. A request nobody answers waits out its timeout, as
//! it would on a real network.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::trace;

use super::{RequestHandler, Scope, Transport};
use crate::name::Name;

type Handlers = Arc<RwLock<Vec<(Name, Arc<dyn RequestHandler>)>>>;

#[derive(Default)]
struct NetworkInner {
    peers: RwLock<Vec<(u64, Handlers)>>,
    next_id: AtomicU64,
    requests: AtomicU64,
}

/// A shared in-memory network.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<NetworkInner>,
}

impl MemoryNetwork {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new peer.
    #[must_use]
    pub fn transport(&self) -> MemoryTransport {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let handlers: Handlers = Arc::default();
        self.inner.peers.write().push((id, Arc::clone(&handlers)));
        MemoryTransport {
            id,
            handlers,
            network: Arc::clone(&self.inner),
        }
    }

    /// Total requests issued on this network.
    #[must_use]
    pub fn request_count(&self) -> u64 {
        self.inner.requests.load(Ordering::Relaxed)
    }
}

/// One peer's endpoint on a [`MemoryNetwork`].
#[derive(Clone)]
pub struct MemoryTransport {
    id: u64,
    handlers: Handlers,
    network: Arc<NetworkInner>,
}

impl MemoryTransport {
    fn answer(&self, name: &Name) -> Option<Vec<u8>> {
        // Snapshot so handlers run without holding network locks
        let peers: Vec<Handlers> = self
            .network
            .peers
            .read()
            .iter()
            .filter(|(id, _)| *id != self.id)
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handlers in peers {
            let matching: Vec<Arc<dyn RequestHandler>> = handlers
                .read()
                .iter()
                .filter(|(prefix, _)| prefix.is_prefix_of(name))
                .map(|(_, h)| Arc::clone(h))
                .collect();
            if let Some(content) = matching.iter().find_map(|h| h.handle(name)) {
                return Some(content);
            }
        }
        None
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("id", &self.id)
            .field("handlers", &self.handlers.read().len())
            .finish()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn request(&self, name: &Name, _scope: Scope, timeout: Duration) -> Option<Vec<u8>> {
        self.network.requests.fetch_add(1, Ordering::Relaxed);
        match self.answer(name) {
            Some(content) => {
                trace!(peer = self.id, %name, bytes = content.len(), "Request answered");
                Some(content)
            }
            None => {
                trace!(peer = self.id, %name, "Request unanswered");
                tokio::time::sleep(timeout).await;
                None
            }
        }
    }

    fn respond_if_requested(&self, prefix: Name, handler: Arc<dyn RequestHandler>) {
        let mut handlers = self.handlers.write();
        handlers.retain(|(p, _)| *p != prefix);
        handlers.push((prefix, handler));
    }

    fn stop_responding(&self, prefix: &Name) {
        self.handlers.write().retain(|(p, _)| p != prefix);
    }
}
