// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Request/response transport boundary.
//!
//! The sync engine never talks to the network directly. It issues named
//! requests through a [`Transport`] and registers [`RequestHandler`]s to
//! answer requests from peers. Any transport with "ask by name, get bytes or
//! nothing" semantics fits: an NDN face, a test harness, or the in-process
//! [`MemoryNetwork`].
//!
//! Duplicate and late responses are harmless: everything the engine receives
//! is content-addressed and cached idempotently.

mod memory;

pub use memory::{MemoryNetwork, MemoryTransport};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::name::Name;

/// How far a request may travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Directly connected peers only (one hop).
    Adjacent,
    /// Wherever the transport can route it.
    Any,
}

/// Answers incoming requests. `None` declines, letting another peer answer
/// or the request time out.
pub trait RequestHandler: Send + Sync {
    fn handle(&self, name: &Name) -> Option<Vec<u8>>;
}

impl<F> RequestHandler for F
where
    F: Fn(&Name) -> Option<Vec<u8>> + Send + Sync,
{
    fn handle(&self, name: &Name) -> Option<Vec<u8>> {
        self(name)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and wait up to `timeout` for content. `None` means no
    /// peer answered in time.
    async fn request(&self, name: &Name, scope: Scope, timeout: Duration) -> Option<Vec<u8>>;

    /// Answer requests under `prefix` with `handler`, replacing any handler
    /// already registered for exactly that prefix.
    fn respond_if_requested(&self, prefix: Name, handler: Arc<dyn RequestHandler>);

    /// Stop answering requests under `prefix`.
    fn stop_responding(&self, prefix: &Name);
}
