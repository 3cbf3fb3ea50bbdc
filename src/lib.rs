//! # NDN Sync
//!
//! Name-set synchronization for named-data networks. Peers that share a
//! [`Slice`] (a topology to exchange on plus a data prefix with optional
//! filter clauses) each summarize the names they hold as a content-addressed
//! tree, and learn each other's names by comparing trees top down.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       SyncMonitor                           │
//! │  • Slice registry, listeners, per-slice status              │
//! │  • Answers root-advise / node-fetch for open slices         │
//! │  • Polls adjacent peers with root-advise                    │
//! └─────────────────────────────────────────────────────────────┘
//!            │ publish_names                 │ advised root
//!            ▼                               ▼
//! ┌──────────────────────────┐   ┌──────────────────────────────┐
//! │       NodeBuilder        │   │         Reconciler           │
//! │  • prefix-stable splits  │   │  • bounded concurrent walk   │
//! │  • reuses cached nodes   │   │  • skips resolved subtrees   │
//! └──────────────────────────┘   └──────────────────────────────┘
//!            │                               │ ProtocolFetcher
//!            ▼                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  NodeCache (per slice)                      │
//! │  • digest → node, verified on insert                        │
//! │  • explicit fully-resolved marks                            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                  Transport (request / respond)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::collections::BTreeSet;
//! use std::sync::Arc;
//! use ndn_sync::{Listener, MemoryNetwork, Name, Slice, SyncConfig, SyncEvent, SyncMonitor};
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() {
//!     let net = MemoryNetwork::new();
//!     let (_tx, rx) = watch::channel(SyncConfig::default());
//!     let alice = SyncMonitor::new(Arc::new(net.transport()), rx.clone());
//!     let bob = SyncMonitor::new(Arc::new(net.transport()), rx);
//!
//!     let slice = Slice::new("/lan".parse().unwrap(), "/notes".parse().unwrap(), vec![]).unwrap();
//!     let names: BTreeSet<Name> = ["/notes/1", "/notes/2"].iter().map(|s| s.parse().unwrap()).collect();
//!     alice.publish_names(&slice, &names).expect("publish");
//!
//!     let (listener, mut events) = Listener::channel(64);
//!     bob.register_listener(&listener, &slice, None, None);
//!     while let Some(SyncEvent::Name(name)) = events.recv().await {
//!         println!("bob learned {name}");
//!     }
//! }
//! ```
//!
//! ## Modules
//!
//! - [`monitor`]: The [`SyncMonitor`] tying everything together
//! - [`merkle`]: Tree nodes, the node builder and the node cache
//! - [`reconcile`]: Walking remote trees
//! - [`fetch`]: Node fetching with coalescing and retries
//! - [`protocol`]: Request names for the two exchanges
//! - [`transport`]: The transport seam and an in-memory network
//! - [`slice`]: Sync scopes and name filtering
//! - [`resilience`]: Retry policies

pub mod config;
pub mod digest;
pub mod error;
pub mod fetch;
pub mod merkle;
pub mod metrics;
pub mod monitor;
pub mod name;
pub mod protocol;
pub mod reconcile;
pub mod resilience;
pub mod slice;
pub mod transport;

mod wire;

// Note: We don't expose a `tracing` module to avoid conflict with the tracing crate

pub use config::SyncConfig;
pub use digest::{digest, Digest, DIGEST_LEN, SYNC_HASH_MAX_LENGTH};
pub use error::{CodecError, SyncError};
pub use fetch::{FetchState, NodeSource, ProtocolFetcher};
pub use merkle::{
    BuiltTree, CacheStats, Element, NodeBuilder, NodeCache, SplitPolicy, TreeEntry, TreeNode,
};
pub use monitor::{Listener, ListenerId, SliceStatus, SyncEvent, SyncMonitor};
pub use name::{Component, Name, NameParseError};
pub use reconcile::{Reconciler, WalkOptions, WalkReport};
pub use resilience::retry::RetryConfig;
pub use slice::{Slice, SLICE_VERSION, SYNC_VERSION, WILDCARD};
pub use transport::{MemoryNetwork, MemoryTransport, RequestHandler, Scope, Transport};
pub use crate::metrics::LatencyTimer;
