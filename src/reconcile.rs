// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Reconciliation walks.
//!
//! A walk starts at a remote root digest and descends through hash elements,
//! fetching each node it does not already have and handing every leaf name
//! to a sink. Subtrees already built locally or walked to the end before are
//! skipped, so a walk after a small remote change only touches the changed
//! path. A complete walk marks every node it expanded as resolved.
//!
//! ```text
//!   work list ──► visited? ──► fully resolved? ──► fetch (≤ N in flight)
//!       ▲            │ yes            │ yes              │
//!       │            ▼                ▼                  ▼
//!       │          skip             skip       leaves ──► sink
//!       └──────────────────────────────────── hash refs
//! ```
//!
//! Leaves of one node reach the sink in node order. Nothing is promised
//! about order across subtrees. A failed fetch abandons only its own subtree
//! and is listed once in the [`WalkReport`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ndn_sync::{NodeCache, Reconciler, WalkOptions, NodeSource, Digest};
//!
//! # async fn demo(source: Arc<dyn NodeSource>, root: Digest) {
//! let cache = Arc::new(NodeCache::new());
//! let walker = Reconciler::new(source, cache, WalkOptions::default());
//! let (names, report) = walker.collect(root).await;
//! println!("{} names, complete = {}", names.len(), report.is_complete());
//! # }
//! ```

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::digest::Digest;
use crate::error::SyncError;
use crate::fetch::NodeSource;
use crate::merkle::{Element, NodeCache};
use crate::metrics;
use crate::name::Name;
use crate::slice::Slice;

/// Filters and limits for one walk.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Leaves ordered before this name are not yielded.
    pub floor: Option<Name>,
    /// Leaves in this set are not yielded.
    pub exclude: BTreeSet<Name>,
    /// Skip subtrees the cache holds in full.
    pub skip_resolved: bool,
    /// Node fetches kept in flight at once.
    pub max_concurrent: usize,
    /// Only yield names this slice accepts.
    pub slice: Option<Slice>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            floor: None,
            exclude: BTreeSet::new(),
            skip_resolved: true,
            max_concurrent: 16,
            slice: None,
        }
    }
}

impl WalkOptions {
    /// Whether a leaf passes the floor, exclusion and slice filters.
    #[must_use]
    pub fn wants(&self, name: &Name) -> bool {
        self.floor.as_ref().map_or(true, |floor| name >= floor)
            && !self.exclude.contains(name)
            && self.slice.as_ref().map_or(true, |s| s.accepts(name))
    }

    /// No floor and no exclusions. The slice filter does not count, names
    /// outside the slice are never wanted.
    fn is_unfiltered(&self) -> bool {
        self.floor.is_none() && self.exclude.is_empty()
    }
}

/// Outcome of a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkReport {
    pub root: Digest,
    /// Names handed to the sink.
    pub discovered: usize,
    /// Nodes obtained and expanded.
    pub nodes_visited: usize,
    /// Subtrees that could not be obtained, each listed once.
    pub failed: Vec<(Digest, SyncError)>,
    /// The sink closed before the walk finished.
    pub cancelled: bool,
}

impl WalkReport {
    fn new(root: Digest) -> Self {
        Self {
            root,
            discovered: 0,
            nodes_visited: 0,
            failed: Vec::new(),
            cancelled: false,
        }
    }

    /// Every reachable node was obtained and every leaf delivered.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }

    fn status(&self) -> &'static str {
        if self.cancelled {
            "cancelled"
        } else if self.failed.is_empty() {
            "complete"
        } else {
            "partial"
        }
    }
}

/// Walks remote trees. Cheap to clone; each [`Reconciler::run`] is an
/// independent walk with its own visited set.
#[derive(Clone)]
pub struct Reconciler {
    source: Arc<dyn NodeSource>,
    cache: Arc<NodeCache>,
    options: WalkOptions,
}

impl Reconciler {
    pub fn new(source: Arc<dyn NodeSource>, cache: Arc<NodeCache>, options: WalkOptions) -> Self {
        Self {
            source,
            cache,
            options,
        }
    }

    /// Walk from `root`, sending each wanted leaf to `sink`.
    #[tracing::instrument(skip_all, fields(root = %root))]
    pub async fn run(&self, root: Digest, sink: &mpsc::Sender<Name>) -> WalkReport {
        let start = Instant::now();
        let max_concurrent = self.options.max_concurrent.max(1);
        let mut report = WalkReport::new(root);
        let mut visited = HashSet::new();
        let mut work = VecDeque::from([root]);
        let mut in_flight = JoinSet::new();
        let mut expanded = Vec::new();

        'walk: loop {
            while in_flight.len() < max_concurrent {
                let Some(digest) = work.pop_front() else {
                    break;
                };
                if !visited.insert(digest) {
                    continue;
                }
                if self.options.skip_resolved && self.cache.is_fully_resolved(&digest) {
                    debug!(%digest, "Skipping resolved subtree");
                    continue;
                }
                let source = Arc::clone(&self.source);
                in_flight.spawn(async move { (digest, source.fetch_node(digest).await) });
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            let (digest, node) = match joined {
                Ok((digest, Ok(node))) => (digest, node),
                Ok((digest, Err(err))) => {
                    warn!(%digest, error = %err, "Abandoning subtree");
                    report.failed.push((digest, err));
                    continue;
                }
                Err(err) => {
                    warn!(error = %err, "Fetch task ended abnormally");
                    continue;
                }
            };

            report.nodes_visited += 1;
            expanded.push(digest);
            for element in node.elements() {
                match element {
                    Element::Leaf(name) => {
                        if !self.options.wants(name) {
                            continue;
                        }
                        if sink.send(name.clone()).await.is_err() {
                            report.cancelled = true;
                            in_flight.abort_all();
                            break 'walk;
                        }
                        report.discovered += 1;
                    }
                    Element::Hash { digest, .. } => work.push_back(*digest),
                }
            }
        }

        // A complete, unfiltered walk has seen every name under each node
        if report.is_complete() && self.options.is_unfiltered() {
            for digest in expanded {
                self.cache.mark_resolved(digest);
            }
        }

        metrics::record_walk(report.status(), start.elapsed());
        metrics::record_names_discovered(report.discovered);
        debug!(
            discovered = report.discovered,
            nodes = report.nodes_visited,
            failed = report.failed.len(),
            status = report.status(),
            "Walk finished"
        );
        report
    }

    /// Run a walk and gather its names.
    pub async fn collect(&self, root: Digest) -> (Vec<Name>, WalkReport) {
        let (tx, mut rx) = mpsc::channel(256);
        let walk = async move {
            let report = self.run(root, &tx).await;
            drop(tx);
            report
        };
        let drain = async {
            let mut names = Vec::new();
            while let Some(name) = rx.recv().await {
                names.push(name);
            }
            names
        };
        let (report, names) = tokio::join!(walk, drain);
        (names, report)
    }
}
