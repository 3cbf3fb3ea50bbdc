// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Content-addressed node cache.
//!
//! Nodes are keyed by their digest and never mutated, so inserting the same
//! node twice is harmless and late or duplicate responses need no special
//! handling. Remote bytes only enter through [`NodeCache::put_verified`],
//! which refuses anything whose digest differs from the one requested.
//!
//! Alongside the nodes the cache remembers which digests are *fully
//! resolved*: the subtree was built locally or walked to the end, so every
//! name under it is already known. The bit only ever flips from unknown to
//! true, which lets walkers skip whole subtrees. Presence alone is not
//! enough: a root cached from a root-advise has not been walked yet.

use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use tracing::debug;

use super::node::{Element, TreeNode};
use crate::digest::{digest, Digest};
use crate::error::{CodecError, SyncError};
use crate::metrics;
use crate::name::Name;

/// Derived view of one cached node.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub node: Arc<TreeNode>,
    pub child_count: usize,
    /// Names beneath the node, as its header claims.
    pub leaf_count: u64,
    pub depth: u32,
    pub is_fully_resolved: bool,
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub nodes: usize,
    pub resolved: usize,
}

/// Concurrent digest → node map.
#[derive(Debug, Default)]
pub struct NodeCache {
    nodes: DashMap<Digest, Arc<TreeNode>>,
    resolved: DashSet<Digest>,
}

impl NodeCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, digest: &Digest) -> Option<Arc<TreeNode>> {
        self.nodes.get(digest).map(|r| Arc::clone(r.value()))
    }

    #[must_use]
    pub fn contains(&self, digest: &Digest) -> bool {
        self.nodes.contains_key(digest)
    }

    /// Store `node` under `digest`. Returns `false` if it was already there.
    ///
    /// The caller vouches that `digest` is the node's digest.
    pub fn put(&self, digest: Digest, node: Arc<TreeNode>) -> bool {
        let mut inserted = false;
        self.nodes.entry(digest).or_insert_with(|| {
            inserted = true;
            node
        });
        if inserted {
            metrics::record_nodes_cached(1);
        }
        inserted
    }

    /// Hash `node` and store it.
    pub fn insert(&self, node: TreeNode) -> Result<Digest, CodecError> {
        let d = node.digest()?;
        self.put(d, Arc::new(node));
        Ok(d)
    }

    /// Verify and store bytes received from a peer.
    ///
    /// Nothing is cached unless the bytes hash to `expected` and decode.
    pub fn put_verified(&self, expected: Digest, bytes: &[u8]) -> Result<Arc<TreeNode>, SyncError> {
        let actual = digest(bytes);
        if actual != expected {
            metrics::record_rejected("digest_mismatch");
            return Err(SyncError::DigestMismatch { expected, actual });
        }
        if let Some(existing) = self.get(&expected) {
            return Ok(existing);
        }
        let node = Arc::new(TreeNode::decode(bytes).inspect_err(|_| {
            metrics::record_rejected("malformed");
        })?);
        self.put(expected, Arc::clone(&node));
        debug!(digest = %expected, elements = node.len(), "Cached remote node");
        Ok(node)
    }

    /// Encoded form of a cached node, for answering node-fetch requests.
    #[must_use]
    pub fn get_encoded(&self, digest: &Digest) -> Option<Vec<u8>> {
        self.get(digest).and_then(|node| node.encode().ok())
    }

    /// Record that `digest` and everything beneath it have been seen in
    /// full, either built locally or completely walked.
    pub fn mark_resolved(&self, digest: Digest) {
        self.resolved.insert(digest);
    }

    #[must_use]
    pub fn is_fully_resolved(&self, digest: &Digest) -> bool {
        self.resolved.contains(digest)
    }

    /// Whether the tree under `root` holds `name`. Nodes missing from the
    /// cache count as not holding it.
    #[must_use]
    pub fn contains_name(&self, root: &Digest, name: &Name) -> bool {
        let mut current = *root;
        loop {
            let Some(node) = self.get(&current) else {
                return false;
            };
            let elements = node.elements();
            let idx = elements.partition_point(|e| e.max_name() < name);
            match elements.get(idx) {
                Some(Element::Leaf(leaf)) => return leaf == name,
                Some(Element::Hash { digest, min, .. }) if min <= name => current = *digest,
                _ => return false,
            }
        }
    }

    #[must_use]
    pub fn entry(&self, digest: &Digest) -> Option<TreeEntry> {
        let node = self.get(digest)?;
        Some(TreeEntry {
            child_count: node.child_count(),
            leaf_count: node.leaf_count(),
            depth: node.depth(),
            is_fully_resolved: self.is_fully_resolved(digest),
            node,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            nodes: self.nodes.len(),
            resolved: self.resolved.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(s: &str) -> Name {
        s.parse().unwrap()
    }

    fn leaf_node(names: &[&str]) -> TreeNode {
        TreeNode::from_leaves(names.iter().map(|s| n(s))).unwrap()
    }

    fn parent_of(child: &TreeNode, min: &str, max: &str) -> TreeNode {
        TreeNode::from_elements(
            vec![Element::Hash {
                digest: child.digest().unwrap(),
                min: n(min),
                max: n(max),
            }],
            child.leaf_count(),
            child.depth() + 1,
        )
        .unwrap()
    }

    #[test]
    fn test_put_is_idempotent() {
        let cache = NodeCache::new();
        let node = leaf_node(&["/a", "/b"]);
        let d = node.digest().unwrap();
        assert!(cache.put(d, Arc::new(node.clone())));
        assert!(!cache.put(d, Arc::new(node)));
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&d));
    }

    #[test]
    fn test_put_verified_rejects_mismatch() {
        let cache = NodeCache::new();
        let bytes = leaf_node(&["/a"]).encode().unwrap();
        let wrong = digest(b"something else");

        let err = cache.put_verified(wrong, &bytes).unwrap_err();
        assert!(matches!(err, SyncError::DigestMismatch { expected, .. } if expected == wrong));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_verified_rejects_malformed() {
        let cache = NodeCache::new();
        let bytes = b"not a node".to_vec();
        let err = cache.put_verified(digest(&bytes), &bytes).unwrap_err();
        assert!(matches!(err, SyncError::MalformedNode(_)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_verified_accepts_good_bytes() {
        let cache = NodeCache::new();
        let node = leaf_node(&["/a", "/b"]);
        let (bytes, d) = node.encode_with_digest().unwrap();
        let cached = cache.put_verified(d, &bytes).unwrap();
        assert_eq!(*cached, node);
        assert_eq!(cache.get_encoded(&d), Some(bytes));
    }

    #[test]
    fn test_resolved_only_when_marked() {
        let cache = NodeCache::new();
        let child = leaf_node(&["/a/1", "/a/2"]);
        let parent = parent_of(&child, "/a/1", "/a/2");
        let parent_d = cache.insert(parent).unwrap();
        cache.insert(child).unwrap();

        // Present but never walked
        let entry = cache.entry(&parent_d).unwrap();
        assert_eq!(entry.child_count, 1);
        assert_eq!(entry.leaf_count, 2);
        assert_eq!(entry.depth, 2);
        assert!(!entry.is_fully_resolved);

        cache.mark_resolved(parent_d);
        assert!(cache.entry(&parent_d).unwrap().is_fully_resolved);
        assert_eq!(cache.stats(), CacheStats { nodes: 2, resolved: 1 });
    }

    #[test]
    fn test_unknown_digest_not_resolved() {
        let cache = NodeCache::new();
        assert!(!cache.is_fully_resolved(&digest(b"missing")));
        assert!(cache.entry(&digest(b"missing")).is_none());
    }

    #[test]
    fn test_contains_name_descends_ranges() {
        let cache = NodeCache::new();
        let child = leaf_node(&["/a/1", "/a/2"]);
        let root = TreeNode::from_elements(
            vec![
                Element::Leaf(n("/a/0")),
                Element::Hash {
                    digest: child.digest().unwrap(),
                    min: n("/a/1"),
                    max: n("/a/2"),
                },
                Element::Leaf(n("/a/3")),
            ],
            4,
            2,
        )
        .unwrap();
        let root_d = cache.insert(root).unwrap();

        assert!(cache.contains_name(&root_d, &n("/a/0")));
        assert!(cache.contains_name(&root_d, &n("/a/3")));
        // child not cached yet
        assert!(!cache.contains_name(&root_d, &n("/a/2")));
        cache.insert(child).unwrap();
        assert!(cache.contains_name(&root_d, &n("/a/2")));
        assert!(!cache.contains_name(&root_d, &n("/a/9")));
        assert!(!cache.contains_name(&root_d, &n("/a")));
    }
}
