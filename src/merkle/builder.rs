// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bottom-up tree construction with prefix-stable splitting.
//!
//! The builder starts from a flat run of leaves. While a level encodes to
//! more than [`NODE_SPLIT_TRIGGER`] bytes it is cut into ranges, each range
//! with more than one element becomes a child node, and the level above is
//! made of the resulting hash references (plus any singleton elements, which
//! stay inline). Cuts depend only on the names involved:
//!
//! ```text
//! level d: a boundary follows element e  iff
//!          digest(max_name(e)).split_byte(d) < HASH_SPLIT_TRIGGER
//! ```
//!
//! A range that still encodes past the trigger is cut again with the
//! threshold doubled (34, 68, ...), until it fits or every element stands
//! alone. Doubling only adds boundaries from the same byte, so refinement is
//! as content-determined as the first cut: inserting or removing one name
//! only disturbs the range it lands in, its immediate neighbour, and the
//! nodes along its root path.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use super::cache::NodeCache;
use super::node::{Element, TreeNode, NODE_HEADER_LEN};
use crate::digest::{digest, Digest};
use crate::error::CodecError;
use crate::metrics;
use crate::name::Name;
use crate::wire;

/// Encoded node size above which a level is split.
pub const NODE_SPLIT_TRIGGER: usize = 4000;

/// Split-byte threshold below which an element ends a range.
pub const HASH_SPLIT_TRIGGER: u8 = 17;

/// Thresholds that drive splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitPolicy {
    pub node_split_trigger: usize,
    pub hash_split_trigger: u8,
}

impl Default for SplitPolicy {
    fn default() -> Self {
        Self {
            node_split_trigger: NODE_SPLIT_TRIGGER,
            hash_split_trigger: HASH_SPLIT_TRIGGER,
        }
    }
}

/// Result of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltTree {
    pub root: Digest,
    /// Levels from root to leaves, 1 for a single node.
    pub height: usize,
    /// Nodes newly added to the cache.
    pub nodes_written: usize,
    /// Nodes the cache already held.
    pub nodes_reused: usize,
}

#[derive(Debug, Clone, Default)]
pub struct NodeBuilder {
    policy: SplitPolicy,
}

/// An element of the level being built, with the subtree it stands for.
struct Item {
    element: Element,
    leaf_count: u64,
    depth: u32,
}

impl Item {
    fn leaf(name: Name) -> Self {
        Self {
            element: Element::Leaf(name),
            leaf_count: 1,
            depth: 0,
        }
    }
}

impl NodeBuilder {
    #[must_use]
    pub fn new(policy: SplitPolicy) -> Self {
        Self { policy }
    }

    /// Build the tree for `names`, writing every node into `cache`.
    ///
    /// Equal sets always produce the same root, whatever the cache holds.
    #[tracing::instrument(skip_all, fields(names = names.len()))]
    pub fn build(&self, names: &BTreeSet<Name>, cache: &NodeCache) -> Result<BuiltTree, CodecError> {
        let start = Instant::now();
        let mut tally = Tally::default();
        let mut level: Vec<Item> = names.iter().cloned().map(Item::leaf).collect();
        let mut depth = 0;

        let root = loop {
            if level.len() <= 1 || encoded_len(&level) <= self.policy.node_split_trigger {
                break self.write(level, cache, &mut tally)?.0;
            }

            let ranges = self.split(level, depth)?;
            if ranges.iter().all(|r| r.len() == 1) {
                // No cut shrinks this level, every element is alone
                let level: Vec<Item> = ranges.into_iter().flatten().collect();
                warn!(
                    elements = level.len(),
                    bytes = encoded_len(&level),
                    "Emitting oversize node"
                );
                break self.write(level, cache, &mut tally)?.0;
            }

            let mut next = Vec::with_capacity(ranges.len());
            for mut range in ranges {
                if range.len() == 1 {
                    next.extend(range.pop());
                    continue;
                }
                next.push(self.write(range, cache, &mut tally)?.1);
            }
            level = next;
            depth += 1;
        };
        let built = BuiltTree {
            root,
            height: depth + 1,
            nodes_written: tally.written,
            nodes_reused: tally.reused,
        };
        metrics::record_build(start.elapsed(), tally.written, tally.reused);
        debug!(
            root = %built.root,
            height = built.height,
            written = built.nodes_written,
            reused = built.nodes_reused,
            "Built tree"
        );
        Ok(built)
    }

    /// Cut one level into ranges.
    fn split(&self, level: Vec<Item>, depth: usize) -> Result<Vec<Vec<Item>>, CodecError> {
        let keyed = level
            .into_iter()
            .map(|item| Ok((self.split_byte(item.element.max_name(), depth)?, item)))
            .collect::<Result<Vec<_>, CodecError>>()?;
        let mut ranges = Vec::new();
        self.cut(keyed, u16::from(self.policy.hash_split_trigger), &mut ranges);
        Ok(ranges)
    }

    /// End a range after every element whose split byte is under `threshold`.
    fn cut(&self, run: Vec<(u8, Item)>, threshold: u16, ranges: &mut Vec<Vec<Item>>) {
        let mut range = Vec::new();
        for (byte, item) in run {
            let boundary = u16::from(byte) < threshold;
            range.push((byte, item));
            if boundary {
                self.settle(std::mem::take(&mut range), threshold, ranges);
            }
        }
        if !range.is_empty() {
            self.settle(range, threshold, ranges);
        }
    }

    /// Keep a range that fits, cut one that does not at a doubled threshold.
    /// Past 255 every element is a boundary, so this always ends.
    fn settle(&self, range: Vec<(u8, Item)>, threshold: u16, ranges: &mut Vec<Vec<Item>>) {
        let len = NODE_HEADER_LEN
            + range
                .iter()
                .map(|(_, item)| item.element.encoded_len())
                .sum::<usize>();
        if range.len() > 1 && len > self.policy.node_split_trigger {
            self.cut(range, (threshold * 2).max(1), ranges);
        } else {
            ranges.push(range.into_iter().map(|(_, item)| item).collect());
        }
    }

    fn split_byte(&self, name: &Name, depth: usize) -> Result<u8, CodecError> {
        let mut framed = Vec::with_capacity(wire::name_len(name));
        wire::put_name(&mut framed, name)?;
        Ok(digest(&framed).split_byte(depth))
    }

    /// Write one node for `items`, returning its digest and the hash
    /// reference a parent level would hold.
    fn write(
        &self,
        items: Vec<Item>,
        cache: &NodeCache,
        tally: &mut Tally,
    ) -> Result<(Digest, Item), CodecError> {
        let leaf_count = items.iter().map(|item| item.leaf_count).sum();
        let depth = 1 + items.iter().map(|item| item.depth).max().unwrap_or(0);
        let (min, max) = match (items.first(), items.last()) {
            (Some(first), Some(last)) => {
                (first.element.min_name().clone(), last.element.max_name().clone())
            }
            // Only the root of an empty set has no elements
            _ => (Name::root(), Name::root()),
        };
        let node = TreeNode::from_sorted(
            items.into_iter().map(|item| item.element).collect(),
            leaf_count,
            depth,
        );
        let d = node.digest()?;
        if cache.contains(&d) {
            tally.reused += 1;
        } else {
            cache.put(d, Arc::new(node));
            tally.written += 1;
        }
        // Children are always written before their parent
        cache.mark_resolved(d);
        let item = Item {
            element: Element::Hash { digest: d, min, max },
            leaf_count,
            depth,
        };
        Ok((d, item))
    }
}

#[derive(Default)]
struct Tally {
    written: usize,
    reused: usize,
}

fn encoded_len(level: &[Item]) -> usize {
    NODE_HEADER_LEN + level.iter().map(|item| item.element.encoded_len()).sum::<usize>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::Bound::Excluded;

    fn n(s: &str) -> Name {
        s.parse().unwrap()
    }

    fn names(count: usize) -> BTreeSet<Name> {
        (0..count).map(|i| n(&format!("/sync/test/item-{i:05}"))).collect()
    }

    /// Names around 320 bytes encoded, so about a dozen fill a node.
    fn long_name(i: usize) -> Name {
        n(&format!("/data/{}/{i:05}", "p".repeat(300)))
    }

    /// Every leaf reachable from `root`, in tree order.
    fn leaves(cache: &NodeCache, root: Digest) -> Vec<Name> {
        let mut out = Vec::new();
        let node = cache.get(&root).unwrap();
        for e in node.elements() {
            match e {
                Element::Leaf(name) => out.push(name.clone()),
                Element::Hash { digest, min, max } => {
                    let sub = leaves(cache, *digest);
                    assert_eq!(sub.first(), Some(min));
                    assert_eq!(sub.last(), Some(max));
                    out.extend(sub);
                }
            }
        }
        out
    }

    fn cache_digests(cache: &NodeCache, root: Digest) -> Vec<Digest> {
        let mut out = vec![root];
        let mut i = 0;
        while i < out.len() {
            let node = cache.get(&out[i]).unwrap();
            out.extend(node.child_digests());
            i += 1;
        }
        out
    }

    /// Whether `node` covers `added`, or borders the gap it was put in.
    fn on_path(node: &TreeNode, added: &Name, old: &BTreeSet<Name>) -> bool {
        let (Some(min), Some(max)) = (node.min_name(), node.max_name()) else {
            return true;
        };
        if added < min {
            old.range(added.clone()..min.clone()).next().is_none()
        } else if added > max {
            old.range((Excluded(max.clone()), Excluded(added.clone())))
                .next()
                .is_none()
        } else {
            true
        }
    }

    /// Build `old`, then `old + added` into a fresh cache, and return the old
    /// nodes that did not survive and lie off the new name's root path.
    fn off_path_losses(old: &BTreeSet<Name>, added: &Name) -> Vec<(Name, Name)> {
        let builder = NodeBuilder::default();
        let before_cache = NodeCache::new();
        let before = builder.build(old, &before_cache).unwrap();

        let mut grown = old.clone();
        grown.insert(added.clone());
        let after_cache = NodeCache::new();
        builder.build(&grown, &after_cache).unwrap();

        cache_digests(&before_cache, before.root)
            .into_iter()
            .filter(|d| !after_cache.contains(d))
            .map(|d| before_cache.get(&d).unwrap())
            .filter(|node| !on_path(node, added, old))
            .map(|node| (node.min_name().unwrap().clone(), node.max_name().unwrap().clone()))
            .collect()
    }

    #[test]
    fn test_empty_set_is_empty_node() {
        let cache = NodeCache::new();
        let built = NodeBuilder::default().build(&BTreeSet::new(), &cache).unwrap();
        assert_eq!(built.root, TreeNode::empty_digest());
        assert_eq!(built.height, 1);
        assert!(cache.get(&built.root).unwrap().is_empty());
    }

    #[test]
    fn test_single_name() {
        let cache = NodeCache::new();
        let set: BTreeSet<Name> = [n("/only")].into();
        let built = NodeBuilder::default().build(&set, &cache).unwrap();
        let root = cache.get(&built.root).unwrap();
        assert_eq!(root.elements(), &[Element::Leaf(n("/only"))]);
        assert_eq!(root.leaf_count(), 1);
    }

    #[test]
    fn test_small_set_single_node() {
        let cache = NodeCache::new();
        let built = NodeBuilder::default().build(&names(20), &cache).unwrap();
        assert_eq!(built.height, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_large_set_splits_and_covers_all_names() {
        let cache = NodeCache::new();
        let set = names(400);
        let built = NodeBuilder::default().build(&set, &cache).unwrap();

        assert!(built.height >= 2);
        assert!(cache.len() > 1);
        for d in cache_digests(&cache, built.root) {
            let node = cache.get(&d).unwrap();
            assert!(node.len() == 1 || node.encoded_len() <= NODE_SPLIT_TRIGGER);
        }
        let all: Vec<Name> = set.into_iter().collect();
        assert_eq!(leaves(&cache, built.root), all);
        assert!(cache.is_fully_resolved(&built.root));
    }

    #[test]
    fn test_summary_counts_every_name() {
        let cache = NodeCache::new();
        let built = NodeBuilder::default().build(&names(400), &cache).unwrap();
        let root = cache.get(&built.root).unwrap();
        assert_eq!(root.leaf_count(), 400);
        assert!(root.depth() >= 2);

        for d in cache_digests(&cache, built.root) {
            let node = cache.get(&d).unwrap();
            assert_eq!(node.leaf_count() as usize, leaves(&cache, d).len());
            for child in node.child_digests() {
                assert!(cache.get(&child).unwrap().depth() < node.depth());
            }
        }
    }

    #[test]
    fn test_rebuild_reuses_nodes() {
        let cache = NodeCache::new();
        let builder = NodeBuilder::default();
        let first = builder.build(&names(400), &cache).unwrap();
        let second = builder.build(&names(400), &cache).unwrap();
        assert_eq!(first.root, second.root);
        assert_eq!(second.nodes_written, 0);
        assert_eq!(second.nodes_reused, first.nodes_written);
    }

    #[test]
    fn test_single_insert_keeps_sibling_subtrees() {
        let old = names(400);
        for added in ["/sync/test/item-00123-extra", "/sync/test/item-00000-a", "/sync/test/z"] {
            let lost = off_path_losses(&old, &n(added));
            assert!(lost.is_empty(), "adding {added} lost {lost:?}");
        }
    }

    #[test]
    fn test_long_names_insert_only_touches_root_path() {
        let old: BTreeSet<Name> = (0..400).map(|i| long_name(2 * i)).collect();

        // Natural ranges of ~15 such names overflow, so refinement cuts here
        let cache = NodeCache::new();
        let built = NodeBuilder::default().build(&old, &cache).unwrap();
        for d in cache_digests(&cache, built.root) {
            let node = cache.get(&d).unwrap();
            assert!(node.len() == 1 || node.encoded_len() <= NODE_SPLIT_TRIGGER);
        }

        for i in [0, 1, 97, 401, 555, 799, 1001] {
            let added = long_name(i);
            if old.contains(&added) {
                continue;
            }
            let lost = off_path_losses(&old, &added);
            assert!(lost.is_empty(), "adding #{i} lost {} off-path nodes: {lost:?}", lost.len());
        }
    }

    #[test]
    fn test_oversize_single_element_emitted() {
        let policy = SplitPolicy {
            node_split_trigger: 16,
            hash_split_trigger: HASH_SPLIT_TRIGGER,
        };
        let cache = NodeCache::new();
        let set: BTreeSet<Name> = [n("/a-rather-long-name/that/will/not/fit")].into();
        let built = NodeBuilder::new(policy).build(&set, &cache).unwrap();
        assert_eq!(cache.get(&built.root).unwrap().len(), 1);
    }

    #[test]
    fn test_tiny_trigger_still_terminates() {
        // Hash references alone overflow the trigger above the leaves
        let policy = SplitPolicy {
            node_split_trigger: 100,
            hash_split_trigger: 128,
        };
        let cache = NodeCache::new();
        let set = names(50);
        let built = NodeBuilder::new(policy).build(&set, &cache).unwrap();
        assert_eq!(leaves(&cache, built.root).len(), 50);
    }

    #[test]
    fn test_zero_hash_trigger_splits_by_refinement() {
        // No natural boundaries at all, every cut comes from refinement
        let policy = SplitPolicy {
            node_split_trigger: NODE_SPLIT_TRIGGER,
            hash_split_trigger: 0,
        };
        let cache = NodeCache::new();
        let set = names(400);
        let built = NodeBuilder::new(policy).build(&set, &cache).unwrap();
        assert!(built.height >= 2);
        assert_eq!(leaves(&cache, built.root).len(), 400);
    }
}
