// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Merkle hash tree over a sorted name set.
//!
//! # Design
//!
//! A name set is summarised by a tree of immutable, content-addressed nodes:
//!
//! ```text
//!                  root ──────────── digest R
//!        ┌───────────┼─────────────┐
//!   HASH(d1,        LEAF         HASH(d2,
//!    /a/1../a/7)    /a/8          /a/9../b/4)
//!      │                            │
//!   [/a/1 /a/3 /a/5 /a/7]        [/a/9 /b/1 /b/4]
//! ```
//!
//! Two peers with the same names always build the same root digest. When
//! roots differ, comparing children finds the differing ranges, and only
//! nodes the receiver lacks are fetched: O(diff × depth) instead of
//! O(names).
//!
//! - [`node`]: elements, nodes and the wire codec
//! - [`cache`]: the digest → node map with fully-resolved tracking
//! - [`builder`]: prefix-stable construction

pub mod builder;
pub mod cache;
pub mod node;

pub use builder::{BuiltTree, NodeBuilder, SplitPolicy, HASH_SPLIT_TRIGGER, NODE_SPLIT_TRIGGER};
pub use cache::{CacheStats, NodeCache, TreeEntry};
pub use node::{Element, TreeNode, NODE_HEADER_LEN};
