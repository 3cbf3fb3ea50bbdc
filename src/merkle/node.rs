// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tree nodes and their wire encoding.
//!
//! A node is an ordered list of elements. Each element is either a concrete
//! name ([`Element::Leaf`]) or a reference to a child node by digest together
//! with the range of names it covers ([`Element::Hash`]). The header also
//! summarises the subtree: how many names sit beneath the node and how many
//! levels it spans, so a peer can size a remote tree before walking it.
//!
//! # Wire format
//!
//! ```text
//! node    := "NDSN" | u32 SYNC_VERSION | u64 leaf_count | u32 depth
//!            | u32 count | element*
//! element := 0x01 name                          LEAF
//!          | 0x02 u8 len digest name name       HASH (digest, min, max)
//! name    := u16 ncomp | (u16 len | bytes)*
//! ```
//!
//! Integers are big-endian. Structurally equal nodes always encode to the
//! same bytes, so any two peers agree on a node's digest.

use std::sync::OnceLock;

use crate::digest::{digest, Digest, DIGEST_LEN, SYNC_HASH_MAX_LENGTH};
use crate::error::CodecError;
use crate::name::Name;
use crate::slice::SYNC_VERSION;
use crate::wire::{self, Reader};

const MAGIC: &[u8; 4] = b"NDSN";
const TAG_LEAF: u8 = 0x01;
const TAG_HASH: u8 = 0x02;

/// Size of the fixed node header.
pub const NODE_HEADER_LEN: usize = MAGIC.len() + 4 + 8 + 4 + 4;

/// One entry of a tree node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Element {
    /// A concrete content name.
    Leaf(Name),
    /// A child node covering the names `min..=max`.
    Hash { digest: Digest, min: Name, max: Name },
}

impl Element {
    /// Smallest name this element covers.
    #[must_use]
    pub fn min_name(&self) -> &Name {
        match self {
            Self::Leaf(name) => name,
            Self::Hash { min, .. } => min,
        }
    }

    /// Largest name this element covers.
    #[must_use]
    pub fn max_name(&self) -> &Name {
        match self {
            Self::Leaf(name) => name,
            Self::Hash { max, .. } => max,
        }
    }

    /// Encoded size in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Leaf(name) => 1 + wire::name_len(name),
            Self::Hash { min, max, .. } => {
                1 + 1 + DIGEST_LEN + wire::name_len(min) + wire::name_len(max)
            }
        }
    }

    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        match self {
            Self::Leaf(name) => {
                wire::put_u8(out, TAG_LEAF);
                wire::put_name(out, name)
            }
            Self::Hash { digest, min, max } => {
                wire::put_u8(out, TAG_HASH);
                wire::put_u8(out, DIGEST_LEN as u8);
                out.extend_from_slice(digest.as_bytes());
                wire::put_name(out, min)?;
                wire::put_name(out, max)
            }
        }
    }

    fn decode_from(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        match r.u8()? {
            TAG_LEAF => Ok(Self::Leaf(r.name()?)),
            TAG_HASH => {
                let len = usize::from(r.u8()?);
                if len == 0 || len > SYNC_HASH_MAX_LENGTH {
                    return Err(CodecError::DigestLength(len));
                }
                let digest = Digest::from_slice(r.take(len)?).ok_or(CodecError::DigestLength(len))?;
                let min = r.name()?;
                let max = r.name()?;
                Ok(Self::Hash { digest, min, max })
            }
            tag => Err(CodecError::UnknownTag(tag)),
        }
    }
}

/// An immutable node of the sync tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TreeNode {
    elements: Vec<Element>,
    leaf_count: u64,
    depth: u32,
}

impl Default for TreeNode {
    fn default() -> Self {
        Self {
            elements: Vec::new(),
            leaf_count: 0,
            depth: 1,
        }
    }
}

impl TreeNode {
    /// The node summarising an empty name set.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Digest of [`TreeNode::empty`], a well-known constant.
    #[must_use]
    pub fn empty_digest() -> Digest {
        static EMPTY: OnceLock<Digest> = OnceLock::new();
        *EMPTY.get_or_init(|| {
            let mut out = Vec::with_capacity(NODE_HEADER_LEN);
            write_header(&mut out, 0, 1, 0);
            digest(&out)
        })
    }

    /// A node holding only the given names.
    pub fn from_leaves(names: impl IntoIterator<Item = Name>) -> Result<Self, CodecError> {
        let elements: Vec<Element> = names.into_iter().map(Element::Leaf).collect();
        let leaf_count = elements.len() as u64;
        Self::from_elements(elements, leaf_count, 1)
    }

    /// Build a node with its subtree summary: `leaf_count` names beneath it
    /// and `depth` levels, 1 for a node with no children.
    ///
    /// Elements must be in strictly ascending, non-overlapping order, and the
    /// summary must be possible for them.
    pub fn from_elements(elements: Vec<Element>, leaf_count: u64, depth: u32) -> Result<Self, CodecError> {
        validate_order(&elements)?;
        validate_summary(&elements, leaf_count, depth)?;
        Ok(Self {
            elements,
            leaf_count,
            depth,
        })
    }

    /// Build a node the caller already knows is consistent.
    pub(crate) fn from_sorted(elements: Vec<Element>, leaf_count: u64, depth: u32) -> Self {
        debug_assert!(validate_order(&elements).is_ok());
        debug_assert!(validate_summary(&elements, leaf_count, depth).is_ok());
        Self {
            elements,
            leaf_count,
            depth,
        }
    }

    #[must_use]
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Names stored in the subtree rooted here.
    #[must_use]
    pub fn leaf_count(&self) -> u64 {
        self.leaf_count
    }

    /// Levels in the subtree rooted here, 1 for a node without children.
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Leaf names stored directly in this node, in order.
    pub fn leaves(&self) -> impl Iterator<Item = &Name> {
        self.elements.iter().filter_map(|e| match e {
            Element::Leaf(name) => Some(name),
            Element::Hash { .. } => None,
        })
    }

    /// Digests of the child nodes this node references, in order.
    pub fn child_digests(&self) -> impl Iterator<Item = Digest> + '_ {
        self.elements.iter().filter_map(|e| match e {
            Element::Hash { digest, .. } => Some(*digest),
            Element::Leaf(_) => None,
        })
    }

    #[must_use]
    pub fn child_count(&self) -> usize {
        self.child_digests().count()
    }

    #[must_use]
    pub fn min_name(&self) -> Option<&Name> {
        self.elements.first().map(Element::min_name)
    }

    #[must_use]
    pub fn max_name(&self) -> Option<&Name> {
        self.elements.last().map(Element::max_name)
    }

    /// Encoded size in bytes, computed without encoding.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        NODE_HEADER_LEN + self.elements.iter().map(Element::encoded_len).sum::<usize>()
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(self.encoded_len());
        let count =
            u32::try_from(self.elements.len()).map_err(|_| CodecError::TooLarge("element count"))?;
        write_header(&mut out, self.leaf_count, self.depth, count);
        for element in &self.elements {
            element.encode_into(&mut out)?;
        }
        Ok(out)
    }

    /// Encode and hash in one step.
    pub fn encode_with_digest(&self) -> Result<(Vec<u8>, Digest), CodecError> {
        let bytes = self.encode()?;
        let d = digest(&bytes);
        Ok((bytes, d))
    }

    /// Digest of the encoded node.
    pub fn digest(&self) -> Result<Digest, CodecError> {
        Ok(self.encode_with_digest()?.1)
    }

    /// Decode a node. Rejects unknown versions, trailing bytes and elements
    /// that are out of order.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(bytes);
        if r.take(MAGIC.len())? != MAGIC {
            return Err(CodecError::BadMagic);
        }
        let version = r.u32()?;
        if version != SYNC_VERSION {
            return Err(CodecError::VersionMismatch {
                found: version,
                expected: SYNC_VERSION,
            });
        }
        let leaf_count = r.u64()?;
        let depth = r.u32()?;
        let count = r.u32()? as usize;
        // Cap the pre-allocation, a hostile count must not reserve gigabytes
        let mut elements = Vec::with_capacity(count.min(r.remaining()));
        for _ in 0..count {
            elements.push(Element::decode_from(&mut r)?);
        }
        if r.remaining() > 0 {
            return Err(CodecError::TrailingBytes(r.remaining()));
        }
        Self::from_elements(elements, leaf_count, depth)
    }
}

fn write_header(out: &mut Vec<u8>, leaf_count: u64, depth: u32, count: u32) {
    out.extend_from_slice(MAGIC);
    wire::put_u32(out, SYNC_VERSION);
    wire::put_u64(out, leaf_count);
    wire::put_u32(out, depth);
    wire::put_u32(out, count);
}

/// Children are only known by digest, so a summary can be bounded from
/// below but not checked exactly unless the node has no children.
fn validate_summary(elements: &[Element], leaf_count: u64, depth: u32) -> Result<(), CodecError> {
    let children = elements.iter().filter(|e| matches!(e, Element::Hash { .. })).count() as u64;
    let leaves = elements.len() as u64 - children;
    if children == 0 {
        if depth != 1 {
            return Err(CodecError::BadSummary("depth of a childless node"));
        }
        if leaf_count != leaves {
            return Err(CodecError::BadSummary("leaf count of a childless node"));
        }
    } else {
        if depth < 2 {
            return Err(CodecError::BadSummary("depth below a child"));
        }
        if leaf_count < leaves + 2 * children {
            return Err(CodecError::BadSummary("leaf count below its elements"));
        }
    }
    Ok(())
}

fn validate_order(elements: &[Element]) -> Result<(), CodecError> {
    for (i, e) in elements.iter().enumerate() {
        if e.min_name() > e.max_name() {
            return Err(CodecError::OutOfOrder(i));
        }
        if i > 0 && elements[i - 1].max_name() >= e.min_name() {
            return Err(CodecError::OutOfOrder(i));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(s: &str) -> Name {
        s.parse().unwrap()
    }

    fn href(tag: &[u8], min: &str, max: &str) -> Element {
        Element::Hash {
            digest: digest(tag),
            min: n(min),
            max: n(max),
        }
    }

    #[test]
    fn test_roundtrip_leaves_only() {
        let node = TreeNode::from_leaves([n("/a/1"), n("/a/2")]).unwrap();
        let bytes = node.encode().unwrap();
        assert_eq!(bytes.len(), node.encoded_len());
        let decoded = TreeNode::decode(&bytes).unwrap();
        assert_eq!(decoded, node);
        assert_eq!(decoded.leaf_count(), 2);
        assert_eq!(decoded.depth(), 1);
    }

    #[test]
    fn test_roundtrip_hash_refs_only() {
        let node = TreeNode::from_elements(
            vec![href(b"x", "/a/1", "/a/4"), href(b"y", "/a/5", "/a/9")],
            9,
            2,
        )
        .unwrap();
        let decoded = TreeNode::decode(&node.encode().unwrap()).unwrap();
        assert_eq!(decoded, node);
        assert_eq!(decoded.child_count(), 2);
        assert_eq!(decoded.leaves().count(), 0);
        assert_eq!(decoded.leaf_count(), 9);
    }

    #[test]
    fn test_roundtrip_mixed() {
        let node = TreeNode::from_elements(
            vec![
                Element::Leaf(n("/a/0")),
                href(b"x", "/a/1", "/a/4"),
                Element::Leaf(n("/a/5")),
            ],
            6,
            3,
        )
        .unwrap();
        let decoded = TreeNode::decode(&node.encode().unwrap()).unwrap();
        assert_eq!(decoded, node);
        assert_eq!(decoded.min_name(), Some(&n("/a/0")));
        assert_eq!(decoded.max_name(), Some(&n("/a/5")));
        assert_eq!(decoded.depth(), 3);
    }

    #[test]
    fn test_roundtrip_empty() {
        let node = TreeNode::empty();
        let bytes = node.encode().unwrap();
        assert_eq!(bytes.len(), NODE_HEADER_LEN);
        assert_eq!(TreeNode::decode(&bytes).unwrap(), node);
        assert_eq!(node.digest().unwrap(), TreeNode::empty_digest());
        assert_eq!(node.leaf_count(), 0);
    }

    #[test]
    fn test_equal_nodes_equal_digests() {
        let a = TreeNode::from_leaves([n("/x")]).unwrap();
        let b = TreeNode::from_leaves([n("/x")]).unwrap();
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());
        assert_ne!(a.digest().unwrap(), TreeNode::empty_digest());
    }

    #[test]
    fn test_summary_is_part_of_digest() {
        let elements = vec![href(b"x", "/a/1", "/a/4"), href(b"y", "/a/5", "/a/9")];
        let a = TreeNode::from_elements(elements.clone(), 9, 2).unwrap();
        let b = TreeNode::from_elements(elements.clone(), 10, 2).unwrap();
        let c = TreeNode::from_elements(elements, 9, 3).unwrap();
        assert_ne!(a.digest().unwrap(), b.digest().unwrap());
        assert_ne!(a.digest().unwrap(), c.digest().unwrap());
    }

    #[test]
    fn test_rejects_impossible_summary() {
        let leaves = vec![Element::Leaf(n("/a")), Element::Leaf(n("/b"))];
        assert!(matches!(
            TreeNode::from_elements(leaves.clone(), 3, 1),
            Err(CodecError::BadSummary(_))
        ));
        assert!(matches!(
            TreeNode::from_elements(leaves, 2, 2),
            Err(CodecError::BadSummary(_))
        ));

        let refs = vec![Element::Leaf(n("/a/0")), href(b"x", "/a/1", "/a/4")];
        assert!(matches!(
            TreeNode::from_elements(refs.clone(), 5, 1),
            Err(CodecError::BadSummary(_))
        ));
        assert!(matches!(
            TreeNode::from_elements(refs, 2, 2),
            Err(CodecError::BadSummary(_))
        ));
    }

    #[test]
    fn test_decode_rejects_tampered_summary() {
        let mut bytes = TreeNode::from_leaves([n("/a"), n("/b")]).unwrap().encode().unwrap();
        // leaf_count sits right after magic and version
        bytes[15] = 7;
        assert!(matches!(TreeNode::decode(&bytes), Err(CodecError::BadSummary(_))));
    }

    #[test]
    fn test_rejects_out_of_order() {
        let err = TreeNode::from_leaves([n("/b"), n("/a")]).unwrap_err();
        assert_eq!(err, CodecError::OutOfOrder(1));

        // overlapping hash ranges
        let err = TreeNode::from_elements(
            vec![href(b"x", "/a/1", "/a/5"), href(b"y", "/a/4", "/a/9")],
            8,
            2,
        )
        .unwrap_err();
        assert_eq!(err, CodecError::OutOfOrder(1));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(TreeNode::decode(b"XXXX\0\0\0\0\0\0\0\0"), Err(CodecError::BadMagic));
        assert!(matches!(
            TreeNode::decode(b"NDS"),
            Err(CodecError::Truncated { .. })
        ));

        let mut bytes = TreeNode::empty().encode().unwrap();
        bytes.push(0);
        assert_eq!(TreeNode::decode(&bytes), Err(CodecError::TrailingBytes(1)));
    }

    #[test]
    fn test_decode_rejects_other_version() {
        let mut bytes = TreeNode::empty().encode().unwrap();
        bytes[4..8].copy_from_slice(&1u32.to_be_bytes());
        assert!(matches!(
            TreeNode::decode(&bytes),
            Err(CodecError::VersionMismatch { found: 1, .. })
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_tag() {
        let node = TreeNode::from_leaves([n("/a")]).unwrap();
        let mut bytes = node.encode().unwrap();
        bytes[NODE_HEADER_LEN] = 0x7F;
        assert_eq!(TreeNode::decode(&bytes), Err(CodecError::UnknownTag(0x7F)));
    }
}
