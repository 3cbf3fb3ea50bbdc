// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Request names for the two sync exchanges.
//!
//! ```text
//! root-advise:  <topology> / %C1.S.ra / <slice hash>
//! node-fetch:   <topology> / %C1.S.nf / <slice hash> / <node digest>
//! ```
//!
//! The response to a root-advise is the responder's encoded root node; the
//! response to a node-fetch is the encoded node whose digest was named.

use crate::digest::Digest;
use crate::name::{Component, Name};
use crate::slice::Slice;

/// Command marker for root-advise requests.
pub const ROOT_ADVISE_MARKER: &[u8] = b"\xC1.S.ra";

/// Command marker for node-fetch requests.
pub const NODE_FETCH_MARKER: &[u8] = b"\xC1.S.nf";

/// A parsed incoming request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    RootAdvise { slice_hash: Digest },
    NodeFetch { slice_hash: Digest, digest: Digest },
}

impl Request {
    #[must_use]
    pub fn slice_hash(&self) -> Digest {
        match self {
            Self::RootAdvise { slice_hash } | Self::NodeFetch { slice_hash, .. } => *slice_hash,
        }
    }

    /// Exchange label used in logs and metrics.
    #[must_use]
    pub fn exchange(&self) -> &'static str {
        match self {
            Self::RootAdvise { .. } => "root_advise",
            Self::NodeFetch { .. } => "node_fetch",
        }
    }
}

#[must_use]
pub fn root_advise_name(slice: &Slice) -> Name {
    slice
        .topology()
        .child(ROOT_ADVISE_MARKER)
        .child(slice.hash().as_bytes().as_slice())
}

/// Common prefix of every node-fetch for `slice`.
#[must_use]
pub fn node_fetch_prefix(slice: &Slice) -> Name {
    slice
        .topology()
        .child(NODE_FETCH_MARKER)
        .child(slice.hash().as_bytes().as_slice())
}

#[must_use]
pub fn node_fetch_name(slice: &Slice, digest: &Digest) -> Name {
    node_fetch_prefix(slice).child(digest.as_bytes().as_slice())
}

/// Parse a request that arrived under `topology`. `None` for anything that
/// is not a well-formed sync request.
#[must_use]
pub fn parse_request(topology: &Name, name: &Name) -> Option<Request> {
    if !topology.is_prefix_of(name) {
        return None;
    }
    let rest = &name.components()[topology.len()..];
    let digest_at = |c: &Component| Digest::from_slice(c.as_bytes());
    match rest {
        [marker, slice] if marker.as_bytes() == ROOT_ADVISE_MARKER => Some(Request::RootAdvise {
            slice_hash: digest_at(slice)?,
        }),
        [marker, slice, node] if marker.as_bytes() == NODE_FETCH_MARKER => {
            Some(Request::NodeFetch {
                slice_hash: digest_at(slice)?,
                digest: digest_at(node)?,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::digest;

    fn slice() -> Slice {
        Slice::new("/lan/sync".parse().unwrap(), "/data".parse().unwrap(), vec![]).unwrap()
    }

    #[test]
    fn test_root_advise_name_roundtrip() {
        let s = slice();
        let name = root_advise_name(&s);
        assert_eq!(name.len(), s.topology().len() + 2);
        assert_eq!(
            parse_request(s.topology(), &name),
            Some(Request::RootAdvise { slice_hash: s.hash() })
        );
    }

    #[test]
    fn test_node_fetch_name_roundtrip() {
        let s = slice();
        let d = digest(b"node");
        let req = parse_request(s.topology(), &node_fetch_name(&s, &d)).unwrap();
        assert_eq!(req, Request::NodeFetch { slice_hash: s.hash(), digest: d });
        assert_eq!(req.exchange(), "node_fetch");
        assert!(node_fetch_prefix(&s).is_prefix_of(&node_fetch_name(&s, &d)));
    }

    #[test]
    fn test_parse_rejects_foreign_names() {
        let s = slice();
        let topo = s.topology();
        assert_eq!(parse_request(topo, &"/elsewhere/x".parse().unwrap()), None);
        assert_eq!(parse_request(topo, &topo.child("not-a-marker").child("x")), None);
        // digest component of the wrong length
        assert_eq!(parse_request(topo, &topo.child(ROOT_ADVISE_MARKER).child("short")), None);
        // extra trailing component
        let extra = root_advise_name(&s).child("more");
        assert_eq!(parse_request(topo, &extra), None);
    }
}
