// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Synchronization slices.
//!
//! A [`Slice`] names a synchronization scope: where to ask (the topology
//! prefix), what to sync (the data prefix), and optional filter clauses that
//! narrow the data prefix further. Its hash namespaces all protocol traffic,
//! and embeds [`SLICE_VERSION`] so peers with incompatible slice formats never
//! share a hash.
//!
//! # Example
//!
//! ```
//! use ndn_sync::{Name, Slice};
//!
//! let slice = Slice::new(
//!     "/lan/repo".parse().unwrap(),
//!     "/data/photos".parse().unwrap(),
//!     vec![],
//! ).unwrap();
//!
//! assert!(slice.accepts(&"/data/photos/cat.jpg".parse().unwrap()));
//! assert!(!slice.accepts(&"/data/music/song.ogg".parse().unwrap()));
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::digest::{digest, Digest};
use crate::error::CodecError;
use crate::name::Name;
use crate::wire;

/// Slice format version, mixed into every slice hash.
pub const SLICE_VERSION: u32 = 20_110_614;

/// Protocol version, carried in every encoded tree node.
pub const SYNC_VERSION: u32 = 20_110_614;

/// Filter component that matches any single name component.
pub const WILDCARD: &[u8] = &[0xFF];

/// An immutable synchronization scope.
#[derive(Clone)]
pub struct Slice {
    topology: Name,
    prefix: Name,
    filters: Vec<Name>,
    hash: Digest,
}

impl Slice {
    /// Create a slice. Filters are sorted and deduplicated, so the hash does
    /// not depend on the order they were supplied in.
    pub fn new(topology: Name, prefix: Name, mut filters: Vec<Name>) -> Result<Self, CodecError> {
        filters.sort();
        filters.dedup();
        let hash = Self::compute_hash(&topology, &prefix, &filters)?;
        Ok(Self {
            topology,
            prefix,
            filters,
            hash,
        })
    }

    fn compute_hash(topology: &Name, prefix: &Name, filters: &[Name]) -> Result<Digest, CodecError> {
        let mut buf = Vec::new();
        wire::put_u32(&mut buf, SLICE_VERSION);
        wire::put_name(&mut buf, topology)?;
        wire::put_name(&mut buf, prefix)?;
        let count = u32::try_from(filters.len()).map_err(|_| CodecError::TooLarge("filters"))?;
        wire::put_u32(&mut buf, count);
        for f in filters {
            wire::put_name(&mut buf, f)?;
        }
        Ok(digest(&buf))
    }

    #[must_use]
    pub fn topology(&self) -> &Name {
        &self.topology
    }

    #[must_use]
    pub fn prefix(&self) -> &Name {
        &self.prefix
    }

    #[must_use]
    pub fn filters(&self) -> &[Name] {
        &self.filters
    }

    #[must_use]
    pub fn hash(&self) -> Digest {
        self.hash
    }

    /// Whether `name` belongs to this slice.
    ///
    /// The name must sit under the data prefix. With filters present, the
    /// remainder after the prefix must also start with one of the filter
    /// clauses, where a [`WILDCARD`] component matches any one component.
    #[must_use]
    pub fn accepts(&self, name: &Name) -> bool {
        if !self.prefix.is_prefix_of(name) {
            return false;
        }
        if self.filters.is_empty() {
            return true;
        }
        let rest = &name.components()[self.prefix.len()..];
        self.filters.iter().any(|filter| {
            filter.len() <= rest.len()
                && filter
                    .components()
                    .iter()
                    .zip(rest)
                    .all(|(f, c)| f.as_bytes() == WILDCARD || f == c)
        })
    }
}

impl PartialEq for Slice {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Slice {}

impl Hash for Slice {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl fmt::Debug for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slice")
            .field("topology", &self.topology)
            .field("prefix", &self.prefix)
            .field("filters", &self.filters)
            .field("hash", &self.hash)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::Component;

    fn n(s: &str) -> Name {
        s.parse().unwrap()
    }

    #[test]
    fn test_hash_ignores_filter_order() {
        let a = Slice::new(n("/t"), n("/p"), vec![n("/x"), n("/y")]).unwrap();
        let b = Slice::new(n("/t"), n("/p"), vec![n("/y"), n("/x"), n("/x")]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.hash(), b.hash());
        assert_eq!(b.filters().len(), 2);
    }

    #[test]
    fn test_hash_depends_on_every_field() {
        let base = Slice::new(n("/t"), n("/p"), vec![]).unwrap();
        assert_ne!(base, Slice::new(n("/t2"), n("/p"), vec![]).unwrap());
        assert_ne!(base, Slice::new(n("/t"), n("/p2"), vec![]).unwrap());
        assert_ne!(base, Slice::new(n("/t"), n("/p"), vec![n("/f")]).unwrap());
    }

    #[test]
    fn test_topology_and_prefix_are_not_interchangeable() {
        let a = Slice::new(n("/x"), n("/y"), vec![]).unwrap();
        let b = Slice::new(n("/y"), n("/x"), vec![]).unwrap();
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_accepts_prefix_only() {
        let s = Slice::new(n("/t"), n("/data"), vec![]).unwrap();
        assert!(s.accepts(&n("/data")));
        assert!(s.accepts(&n("/data/a/b")));
        assert!(!s.accepts(&n("/other/a")));
    }

    #[test]
    fn test_accepts_with_wildcard_filter() {
        let wildcard = Name::from_components(vec![
            Component::new(WILDCARD.to_vec()),
            Component::from("thumb"),
        ]);
        let s = Slice::new(n("/t"), n("/data"), vec![n("/docs"), wildcard]).unwrap();

        assert!(s.accepts(&n("/data/docs/readme")));
        assert!(s.accepts(&n("/data/album1/thumb/1")));
        assert!(!s.accepts(&n("/data/album1/full/1")));
        assert!(!s.accepts(&n("/data")));
    }
}
