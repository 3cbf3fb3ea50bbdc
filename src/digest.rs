// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Content digests.
//!
//! All tree nodes, slices and split decisions hash through [`digest`]. The
//! output length is fixed for the whole subsystem and never exceeds
//! [`SYNC_HASH_MAX_LENGTH`].

use sha2::{Digest as _, Sha256};
use std::fmt;

/// Upper bound on any digest carried on the wire.
pub const SYNC_HASH_MAX_LENGTH: usize = 40;

/// Length of every digest this engine produces (SHA-256).
pub const DIGEST_LEN: usize = 32;

const _: () = assert!(DIGEST_LEN <= SYNC_HASH_MAX_LENGTH);

/// A fixed-length content hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Build from a slice, `None` if the length is wrong.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; DIGEST_LEN] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Byte consulted by the node builder when deciding whether a range
    /// boundary falls at tree level `level`. Each level reads a different
    /// trailing byte so boundary density is the same at every level.
    #[must_use]
    pub fn split_byte(&self, level: usize) -> u8 {
        self.0[DIGEST_LEN - 1 - (level % DIGEST_LEN)]
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Hash a byte sequence.
#[must_use]
pub fn digest(bytes: &[u8]) -> Digest {
    Digest(Sha256::digest(bytes).into())
}
