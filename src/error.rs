// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error taxonomy for the sync engine.
//!
//! Every failure here is scoped to a single request or a single walk branch.
//! There is no fatal class: a walk that hits one of these abandons the branch,
//! reports it once, and carries on with its siblings.

use thiserror::Error;

use crate::digest::Digest;

/// Errors produced by the tree codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("truncated input: needed {needed} more bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },
    #[error("bad magic bytes")]
    BadMagic,
    #[error("unsupported sync version {found} (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },
    #[error("unknown element tag {0:#04x}")]
    UnknownTag(u8),
    #[error("invalid digest length {0}")]
    DigestLength(usize),
    #[error("{0} trailing bytes after node")]
    TrailingBytes(usize),
    #[error("elements out of order at index {0}")]
    OutOfOrder(usize),
    #[error("node summary disagrees with its elements: {0}")]
    BadSummary(&'static str),
    #[error("value too large to encode: {0}")]
    TooLarge(&'static str),
}

/// Errors surfaced by protocol exchanges and walks.
///
/// `Clone` so a single failed fetch can be handed to every walk that was
/// waiting on the same digest.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("{what} timed out{}", .digest.map(|d| format!(" for {d}")).unwrap_or_default())]
    Timeout {
        what: &'static str,
        digest: Option<Digest>,
    },
    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: Digest, actual: Digest },
    #[error("malformed node: {0}")]
    MalformedNode(String),
    #[error("slice mismatch: {reason}")]
    SliceMismatch { reason: String },
    #[error("slice {0} is not open")]
    UnknownSlice(Digest),
}

impl SyncError {
    /// Whether retrying the same request could plausibly succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::DigestMismatch { .. } | Self::MalformedNode(_)
        )
    }

    /// Short label used for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::DigestMismatch { .. } => "digest_mismatch",
            Self::MalformedNode(_) => "malformed",
            Self::SliceMismatch { .. } => "slice_mismatch",
            Self::UnknownSlice(_) => "unknown_slice",
        }
    }
}

impl From<CodecError> for SyncError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::VersionMismatch { .. } => Self::SliceMismatch {
                reason: err.to_string(),
            },
            other => Self::MalformedNode(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_mismatch_maps_to_slice_mismatch() {
        let err: SyncError = CodecError::VersionMismatch {
            found: 1,
            expected: 2,
        }
        .into();
        assert!(matches!(err, SyncError::SliceMismatch { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_codec_errors_map_to_malformed() {
        let err: SyncError = CodecError::BadMagic.into();
        assert_eq!(err.kind(), "malformed");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_timeout_display() {
        let err = SyncError::Timeout {
            what: "root-advise",
            digest: None,
        };
        assert_eq!(err.to_string(), "root-advise timed out");

        let d = crate::digest::digest(b"x");
        let err = SyncError::Timeout {
            what: "node-fetch",
            digest: Some(d),
        };
        assert!(err.to_string().starts_with("node-fetch timed out for "));
    }
}
