// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Low-level framing shared by the node codec and slice hashing.
//!
//! Everything is big-endian and length-prefixed so that structurally equal
//! values always produce identical bytes.

use crate::error::CodecError;
use crate::name::{Component, Name};

pub(crate) fn put_u8(out: &mut Vec<u8>, v: u8) {
    out.push(v);
}

pub(crate) fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub(crate) fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub(crate) fn put_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_be_bytes());
}

/// `u16 ncomp | (u16 len | bytes)*`
pub(crate) fn put_name(out: &mut Vec<u8>, name: &Name) -> Result<(), CodecError> {
    let count = u16::try_from(name.len()).map_err(|_| CodecError::TooLarge("name components"))?;
    put_u16(out, count);
    for c in name.components() {
        let len = u16::try_from(c.len()).map_err(|_| CodecError::TooLarge("component"))?;
        put_u16(out, len);
        out.extend_from_slice(c.as_bytes());
    }
    Ok(())
}

/// Encoded size of a name, without encoding it.
pub(crate) fn name_len(name: &Name) -> usize {
    2 + name.components().iter().map(|c| 2 + c.len()).sum::<usize>()
}

/// Cursor over an input buffer.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::Truncated {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, CodecError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, CodecError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn u64(&mut self) -> Result<u64, CodecError> {
        let mut be = [0u8; 8];
        be.copy_from_slice(self.take(8)?);
        Ok(u64::from_be_bytes(be))
    }

    pub(crate) fn name(&mut self) -> Result<Name, CodecError> {
        let count = self.u16()?;
        let mut components = Vec::with_capacity(usize::from(count).min(64));
        for _ in 0..count {
            let len = self.u16()?;
            components.push(Component::new(self.take(usize::from(len))?));
        }
        Ok(Name::from_components(components))
    }
}
