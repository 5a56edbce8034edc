//! Bounds-checked little-endian cursor over raw structure bytes.
//!
//! Every read names the field being consumed so truncation errors point at
//! the exact spot in the structure rather than a generic "too short".

use crate::errors::{DpapiError, Result};

pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub(crate) fn read_bytes(&mut self, n: usize, context: &'static str) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(DpapiError::Truncated {
                context,
                needed: n,
                available: self.remaining(),
            });
        }
        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub(crate) fn read_array<const N: usize>(&mut self, context: &'static str) -> Result<[u8; N]> {
        let b = self.read_bytes(N, context)?;
        let mut out = [0u8; N];
        out.copy_from_slice(b);
        Ok(out)
    }

    pub(crate) fn read_u8(&mut self, context: &'static str) -> Result<u8> {
        Ok(self.read_bytes(1, context)?[0])
    }

    pub(crate) fn read_u32_le(&mut self, context: &'static str) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array::<4>(context)?))
    }

    pub(crate) fn read_u64_le(&mut self, context: &'static str) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array::<8>(context)?))
    }

    /// Reads a u32 byte count followed by that many bytes. The count is
    /// validated against the remaining buffer before any allocation.
    pub(crate) fn read_len_prefixed(&mut self, context: &'static str) -> Result<&'a [u8]> {
        let len = self.read_u32_le(context)? as usize;
        self.read_bytes(len, context)
    }

    pub(crate) fn skip(&mut self, n: usize, context: &'static str) -> Result<()> {
        self.read_bytes(n, context).map(|_| ())
    }

    pub(crate) fn take_rest(&mut self) -> &'a [u8] {
        let out = &self.bytes[self.pos..];
        self.pos = self.bytes.len();
        out
    }
}

/// Decodes UTF-16LE bytes into a string, stopping at the first NUL pair.
/// Unpaired trailing bytes and invalid code units are replaced, not fatal;
/// on-disk descriptions are advisory and never worth failing a parse over.
pub(crate) fn utf16le_to_string(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&u| u != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

/// Strict UTF-16LE decode for secret material where replacement characters
/// would silently corrupt the recovered value. Trailing NUL pairs are
/// trimmed first; `None` if the payload is odd-length or not valid UTF-16.
pub(crate) fn utf16le_to_string_strict(bytes: &[u8]) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let mut units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    while units.last() == Some(&0) {
        units.pop();
    }
    String::from_utf16(&units).ok()
}

/// Encodes a string as UTF-16LE bytes, no terminator.
pub(crate) fn utf16le_bytes(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

/// Converts a Windows FILETIME (100ns ticks since 1601-01-01 UTC) into a
/// chrono timestamp. Zero and out-of-range values come back as `None`.
pub(crate) fn filetime_to_datetime(ft: u64) -> Option<chrono::DateTime<chrono::Utc>> {
    if ft == 0 {
        return None;
    }
    const EPOCH_DELTA_SECS: i64 = 11_644_473_600;
    let secs = (ft / 10_000_000) as i64 - EPOCH_DELTA_SECS;
    let nanos = ((ft % 10_000_000) * 100) as u32;
    chrono::DateTime::from_timestamp(secs, nanos)
}
