//! Windows GUIDs as they appear inside DPAPI structures.
//!
//! On disk a GUID is 16 bytes in the native Windows layout: the first three
//! groups little-endian, the final eight bytes in order. Master key *files*
//! spell the same GUID as 36 characters of UTF-16LE text instead; both forms
//! normalize into this one type so pool lookups never compare raw encodings.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{DpapiError, Result};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Guid {
    data1: u32,
    data2: u16,
    data3: u16,
    data4: [u8; 8],
}

impl Guid {
    /// Interprets 16 bytes in the native (mixed-endian) Windows layout.
    pub fn from_le_bytes(bytes: [u8; 16]) -> Self {
        let mut data4 = [0u8; 8];
        data4.copy_from_slice(&bytes[8..16]);
        Guid {
            data1: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            data2: u16::from_le_bytes([bytes[4], bytes[5]]),
            data3: u16::from_le_bytes([bytes[6], bytes[7]]),
            data4,
        }
    }

    /// Serializes back to the native 16-byte layout.
    pub fn to_le_bytes(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&self.data1.to_le_bytes());
        out[4..6].copy_from_slice(&self.data2.to_le_bytes());
        out[6..8].copy_from_slice(&self.data3.to_le_bytes());
        out[8..16].copy_from_slice(&self.data4);
        out
    }

    /// Parses the canonical text form, with or without surrounding braces.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim().trim_start_matches('{').trim_end_matches('}');
        let malformed = || DpapiError::MalformedStructure(format!("invalid GUID '{text}'"));

        let parts: Vec<&str> = text.split('-').collect();
        if parts.len() != 5
            || parts[0].len() != 8
            || parts[1].len() != 4
            || parts[2].len() != 4
            || parts[3].len() != 4
            || parts[4].len() != 12
        {
            return Err(malformed());
        }
        let data1 = u32::from_str_radix(parts[0], 16).map_err(|_| malformed())?;
        let data2 = u16::from_str_radix(parts[1], 16).map_err(|_| malformed())?;
        let data3 = u16::from_str_radix(parts[2], 16).map_err(|_| malformed())?;
        let tail: Vec<u8> =
            hex::decode(format!("{}{}", parts[3], parts[4])).map_err(|_| malformed())?;
        Ok(Guid {
            data1,
            data2,
            data3,
            data4: tail.try_into().map_err(|_| malformed())?,
        })
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.data1,
            self.data2,
            self.data3,
            self.data4[0],
            self.data4[1],
            self.data4[2],
            self.data4[3],
            self.data4[4],
            self.data4[5],
            self.data4[6],
            self.data4[7],
        )
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({self})")
    }
}

impl From<Guid> for String {
    fn from(g: Guid) -> String {
        g.to_string()
    }
}

impl TryFrom<String> for Guid {
    type Error = DpapiError;

    fn try_from(s: String) -> Result<Self> {
        Guid::parse(&s)
    }
}
