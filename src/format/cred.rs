//! Credential Manager files and the credential structure inside them.
//!
//! On disk a credential file is a 12-byte header wrapping one ordinary
//! blob. The interesting structure only exists *after* that blob is
//! decrypted: a fixed 48-byte prefix followed by six length-prefixed
//! UTF-16LE strings, the last of which is the stored secret. Parsing is
//! therefore split: `CredFile::parse` for the container, and
//! `Credential::parse` for the plaintext a pool-backed decryption yields.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::errors::Result;
use crate::format::blob::DpapiBlob;
use crate::format::reader::{
    filetime_to_datetime, utf16le_to_string, utf16le_to_string_strict, Reader,
};

#[derive(Debug, Clone)]
pub struct CredFile {
    pub version: u32,
    pub blob: DpapiBlob,
}

impl CredFile {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        let version = r.read_u32_le("credential file version")?;
        let blob_size = r.read_u32_le("credential file blob size")? as usize;
        r.skip(4, "credential file header")?;
        let blob = DpapiBlob::parse(r.read_bytes(blob_size, "credential file blob")?)?;
        Ok(CredFile { version, blob })
    }
}

/// The secret slot of a credential. Usually a UTF-16 password, but some
/// applications store raw bytes there; those are kept as-is rather than
/// mangled through a lossy decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredSecret {
    Text(String),
    Raw(Vec<u8>),
}

// JSON: {"text": "..."} for passwords, {"raw": "<base64>"} for binary
// secrets.
impl Serialize for CredSecret {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            CredSecret::Text(text) => {
                serializer.serialize_newtype_variant("CredSecret", 0, "text", text)
            }
            CredSecret::Raw(bytes) => {
                serializer.serialize_newtype_variant("CredSecret", 1, "raw", &BASE64.encode(bytes))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Credential {
    pub cred_type: u32,
    pub flags: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_written: Option<DateTime<Utc>>,
    pub persist: u32,
    pub attribute_count: u32,
    pub target: String,
    pub alias: String,
    pub comment: String,
    pub username: String,
    pub secret: CredSecret,
}

impl Credential {
    /// Parses the plaintext of a decrypted credential blob.
    pub fn parse(clear: &[u8]) -> Result<Self> {
        let mut r = Reader::new(clear);
        r.skip(12, "credential header")?;
        let cred_type = r.read_u32_le("credential type")?;
        let flags = r.read_u32_le("credential flags")?;
        let last_written = filetime_to_datetime(r.read_u64_le("credential timestamp")?);
        r.skip(4, "credential header")?;
        let persist = r.read_u32_le("credential persist")?;
        let attribute_count = r.read_u32_le("credential attribute count")?;
        r.skip(8, "credential header")?;

        let target = utf16le_to_string(r.read_len_prefixed("credential target")?);
        let alias = utf16le_to_string(r.read_len_prefixed("credential alias")?);
        let comment = utf16le_to_string(r.read_len_prefixed("credential comment")?);
        r.read_len_prefixed("credential reserved field")?;
        let username = utf16le_to_string(r.read_len_prefixed("credential username")?);
        let secret_raw = r.read_len_prefixed("credential secret")?;

        let secret = match utf16le_to_string_strict(secret_raw) {
            Some(text) => CredSecret::Text(text),
            None => CredSecret::Raw(secret_raw.to_vec()),
        };

        Ok(Credential {
            cred_type,
            flags,
            last_written,
            persist,
            attribute_count,
            target,
            alias,
            comment,
            username,
            secret,
        })
    }
}
