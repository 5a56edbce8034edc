//! The `CryptProtectData` output envelope.
//!
//! A blob names the master key that protects it, the cipher and digest it
//! was sealed with, a salt, and a trailing signature over everything from
//! the master key version up to the end of the ciphertext. The signed span
//! is captured verbatim at parse time because the signature check needs the
//! exact bytes, padding quirks included, not a re-serialization.

use crate::crypto::algs::{CipherKind, HashKind};
use crate::errors::{DpapiError, Result};
use crate::format::guid::Guid;
use crate::format::reader::{utf16le_to_string, Reader};

/// Provider GUID every user-scope blob carries, in the native byte layout:
/// df9d8cd0-1501-11d1-8c7a-00c04fc297eb.
pub(crate) const PROVIDER: [u8; 16] = [
    0xd0, 0x8c, 0x9d, 0xdf, 0x01, 0x15, 0xd1, 0x11, 0x8c, 0x7a, 0x00, 0xc0, 0x4f, 0xc2, 0x97,
    0xeb,
];

#[derive(Debug, Clone)]
pub struct DpapiBlob {
    pub version: u32,
    pub provider: Guid,
    pub master_key_version: u32,
    /// Which pool entry can open this blob.
    pub master_key_guid: Guid,
    pub flags: u32,
    pub description: String,
    pub cipher: CipherKind,
    pub key_bits: u32,
    pub salt: Vec<u8>,
    /// "Strong entropy" slot. Windows writes it empty for user blobs; it is
    /// surfaced for inspection but takes no part in decryption here.
    pub strong: Vec<u8>,
    pub hash: HashKind,
    pub hash_bits: u32,
    /// Nonce for the signature HMAC. Distinct from `salt`, which keys the
    /// session key.
    pub hmac_nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub signature: Vec<u8>,
    signed_span: Vec<u8>,
}

impl DpapiBlob {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        let version = r.read_u32_le("blob version")?;
        let provider_raw = r.read_array::<16>("blob provider guid")?;
        if version != 1 || provider_raw != PROVIDER {
            return Err(DpapiError::MalformedStructure(format!(
                "not a DPAPI blob (version {version}, provider {})",
                Guid::from_le_bytes(provider_raw),
            )));
        }
        let provider = Guid::from_le_bytes(provider_raw);

        let signed_start = r.pos();
        let master_key_version = r.read_u32_le("blob master key version")?;
        let master_key_guid = Guid::from_le_bytes(r.read_array::<16>("blob master key guid")?);
        let flags = r.read_u32_le("blob flags")?;
        let description = utf16le_to_string(r.read_len_prefixed("blob description")?);
        let cipher = CipherKind::from_alg_id(r.read_u32_le("blob cipher algorithm")?)?;
        let key_bits = r.read_u32_le("blob key bits")?;
        let salt = r.read_len_prefixed("blob salt")?.to_vec();
        let strong = r.read_len_prefixed("blob strong entropy")?.to_vec();
        let hash = HashKind::from_alg_id(r.read_u32_le("blob hash algorithm")?)?;
        let hash_bits = r.read_u32_le("blob hash bits")?;
        let hmac_nonce = r.read_len_prefixed("blob hmac nonce")?.to_vec();
        let ciphertext = r.read_len_prefixed("blob ciphertext")?.to_vec();
        let signed_span = bytes[signed_start..r.pos()].to_vec();
        let signature = r.read_len_prefixed("blob signature")?.to_vec();

        if ciphertext.is_empty() || ciphertext.len() % cipher.block_len() != 0 {
            return Err(DpapiError::MalformedStructure(format!(
                "blob ciphertext of {} bytes is not a positive multiple of the {} block",
                ciphertext.len(),
                cipher.label(),
            )));
        }
        if signature.is_empty() {
            return Err(DpapiError::MalformedStructure("blob carries no signature".into()));
        }

        Ok(DpapiBlob {
            version,
            provider,
            master_key_version,
            master_key_guid,
            flags,
            description,
            cipher,
            key_bits,
            salt,
            strong,
            hash,
            hash_bits,
            hmac_nonce,
            ciphertext,
            signature,
            signed_span,
        })
    }

    /// The exact bytes the trailing signature covers: master key version
    /// through end of ciphertext.
    pub fn signed_span(&self) -> &[u8] {
        &self.signed_span
    }
}
