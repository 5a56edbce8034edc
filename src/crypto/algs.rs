//! Windows CryptoAPI algorithm identifiers used by DPAPI structures.
//!
//! Records declare their cipher and hash as raw ALG_ID values. Those are
//! resolved here, once, at decode time; everything downstream matches on the
//! closed enums and never sees a magic number. Adding support for another
//! algorithm means adding a variant and letting the compiler point at every
//! match that needs extending.

use serde::Serialize;

use crate::errors::{DpapiError, Result};

// ALG_ID values from wincrypt.h.
pub const CALG_3DES: u32 = 0x6603;
pub const CALG_AES_128: u32 = 0x660e;
pub const CALG_AES_256: u32 = 0x6610;
pub const CALG_SHA1: u32 = 0x8004;
pub const CALG_HMAC: u32 = 0x8009; // HMAC-SHA1, used by version-1 records
pub const CALG_SHA_512: u32 = 0x800e;

/// Block ciphers DPAPI actually emits. AES-128 never shows up in master
/// key records, but vault key stores and the odd blob use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CipherKind {
    #[serde(rename = "des3")]
    TripleDes,
    #[serde(rename = "aes128")]
    Aes128,
    #[serde(rename = "aes256")]
    Aes256,
}

impl CipherKind {
    pub fn from_alg_id(id: u32) -> Result<Self> {
        match id {
            CALG_3DES => Ok(CipherKind::TripleDes),
            CALG_AES_128 => Ok(CipherKind::Aes128),
            CALG_AES_256 => Ok(CipherKind::Aes256),
            other => Err(DpapiError::UnsupportedAlgorithm(other)),
        }
    }

    pub fn alg_id(self) -> u32 {
        match self {
            CipherKind::TripleDes => CALG_3DES,
            CipherKind::Aes128 => CALG_AES_128,
            CipherKind::Aes256 => CALG_AES_256,
        }
    }

    /// Key length in bytes (3DES keys include the parity bits).
    pub fn key_len(self) -> usize {
        match self {
            CipherKind::TripleDes => 24,
            CipherKind::Aes128 => 16,
            CipherKind::Aes256 => 32,
        }
    }

    pub fn iv_len(self) -> usize {
        self.block_len()
    }

    pub fn block_len(self) -> usize {
        match self {
            CipherKind::TripleDes => 8,
            CipherKind::Aes128 | CipherKind::Aes256 => 16,
        }
    }

    /// Name used in the `$DPAPImk$` crackable export.
    pub fn label(self) -> &'static str {
        match self {
            CipherKind::TripleDes => "des3",
            CipherKind::Aes128 => "aes128",
            CipherKind::Aes256 => "aes256",
        }
    }
}

/// Digests DPAPI records declare for derivation and verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HashKind {
    Sha1,
    Sha512,
}

impl HashKind {
    pub fn from_alg_id(id: u32) -> Result<Self> {
        match id {
            // Version-1 records say "HMAC" where they mean SHA-1.
            CALG_SHA1 | CALG_HMAC => Ok(HashKind::Sha1),
            CALG_SHA_512 => Ok(HashKind::Sha512),
            other => Err(DpapiError::UnsupportedAlgorithm(other)),
        }
    }

    pub fn alg_id(self) -> u32 {
        match self {
            HashKind::Sha1 => CALG_SHA1,
            HashKind::Sha512 => CALG_SHA_512,
        }
    }

    pub fn digest_len(self) -> usize {
        match self {
            HashKind::Sha1 => 20,
            HashKind::Sha512 => 64,
        }
    }

    /// Internal block size, which drives the pad-based key expansions.
    pub fn block_len(self) -> usize {
        match self {
            HashKind::Sha1 => 64,
            HashKind::Sha512 => 128,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            HashKind::Sha1 => "sha1",
            HashKind::Sha512 => "sha512",
        }
    }
}
