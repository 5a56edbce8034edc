//! Master key files and the `Preferred` marker.
//!
//! Each file under `%APPDATA%\Microsoft\Protect\<SID>\` holds up to four
//! sections behind a fixed 128-byte header: the user master key, a local
//! backup key, a reference into the credential history chain, and (for
//! domain accounts) a domain backup key. The two key sections share one
//! record shape; the domain section is a different envelope that only a
//! domain controller's RSA key can open, so it is parsed but never
//! decrypted here.

use chrono::{DateTime, Utc};

use crate::crypto::algs::{CipherKind, HashKind};
use crate::crypto::keys::MASTER_KEY_LEN;
use crate::errors::{DpapiError, Result};
use crate::format::guid::Guid;
use crate::format::reader::{filetime_to_datetime, utf16le_to_string, Reader};

/// Salt length at the head of a key derivation record.
pub const RECORD_SALT_LEN: usize = 16;

/// One encrypted key inside a master key file. The same shape carries both
/// the user master key and the local backup key; only the prekey that
/// unlocks them differs.
#[derive(Debug, Clone)]
pub struct KeyDerivationRecord {
    pub version: u32,
    pub salt: [u8; RECORD_SALT_LEN],
    pub rounds: u32,
    pub hash: HashKind,
    pub cipher: CipherKind,
    pub ciphertext: Vec<u8>,
}

impl KeyDerivationRecord {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        let version = r.read_u32_le("key record version")?;
        let salt = r.read_array::<RECORD_SALT_LEN>("key record salt")?;
        let rounds = r.read_u32_le("key record rounds")?;
        let hash = HashKind::from_alg_id(r.read_u32_le("key record hash algorithm")?)?;
        let cipher = CipherKind::from_alg_id(r.read_u32_le("key record cipher algorithm")?)?;
        let ciphertext = r.take_rest().to_vec();

        if ciphertext.is_empty() || ciphertext.len() % cipher.block_len() != 0 {
            return Err(DpapiError::MalformedStructure(format!(
                "key record ciphertext of {} bytes is not a positive multiple of the {} block",
                ciphertext.len(),
                cipher.label(),
            )));
        }
        // Plaintext must hold HMAC salt + verifier + 64-byte key, so the
        // ciphertext (same length under CBC) must too.
        let min = RECORD_SALT_LEN + hash.digest_len() + MASTER_KEY_LEN;
        if ciphertext.len() < min {
            return Err(DpapiError::MalformedStructure(format!(
                "key record ciphertext of {} bytes cannot hold a {min}-byte key envelope",
                ciphertext.len(),
            )));
        }

        Ok(KeyDerivationRecord {
            version,
            salt,
            rounds,
            hash,
            cipher,
            ciphertext,
        })
    }
}

/// Pointer from a master key file into the credential history chain: the
/// GUID of the history entry that was current when this key was written.
#[derive(Debug, Clone, Copy)]
pub struct CredHistRef {
    pub version: u32,
    pub guid: Guid,
}

/// Domain backup envelope. The secret inside is sealed to the domain
/// controller's backup RSA key, which an offline engine never has, so only
/// the framing is kept.
#[derive(Debug, Clone)]
pub struct DomainKeyRecord {
    pub version: u32,
    pub guid: Guid,
    pub secret: Vec<u8>,
    pub access_check: Vec<u8>,
}

impl DomainKeyRecord {
    fn parse(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        let version = r.read_u32_le("domain key version")?;
        let secret_len = r.read_u32_le("domain key secret length")? as usize;
        let access_check_len = r.read_u32_le("domain key access check length")? as usize;
        let guid = Guid::from_le_bytes(r.read_array::<16>("domain key guid")?);
        let secret = r.read_bytes(secret_len, "domain key secret")?.to_vec();
        let access_check = r.read_bytes(access_check_len, "domain key access check")?.to_vec();
        Ok(DomainKeyRecord {
            version,
            guid,
            secret,
            access_check,
        })
    }
}

#[derive(Debug, Clone)]
pub struct MasterKeyFile {
    pub version: u32,
    /// GUID the file spells out in its header. File names repeat it, but
    /// the header is authoritative for pool lookups.
    pub guid: Guid,
    pub flags: u32,
    pub master_key: Option<KeyDerivationRecord>,
    pub backup_key: Option<KeyDerivationRecord>,
    pub credhist_ref: Option<CredHistRef>,
    pub domain_key: Option<DomainKeyRecord>,
}

impl MasterKeyFile {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        let version = r.read_u32_le("master key file version")?;
        r.skip(8, "master key file header")?;
        let guid_text = utf16le_to_string(r.read_bytes(72, "master key file guid")?);
        r.skip(8, "master key file header")?;
        let flags = r.read_u32_le("master key file flags")?;
        let master_len = r.read_u64_le("master key section length")? as usize;
        let backup_len = r.read_u64_le("backup key section length")? as usize;
        let credhist_len = r.read_u64_le("credhist section length")? as usize;
        let domain_len = r.read_u64_le("domain key section length")? as usize;

        let guid = Guid::parse(&guid_text)?;

        let master_key = if master_len > 0 {
            Some(KeyDerivationRecord::parse(
                r.read_bytes(master_len, "master key section")?,
            )?)
        } else {
            None
        };
        let backup_key = if backup_len > 0 {
            Some(KeyDerivationRecord::parse(
                r.read_bytes(backup_len, "backup key section")?,
            )?)
        } else {
            None
        };
        let credhist_ref = if credhist_len > 0 {
            let mut section = Reader::new(r.read_bytes(credhist_len, "credhist section")?);
            Some(CredHistRef {
                version: section.read_u32_le("credhist ref version")?,
                guid: Guid::from_le_bytes(section.read_array::<16>("credhist ref guid")?),
            })
        } else {
            None
        };
        let domain_key = if domain_len > 0 {
            Some(DomainKeyRecord::parse(
                r.read_bytes(domain_len, "domain key section")?,
            )?)
        } else {
            None
        };

        Ok(MasterKeyFile {
            version,
            guid,
            flags,
            master_key,
            backup_key,
            credhist_ref,
            domain_key,
        })
    }

    /// The record credentials are tried against. Backup and domain sections
    /// need keys a user credential can never produce.
    pub fn key_record(&self) -> Option<&KeyDerivationRecord> {
        self.master_key.as_ref()
    }
}

/// The `Preferred` file next to the master keys: the GUID of the key
/// Windows currently protects new blobs with, and when it rotates.
#[derive(Debug, Clone, Copy)]
pub struct Preferred {
    pub guid: Guid,
    pub expires: Option<DateTime<Utc>>,
}

impl Preferred {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        let guid = Guid::from_le_bytes(r.read_array::<16>("preferred guid")?);
        let expires = filetime_to_datetime(r.read_u64_le("preferred expiry")?);
        Ok(Preferred { guid, expires })
    }
}
