//! CREDHIST, the password-change history chain.
//!
//! The file opens with a 24-byte head (version, GUID of the current entry,
//! and a zero u32 that doubles as the walk terminator) and grows by
//! appending one record per password change. Each record is framed as
//! `[entry bytes][u32 total record length]`, so the only way to walk it is
//! from the end of the file backwards, newest entry first. That is also the
//! decryption order: the current password's SHA-1 opens the newest entry,
//! whose plaintext is the previous password's hashes, and so on down the
//! chain.
//!
//! Entries carry no verifier. Decrypting with a wrong hash produces garbage
//! that only fails later, when the recovered hashes are tried against a
//! master key record.

use tracing::warn;
use zeroize::Zeroizing;

use crate::crypto::algs::{CipherKind, HashKind};
use crate::crypto::kdf::{derive_and_decrypt, sid_bound_key};
use crate::errors::{DpapiError, Result};
use crate::format::guid::Guid;
use crate::format::reader::Reader;

const HEAD_LEN: usize = 24;
// shaLen + ntLen in any real entry is 36; this only bounds hostile values.
const MAX_HASH_BYTES: u32 = 256;

/// One historical password: the parameters needed to decrypt its SHA-1 and
/// NTLM hashes with the next-newer password's SHA-1.
#[derive(Debug, Clone)]
pub struct CredHistEntry {
    pub revision: u32,
    pub hash: HashKind,
    pub rounds: u32,
    pub cipher: CipherKind,
    pub sha_len: u32,
    pub nt_len: u32,
    /// KDF salt. The CBC IV is derived, not this field.
    pub iv: [u8; 16],
    /// SID the entry is bound to, rendered in the usual `S-1-…` text form.
    pub sid: String,
    pub encrypted: Vec<u8>,
    pub guid: Guid,
}

/// Hashes recovered from one chain link.
pub struct HistoryHashes {
    pub sha1: Zeroizing<Vec<u8>>,
    /// `None` when the entry stores no usable NTLM hash.
    pub ntlm: Option<Zeroizing<Vec<u8>>>,
}

impl CredHistEntry {
    fn parse(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        let revision = r.read_u32_le("credhist entry revision")?;
        let hash = HashKind::from_alg_id(r.read_u32_le("credhist entry hash algorithm")?)?;
        let rounds = r.read_u32_le("credhist entry rounds")?;
        r.skip(4, "credhist entry")?;
        let cipher = CipherKind::from_alg_id(r.read_u32_le("credhist entry cipher algorithm")?)?;
        let sha_len = r.read_u32_le("credhist entry sha1 length")?;
        let nt_len = r.read_u32_le("credhist entry ntlm length")?;
        let iv = r.read_array::<16>("credhist entry salt")?;
        let sid = read_binary_sid(&mut r)?;

        let hash_bytes = sha_len.checked_add(nt_len).filter(|&n| n <= MAX_HASH_BYTES);
        let Some(hash_bytes) = hash_bytes else {
            return Err(DpapiError::MalformedStructure(format!(
                "credhist entry declares {sha_len}+{nt_len} hash bytes"
            )));
        };
        let mut enc_len = hash_bytes as usize;
        enc_len += (cipher.block_len() - enc_len % cipher.block_len()) % cipher.block_len();
        let encrypted = r.read_bytes(enc_len, "credhist entry ciphertext")?.to_vec();

        let _revision2 = r.read_u32_le("credhist entry trailer")?;
        let guid = Guid::from_le_bytes(r.read_array::<16>("credhist entry guid")?);

        Ok(CredHistEntry {
            revision,
            hash,
            rounds,
            cipher,
            sha_len,
            nt_len,
            iv,
            sid,
            encrypted,
            guid,
        })
    }

    /// Decrypts this entry with the SHA-1 hash of the password one change
    /// newer. Structural success only; garbage in, garbage out.
    pub fn decrypt_with_hash(&self, newer_sha1: &[u8]) -> Result<HistoryHashes> {
        let sid_key = sid_bound_key(newer_sha1, &self.sid);
        let clear = derive_and_decrypt(
            self.cipher,
            self.hash,
            &sid_key,
            &self.iv,
            self.rounds,
            &self.encrypted,
        )?;
        let sha_end = self.sha_len as usize;
        let nt_end = sha_end + self.nt_len as usize;
        if clear.len() < nt_end {
            return Err(DpapiError::MalformedStructure(
                "credhist entry plaintext shorter than declared hashes".into(),
            ));
        }
        let sha1 = Zeroizing::new(clear[..sha_end].to_vec());
        let mut nt: Vec<u8> = clear[sha_end..nt_end].to_vec();
        while nt.last() == Some(&0) {
            nt.pop();
        }
        let ntlm = (nt.len() == 16).then(|| Zeroizing::new(nt));
        Ok(HistoryHashes { sha1, ntlm })
    }
}

#[derive(Debug, Clone)]
pub struct CredHistFile {
    pub version: u32,
    /// GUID of the entry the *current* password would append next.
    pub current: Guid,
    /// Newest first, the order decryption must proceed in.
    pub entries: Vec<CredHistEntry>,
}

impl CredHistFile {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEAD_LEN {
            return Err(DpapiError::Truncated {
                context: "credhist head",
                needed: HEAD_LEN,
                available: bytes.len(),
            });
        }
        let mut head = Reader::new(&bytes[..HEAD_LEN]);
        let version = head.read_u32_le("credhist version")?;
        let current = Guid::from_le_bytes(head.read_array::<16>("credhist current guid")?);

        // Records end with their own length, so walk from the tail. The
        // zero u32 closing the head stops a well-formed walk.
        let mut entries = Vec::new();
        let mut end = bytes.len();
        while end > HEAD_LEN {
            let len_field = &bytes[end - 4..end];
            let record_len =
                u32::from_le_bytes([len_field[0], len_field[1], len_field[2], len_field[3]])
                    as usize;
            if record_len == 0 {
                break;
            }
            if record_len < 4 || record_len > end - (HEAD_LEN - 4) {
                warn!(
                    offset = end,
                    record_len, "credhist record framing out of bounds, stopping walk"
                );
                break;
            }
            match CredHistEntry::parse(&bytes[end - record_len..end - 4]) {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    warn!(offset = end, %err, "unreadable credhist record, stopping walk");
                    break;
                }
            }
            end -= record_len;
        }

        Ok(CredHistFile {
            version,
            current,
            entries,
        })
    }
}

/// Binary SID: revision, subauthority count, 6-byte big-endian authority,
/// then the subauthorities as u32 LE.
fn read_binary_sid(r: &mut Reader<'_>) -> Result<String> {
    use std::fmt::Write;

    let revision = r.read_u8("sid revision")?;
    let count = r.read_u8("sid subauthority count")? as usize;
    if count > 15 {
        return Err(DpapiError::MalformedStructure(format!(
            "SID declares {count} subauthorities"
        )));
    }
    let auth = r.read_array::<6>("sid authority")?;
    let authority = auth.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
    let mut out = format!("S-{revision}-{authority}");
    for _ in 0..count {
        let sub = r.read_u32_le("sid subauthority")?;
        // Writing to a String cannot fail.
        let _ = write!(out, "-{sub}");
    }
    Ok(out)
}
