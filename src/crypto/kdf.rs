//! Password-to-master-key derivation.
//!
//! Windows never feeds a password to a record directly. The chain is:
//!
//! 1. Hash the UTF-16LE password (SHA-1, and MD4 for the NTLM form).
//! 2. Bind the hash to the owning SID: `HMAC-SHA1(hash, UTF-16LE(sid + NUL))`.
//!    Windows 10 local accounts strengthen the NTLM hash with PBKDF2-SHA256
//!    first (`WIN10_PREKEY_ROUNDS`), then bind.
//! 3. Stretch the SID-bound key with the record's salt and round count using
//!    Microsoft's PBKDF2 variant, split into cipher key + IV, CBC-decrypt the
//!    record, and check the embedded two-stage HMAC verifier.
//!
//! The PBKDF2 here is *not* RFC 2898: the block counter is big-endian like
//! the RFC, but each inner round feeds the accumulated XOR value back into
//! the HMAC instead of the previous HMAC output. Both algorithm generations
//! (SHA-1/3DES and SHA-512/AES-256) go through the same variant.

use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use md4::{Digest, Md4};
use pbkdf2::pbkdf2_hmac;
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::crypto::algs::{CipherKind, HashKind};
use crate::crypto::cipher::cbc_decrypt;
use crate::crypto::keys::{MasterKey, MASTER_KEY_LEN};
use crate::errors::{DpapiError, Result};
use crate::format::masterkey::KeyDerivationRecord;
use crate::format::reader::utf16le_bytes;

/// PBKDF2-SHA256 rounds of the Windows 10 local-account prekey.
pub const WIN10_PREKEY_ROUNDS: u32 = 10_000;

/// HMAC salt prefix length inside a decrypted master-key record.
const RECORD_HMAC_SALT_LEN: usize = 16;

/// SHA-1 of the UTF-16LE password, the hash Windows itself caches.
pub fn sha1_prekey(password: &str) -> Zeroizing<Vec<u8>> {
    let pw = Zeroizing::new(utf16le_bytes(password));
    Zeroizing::new(Sha1::digest(&pw).to_vec())
}

/// NTLM hash: MD4 of the UTF-16LE password.
pub fn ntlm_prekey(password: &str) -> Zeroizing<Vec<u8>> {
    let pw = Zeroizing::new(utf16le_bytes(password));
    Zeroizing::new(Md4::digest(&pw).to_vec())
}

/// Binds a password hash to its SID: `HMAC-SHA1(hash, UTF-16LE(sid + NUL))`.
/// The result is what actually keys the record KDF.
pub fn sid_bound_key(prekey: &[u8], sid: &str) -> Zeroizing<Vec<u8>> {
    let mut msg = Zeroizing::new(utf16le_bytes(sid));
    msg.extend_from_slice(&[0, 0]);
    Zeroizing::new(hmac_digest(HashKind::Sha1, prekey, &[&msg]))
}

/// Windows 10 strengthening of a stored hash before SID binding:
/// PBKDF2-SHA256 over the SID (no NUL), 10000 rounds, then a single further
/// round, truncated to 16 bytes. This is standard RFC-2898 PBKDF2, unlike
/// the record KDF below.
pub fn win10_strengthened(hash: &[u8], sid: &str) -> Zeroizing<Vec<u8>> {
    let sid_bytes = utf16le_bytes(sid);
    let mut stage = Zeroizing::new([0u8; 32]);
    pbkdf2_hmac::<Sha256>(hash, &sid_bytes, WIN10_PREKEY_ROUNDS, stage.as_mut());
    let mut full = Zeroizing::new([0u8; 32]);
    pbkdf2_hmac::<Sha256>(stage.as_ref(), &sid_bytes, 1, full.as_mut());
    Zeroizing::new(full[..16].to_vec())
}

/// Ordered SID-bound candidates for a cleartext password: SHA-1 form first
/// (the common case), then NTLM, then the Windows 10 strengthened NTLM.
pub(crate) fn password_candidates(password: &str, sid: &str) -> Vec<Zeroizing<Vec<u8>>> {
    let sha1 = sha1_prekey(password);
    let ntlm = ntlm_prekey(password);
    vec![
        sid_bound_key(&sha1, sid),
        sid_bound_key(&ntlm, sid),
        sid_bound_key(&win10_strengthened(&ntlm, sid), sid),
    ]
}

/// Ordered SID-bound candidates for a raw SHA-1 or NTLM hash.
pub(crate) fn hash_candidates(hash: &[u8], sid: &str) -> Vec<Zeroizing<Vec<u8>>> {
    vec![
        sid_bound_key(hash, sid),
        sid_bound_key(&win10_strengthened(hash, sid), sid),
    ]
}

/// Microsoft's PBKDF2 variant (see module docs for how it deviates from the
/// RFC). With `rounds == 1` the two definitions coincide.
pub fn ms_pbkdf2(
    kind: HashKind,
    secret: &[u8],
    salt: &[u8],
    rounds: u32,
    out_len: usize,
) -> Zeroizing<Vec<u8>> {
    match kind {
        HashKind::Sha1 => ms_pbkdf2_impl::<Hmac<Sha1>>(secret, salt, rounds, out_len),
        HashKind::Sha512 => ms_pbkdf2_impl::<Hmac<Sha512>>(secret, salt, rounds, out_len),
    }
}

fn ms_pbkdf2_impl<M: Mac + KeyInit + Clone>(
    secret: &[u8],
    salt: &[u8],
    rounds: u32,
    out_len: usize,
) -> Zeroizing<Vec<u8>> {
    // HMAC accepts keys of any length; the error branch is unreachable.
    let base = <M as Mac>::new_from_slice(secret).expect("HMAC key");
    let mut out = Zeroizing::new(Vec::with_capacity(out_len));
    let mut block_index: u32 = 1;
    while out.len() < out_len {
        let mut mac = base.clone();
        mac.update(salt);
        mac.update(&block_index.to_be_bytes());
        let mut acc = mac.finalize().into_bytes();
        for _ in 1..rounds.max(1) {
            let mut mac = base.clone();
            mac.update(&acc);
            let next = mac.finalize().into_bytes();
            for (a, n) in acc.iter_mut().zip(next.iter()) {
                *a ^= n;
            }
        }
        out.extend_from_slice(&acc);
        block_index += 1;
    }
    out.truncate(out_len);
    out
}

/// Derives the record cipher key + IV from a SID-bound key and CBC-decrypts
/// the record payload. Shared by master-key records and credhist entries.
pub fn derive_and_decrypt(
    cipher: CipherKind,
    hash: HashKind,
    sid_key: &[u8],
    salt: &[u8],
    rounds: u32,
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    let derived = ms_pbkdf2(hash, sid_key, salt, rounds, cipher.key_len() + cipher.iv_len());
    let (key, iv) = derived.split_at(cipher.key_len());
    cbc_decrypt(cipher, key, iv, ciphertext).map(Zeroizing::new)
}

/// The two-stage HMAC embedded in decrypted master-key records:
/// `HMAC(HMAC(sid_key, hmac_salt), master_key)`.
pub fn record_verifier(kind: HashKind, sid_key: &[u8], hmac_salt: &[u8], key: &[u8]) -> Vec<u8> {
    let enc_key = Zeroizing::new(hmac_digest(kind, sid_key, &[hmac_salt]));
    hmac_digest(kind, &enc_key, &[key])
}

/// Attempts one candidate against one record. `WrongCredential` means the
/// ciphertext decrypted structurally but the verifier did not match; it is
/// the expected outcome for every candidate except the right one.
pub fn unlock_record(record: &KeyDerivationRecord, sid_key: &[u8]) -> Result<MasterKey> {
    let clear = derive_and_decrypt(
        record.cipher,
        record.hash,
        sid_key,
        &record.salt,
        record.rounds,
        &record.ciphertext,
    )?;
    let digest_len = record.hash.digest_len();
    if clear.len() < RECORD_HMAC_SALT_LEN + digest_len + MASTER_KEY_LEN {
        return Err(DpapiError::MalformedStructure(
            "master key record plaintext too short".into(),
        ));
    }
    let hmac_salt = &clear[..RECORD_HMAC_SALT_LEN];
    let stored = &clear[RECORD_HMAC_SALT_LEN..RECORD_HMAC_SALT_LEN + digest_len];
    let key_bytes = &clear[clear.len() - MASTER_KEY_LEN..];

    let computed = record_verifier(record.hash, sid_key, hmac_salt, key_bytes);
    if bool::from(computed.ct_eq(stored)) {
        let mut out = [0u8; MASTER_KEY_LEN];
        out.copy_from_slice(key_bytes);
        Ok(MasterKey::new(out))
    } else {
        Err(DpapiError::WrongCredential)
    }
}

/// HMAC over concatenated parts with the digest picked at runtime.
pub(crate) fn hmac_digest(kind: HashKind, key: &[u8], parts: &[&[u8]]) -> Vec<u8> {
    match kind {
        HashKind::Sha1 => {
            let mut mac = <Hmac<Sha1> as Mac>::new_from_slice(key).expect("HMAC key");
            for p in parts {
                mac.update(p);
            }
            mac.finalize().into_bytes().to_vec()
        }
        HashKind::Sha512 => {
            let mut mac = <Hmac<Sha512> as Mac>::new_from_slice(key).expect("HMAC key");
            for p in parts {
                mac.update(p);
            }
            mac.finalize().into_bytes().to_vec()
        }
    }
}
