//! Forward construction of the on-disk artifacts the engine decrypts:
//! master key files, CREDHIST chains, blobs, credential files and vault
//! directories, all sealed with real derivations so the decryptors are
//! exercised end to end.

#![allow(dead_code)]

use std::path::Path;

use unprotect::crypto::algs::{CALG_AES_256, CALG_SHA1, CALG_SHA_512};
use unprotect::crypto::kdf::{ntlm_prekey, sha1_prekey, sid_bound_key};
use unprotect::crypto::{
    cbc_encrypt, crypt_derive_key, ms_pbkdf2, record_verifier, session_key, CipherKind, HashKind,
    MasterKey, SessionScheme,
};
use unprotect::format::Guid;
use unprotect::pool::MasterKeyPool;

pub const SID: &str = "S-1-5-21-466364039-425773974-453930460-1925";
pub const PASSWORD: &str = "Sup3rSecret!";
pub const KEY_GUID: &str = "7a6ef14f-bbf2-40b5-9d71-339e0de0f873";
/// KDF rounds for generated records. Low so unlock attempts stay quick.
pub const ROUNDS: u32 = 180;
/// Salt every generated key record carries, visible in `$DPAPImk$` exports.
pub const RECORD_SALT: [u8; 16] = [0x21; 16];

/// df9d8cd0-1501-11d1-8c7a-00c04fc297eb in the native byte layout.
const PROVIDER: [u8; 16] = [
    0xd0, 0x8c, 0x9d, 0xdf, 0x01, 0x15, 0xd1, 0x11, 0x8c, 0x7a, 0x00, 0xc0, 0x4f, 0xc2, 0x97,
    0xeb,
];

pub fn utf16le(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

fn push_len(out: &mut Vec<u8>, payload: &[u8]) {
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
}

pub fn master_key_bytes(seed: u8) -> [u8; 64] {
    let mut out = [0u8; 64];
    for (i, b) in out.iter_mut().enumerate() {
        *b = seed.wrapping_mul(47).wrapping_add((i as u8).wrapping_mul(13)).wrapping_add(5);
    }
    out
}

// ---------------------------------------------------------------------------
// Master key files
// ---------------------------------------------------------------------------

/// Seals `master_key` into a SHA-512/AES-256 key record that the given
/// SID-bound key unlocks.
pub fn sealed_record_bytes(sid_key: &[u8], master_key: &[u8; 64], rounds: u32) -> Vec<u8> {
    let derived = ms_pbkdf2(HashKind::Sha512, sid_key, &RECORD_SALT, rounds, 32 + 16);
    let (key, iv) = derived.split_at(32);

    let hmac_salt = [0x77u8; 16];
    let verifier = record_verifier(HashKind::Sha512, sid_key, &hmac_salt, master_key);
    let mut clear = Vec::new();
    clear.extend_from_slice(&hmac_salt);
    clear.extend_from_slice(&verifier);
    clear.extend_from_slice(master_key);
    let ciphertext = cbc_encrypt(CipherKind::Aes256, key, iv, &clear).unwrap();

    let mut out = Vec::new();
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&RECORD_SALT);
    out.extend_from_slice(&rounds.to_le_bytes());
    out.extend_from_slice(&CALG_SHA_512.to_le_bytes());
    out.extend_from_slice(&CALG_AES_256.to_le_bytes());
    out.extend_from_slice(&ciphertext);
    out
}

pub fn key_record_bytes(password: &str, sid: &str, master_key: &[u8; 64], rounds: u32) -> Vec<u8> {
    sealed_record_bytes(&sid_bound_key(&sha1_prekey(password), sid), master_key, rounds)
}

/// A complete master key file holding one user key record and nothing in
/// the backup, credhist and domain sections.
pub fn masterkey_file_bytes(guid: &str, record: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&[0; 8]);
    let mut guid_text = utf16le(guid);
    guid_text.resize(72, 0);
    out.extend_from_slice(&guid_text);
    out.extend_from_slice(&[0; 8]);
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(record.len() as u64).to_le_bytes());
    out.extend_from_slice(&0u64.to_le_bytes());
    out.extend_from_slice(&0u64.to_le_bytes());
    out.extend_from_slice(&0u64.to_le_bytes());
    out.extend_from_slice(record);
    out
}

pub fn preferred_bytes(guid: &str) -> Vec<u8> {
    let mut out = Guid::parse(guid).unwrap().to_le_bytes().to_vec();
    out.extend_from_slice(&131_277_024_000_000_000u64.to_le_bytes());
    out
}

/// The standard fixture: one master key file named after its GUID, sealed
/// under `PASSWORD`, plus the `Preferred` marker pointing at it.
pub fn protect_dir(master_key: &[u8; 64]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let record = key_record_bytes(PASSWORD, SID, master_key, ROUNDS);
    std::fs::write(
        dir.path().join(KEY_GUID),
        masterkey_file_bytes(KEY_GUID, &record),
    )
    .unwrap();
    std::fs::write(dir.path().join("Preferred"), preferred_bytes(KEY_GUID)).unwrap();
    dir
}

/// Pool over `dir` with the fixture SID, unlocked with `password`.
pub fn unlocked_pool(dir: &Path, password: &str) -> MasterKeyPool {
    let mut pool = MasterKeyPool::new(SID).unwrap();
    pool.load_directory(dir).unwrap();
    pool.try_credential(password);
    pool
}

// ---------------------------------------------------------------------------
// CREDHIST
// ---------------------------------------------------------------------------

/// A chain protecting `older_passwords` (most recent change first). Each
/// entry is sealed with the password one change newer; the file grows by
/// appending, so the oldest entry is framed first.
pub fn credhist_bytes(sid: &str, current_password: &str, older_passwords: &[&str]) -> Vec<u8> {
    let current = Guid::parse("9d18cc50-0d41-4bd4-a845-00b1a2a56a11").unwrap();
    let mut raw = Vec::new();
    raw.extend_from_slice(&1u32.to_le_bytes());
    raw.extend_from_slice(&current.to_le_bytes());
    raw.extend_from_slice(&0u32.to_le_bytes());

    let mut bodies = Vec::new();
    let mut newer = current_password;
    for (index, protected) in older_passwords.iter().enumerate() {
        bodies.push(credhist_entry_bytes(sid, newer, protected, index as u8));
        newer = protected;
    }
    for body in bodies.iter().rev() {
        raw.extend_from_slice(body);
        raw.extend_from_slice(&((body.len() + 4) as u32).to_le_bytes());
    }
    raw
}

fn credhist_entry_bytes(sid: &str, newer_password: &str, protected: &str, index: u8) -> Vec<u8> {
    // Plaintext: the protected password's SHA-1 and NTLM hashes, padded to
    // the AES block.
    let mut clear = Vec::new();
    clear.extend_from_slice(&sha1_prekey(protected));
    clear.extend_from_slice(&ntlm_prekey(protected));
    clear.resize(48, 0);

    let salt = [0x42 ^ index; 16];
    let sid_key = sid_bound_key(&sha1_prekey(newer_password), sid);
    let derived = ms_pbkdf2(HashKind::Sha1, &sid_key, &salt, ROUNDS, 32 + 16);
    let (key, iv) = derived.split_at(32);
    let encrypted = cbc_encrypt(CipherKind::Aes256, key, iv, &clear).unwrap();

    let guid =
        Guid::parse(&format!("00000000-0000-0000-0000-0000000000{index:02x}")).unwrap();
    let mut out = Vec::new();
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&CALG_SHA1.to_le_bytes());
    out.extend_from_slice(&ROUNDS.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&CALG_AES_256.to_le_bytes());
    out.extend_from_slice(&20u32.to_le_bytes());
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&salt);
    out.extend_from_slice(&binary_sid(sid));
    out.extend_from_slice(&encrypted);
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&guid.to_le_bytes());
    out
}

fn binary_sid(sid: &str) -> Vec<u8> {
    let mut parts = sid.split('-').skip(1);
    let revision: u8 = parts.next().unwrap().parse().unwrap();
    let authority: u64 = parts.next().unwrap().parse().unwrap();
    let subs: Vec<u32> = parts.map(|p| p.parse().unwrap()).collect();

    let mut out = vec![revision, subs.len() as u8];
    out.extend_from_slice(&authority.to_be_bytes()[2..]);
    for sub in subs {
        out.extend_from_slice(&sub.to_le_bytes());
    }
    out
}

// ---------------------------------------------------------------------------
// Blobs and credential files
// ---------------------------------------------------------------------------

/// A standard-scheme SHA-512/AES-256 blob protected by `master_key` and
/// naming `guid` as its master key.
pub fn blob_bytes(
    master_key: &MasterKey,
    guid: &str,
    plaintext: &[u8],
    entropy: Option<&[u8]>,
) -> Vec<u8> {
    let guid = Guid::parse(guid).unwrap();
    let salt = [0x51u8; 32];
    let nonce = [0x62u8; 32];
    let scheme = SessionScheme::Standard;

    let session = session_key(scheme, HashKind::Sha512, master_key.as_bytes(), &salt, entropy, None);
    let key = crypt_derive_key(HashKind::Sha512, CipherKind::Aes256, &session);
    let mut padded = plaintext.to_vec();
    let pad = 16 - padded.len() % 16;
    padded.extend(std::iter::repeat(pad as u8).take(pad));
    let ct = cbc_encrypt(CipherKind::Aes256, &key, &[0u8; 16], &padded).unwrap();

    let mut raw = Vec::new();
    raw.extend_from_slice(&1u32.to_le_bytes());
    raw.extend_from_slice(&PROVIDER);
    let signed_start = raw.len();
    raw.extend_from_slice(&2u32.to_le_bytes());
    raw.extend_from_slice(&guid.to_le_bytes());
    raw.extend_from_slice(&0u32.to_le_bytes());
    push_len(&mut raw, &[]);
    raw.extend_from_slice(&CALG_AES_256.to_le_bytes());
    raw.extend_from_slice(&256u32.to_le_bytes());
    push_len(&mut raw, &salt);
    push_len(&mut raw, &[]);
    raw.extend_from_slice(&CALG_SHA_512.to_le_bytes());
    raw.extend_from_slice(&512u32.to_le_bytes());
    push_len(&mut raw, &nonce);
    push_len(&mut raw, &ct);

    let signature = session_key(
        scheme,
        HashKind::Sha512,
        master_key.as_bytes(),
        &nonce,
        entropy,
        Some(&raw[signed_start..]),
    );
    push_len(&mut raw, &signature);
    raw
}

pub fn cred_file_bytes(blob: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&(blob.len() as u32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(blob);
    out
}

/// Plaintext of a generic credential with the given target, username and
/// secret slot.
pub fn credential_clear_bytes(target: &str, username: &str, secret: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&48u32.to_le_bytes());
    out.extend_from_slice(&200u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes()); // CRED_TYPE_GENERIC
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&131_277_024_000_000_000u64.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&2u32.to_le_bytes()); // CRED_PERSIST_LOCAL_MACHINE
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&[0; 8]);
    push_len(&mut out, &utf16le(target));
    push_len(&mut out, &[]); // alias
    push_len(&mut out, &[]); // comment
    push_len(&mut out, &[]); // reserved
    push_len(&mut out, &utf16le(username));
    push_len(&mut out, secret);
    out
}

// ---------------------------------------------------------------------------
// Vault files
// ---------------------------------------------------------------------------

/// Plaintext of a policy key blob: the KDBM store with both AES keys.
pub fn vault_keys_clear(aes128: &[u8], aes256: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; 12];
    out.extend_from_slice(b"KDBM");
    push_len(&mut out, aes128);
    out.extend_from_slice(&[0; 8]);
    out.extend_from_slice(b"KDBM");
    push_len(&mut out, aes256);
    out
}

pub fn vault_policy_bytes(key_blob: &[u8]) -> Vec<u8> {
    // The Web Credentials vault guid Windows ships with.
    let guid = Guid::parse("4bf4c442-9b8a-41a0-b380-dd4a704ddb28").unwrap();
    let mut out = Vec::new();
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&guid.to_le_bytes());
    push_len(&mut out, &utf16le("Web Credentials"));
    out.extend_from_slice(&[0; 12]);
    out.extend_from_slice(&(key_blob.len() as u32).to_le_bytes());
    out.extend_from_slice(&[0; 32]);
    push_len(&mut out, key_blob);
    out
}

pub fn vault_attribute_bytes(id: u32, iv: Option<&[u8]>, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&[0; 12]);
    if id >= 100 {
        out.extend_from_slice(&[0; 4]);
    }
    match iv {
        Some(iv) => {
            let size = 1 + 4 + iv.len() + data.len();
            out.extend_from_slice(&(size as u32).to_le_bytes());
            out.push(1);
            push_len(&mut out, iv);
        }
        None => {
            out.extend_from_slice(&((1 + data.len()) as u32).to_le_bytes());
            out.push(0);
        }
    }
    out.extend_from_slice(data);
    out
}

pub fn vcrd_bytes(name: &str, attrs: &[Vec<u8>]) -> Vec<u8> {
    let schema = Guid::parse("3ccd5499-87a8-4b10-a215-608888dd3b55").unwrap();
    let mut out = Vec::new();
    out.extend_from_slice(&schema.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&131_277_024_000_000_000u64.to_le_bytes());
    out.extend_from_slice(&[0; 8]);
    push_len(&mut out, &utf16le(name));

    let map_len = attrs.len() * 12;
    out.extend_from_slice(&(map_len as u32).to_le_bytes());
    let mut offset = out.len() + map_len;
    for (i, attr) in attrs.iter().enumerate() {
        out.extend_from_slice(&(i as u32 + 1).to_le_bytes());
        out.extend_from_slice(&(offset as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        offset += attr.len();
    }
    for attr in attrs {
        out.extend_from_slice(attr);
    }
    out
}

/// UTF-16 text sealed for a vault attribute: PKCS-padded, then CBC.
pub fn sealed_utf16(cipher: CipherKind, key: &[u8], iv: &[u8], text: &str) -> Vec<u8> {
    let mut padded = utf16le(text);
    let pad = 16 - padded.len() % 16;
    padded.extend(std::iter::repeat(pad as u8).take(pad));
    cbc_encrypt(cipher, key, iv, &padded).unwrap()
}
