//! DPAPI blob decryption.
//!
//! A blob names the master key that protected it, so the pool does the
//! lookup and this module does the cryptography: derive the per-blob
//! session key, verify the envelope MAC in constant time, then decrypt.
//! Nothing is released until the MAC has passed.

use subtle::ConstantTimeEq;
use tracing::debug;
use zeroize::Zeroizing;

use crate::crypto::{
    cbc_decrypt, crypt_derive_key, session_key, strip_padding, MasterKey, SESSION_SCHEMES,
};
use crate::errors::{DpapiError, Result};
use crate::format::DpapiBlob;
use crate::pool::MasterKeyPool;

/// Parses `raw` as a DPAPI blob and decrypts it with the pool's cached
/// master keys. `entropy` is the optional secondary secret some callers
/// of CryptProtectData mix in; it must match byte for byte.
pub fn decrypt_blob(
    raw: &[u8],
    pool: &MasterKeyPool,
    entropy: Option<&[u8]>,
) -> Result<Zeroizing<Vec<u8>>> {
    let blob = DpapiBlob::parse(raw)?;
    decrypt_parsed(&blob, pool, entropy)
}

/// Same as [`decrypt_blob`] for an already-parsed envelope.
pub fn decrypt_parsed(
    blob: &DpapiBlob,
    pool: &MasterKeyPool,
    entropy: Option<&[u8]>,
) -> Result<Zeroizing<Vec<u8>>> {
    let master_key = pool.resolve(&blob.master_key_guid)?;
    decrypt_with_master_key(blob, &master_key, entropy)
}

/// Decrypts `blob` under a specific master key.
///
/// Both session-key schemes Windows has shipped are tried: the standard
/// HMAC construction first, then the pre-Vista variant that reinitializes
/// the pads by hand. Whichever scheme authenticates the envelope is the
/// one used to derive the cipher key, so a wrong key or wrong entropy is
/// caught before a single block is decrypted.
pub fn decrypt_with_master_key(
    blob: &DpapiBlob,
    master_key: &MasterKey,
    entropy: Option<&[u8]>,
) -> Result<Zeroizing<Vec<u8>>> {
    for scheme in SESSION_SCHEMES {
        let expected = session_key(
            scheme,
            blob.hash,
            master_key.as_bytes(),
            &blob.hmac_nonce,
            entropy,
            Some(blob.signed_span()),
        );
        if !bool::from(expected.ct_eq(&blob.signature)) {
            debug!(?scheme, "blob signature mismatch");
            continue;
        }

        let session = session_key(
            scheme,
            blob.hash,
            master_key.as_bytes(),
            &blob.salt,
            entropy,
            None,
        );
        let key = crypt_derive_key(blob.hash, blob.cipher, &session);
        let iv = vec![0u8; blob.cipher.iv_len()];
        let mut clear = Zeroizing::new(cbc_decrypt(blob.cipher, &key, &iv, &blob.ciphertext)?);
        strip_padding(blob.cipher, &mut clear);
        return Ok(clear);
    }

    // The master key itself verified when it was unlocked, so a MAC failure
    // here means the inputs to the MAC are wrong. Without entropy the most
    // likely missing input is the entropy itself.
    if entropy.is_none() {
        Err(DpapiError::EntropyRequired)
    } else {
        Err(DpapiError::WrongCredential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{cbc_encrypt, CipherKind, HashKind, SessionScheme};
    use crate::format::blob::PROVIDER;
    use crate::format::Guid;

    fn push_len_prefixed(out: &mut Vec<u8>, data: &[u8]) {
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
    }

    fn build_blob(
        master_key: &MasterKey,
        cipher: CipherKind,
        hash: HashKind,
        scheme: SessionScheme,
        plaintext: &[u8],
        entropy: Option<&[u8]>,
    ) -> Vec<u8> {
        let guid = Guid::parse("7fadf852-0e1d-42f7-b4f5-95f2f1f26a01").unwrap();
        let salt = [0x51u8; 32];
        let nonce = [0x62u8; 32];

        // Forward direction of the envelope: derive, pad, encrypt, sign.
        let session = session_key(scheme, hash, master_key.as_bytes(), &salt, entropy, None);
        let key = crypt_derive_key(hash, cipher, &session);
        let mut padded = plaintext.to_vec();
        let pad = cipher.block_len() - padded.len() % cipher.block_len();
        padded.extend(std::iter::repeat(pad as u8).take(pad));
        let iv = vec![0u8; cipher.iv_len()];
        let ct = cbc_encrypt(cipher, &key, &iv, &padded).unwrap();

        let mut raw = Vec::new();
        raw.extend_from_slice(&1u32.to_le_bytes());
        raw.extend_from_slice(&PROVIDER);
        let signed_start = raw.len();
        raw.extend_from_slice(&2u32.to_le_bytes()); // master key version
        raw.extend_from_slice(&guid.to_le_bytes());
        raw.extend_from_slice(&0u32.to_le_bytes()); // flags
        push_len_prefixed(&mut raw, &[]); // description
        raw.extend_from_slice(&cipher.alg_id().to_le_bytes());
        raw.extend_from_slice(&((cipher.key_len() * 8) as u32).to_le_bytes());
        push_len_prefixed(&mut raw, &salt);
        push_len_prefixed(&mut raw, &[]); // strong
        raw.extend_from_slice(&hash.alg_id().to_le_bytes());
        raw.extend_from_slice(&((hash.digest_len() * 8) as u32).to_le_bytes());
        push_len_prefixed(&mut raw, &nonce);
        push_len_prefixed(&mut raw, &ct);

        let signature = session_key(
            scheme,
            hash,
            master_key.as_bytes(),
            &nonce,
            entropy,
            Some(&raw[signed_start..]),
        );
        push_len_prefixed(&mut raw, &signature);
        raw
    }

    fn test_master_key() -> MasterKey {
        let mut bytes = [0u8; 64];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = (i as u8).wrapping_mul(7).wrapping_add(3);
        }
        MasterKey::new(bytes)
    }

    #[test]
    fn roundtrip_without_entropy() {
        let mk = test_master_key();
        let raw = build_blob(
            &mk,
            CipherKind::Aes256,
            HashKind::Sha512,
            SessionScheme::Standard,
            b"the protected payload",
            None,
        );
        let blob = DpapiBlob::parse(&raw).unwrap();
        let clear = decrypt_with_master_key(&blob, &mk, None).unwrap();
        assert_eq!(clear.as_slice(), b"the protected payload");
    }

    #[test]
    fn compat_scheme_is_tried_as_fallback() {
        let mk = test_master_key();
        let raw = build_blob(
            &mk,
            CipherKind::TripleDes,
            HashKind::Sha1,
            SessionScheme::Compat,
            b"legacy envelope",
            None,
        );
        let blob = DpapiBlob::parse(&raw).unwrap();
        let clear = decrypt_with_master_key(&blob, &mk, None).unwrap();
        assert_eq!(clear.as_slice(), b"legacy envelope");
    }

    #[test]
    fn entropy_participates_in_mac_and_key() {
        let mk = test_master_key();
        let raw = build_blob(
            &mk,
            CipherKind::Aes256,
            HashKind::Sha512,
            SessionScheme::Standard,
            b"needs a second secret",
            Some(b"app-entropy"),
        );
        let blob = DpapiBlob::parse(&raw).unwrap();

        let clear = decrypt_with_master_key(&blob, &mk, Some(b"app-entropy")).unwrap();
        assert_eq!(clear.as_slice(), b"needs a second secret");

        // Missing entropy is reported as such, wrong entropy as a bad credential.
        match decrypt_with_master_key(&blob, &mk, None) {
            Err(DpapiError::EntropyRequired) => {}
            other => panic!("expected EntropyRequired, got {other:?}"),
        }
        match decrypt_with_master_key(&blob, &mk, Some(b"different")) {
            Err(DpapiError::WrongCredential) => {}
            other => panic!("expected WrongCredential, got {other:?}"),
        }
    }

    #[test]
    fn tampered_ciphertext_fails_the_mac() {
        let mk = test_master_key();
        let mut raw = build_blob(
            &mk,
            CipherKind::Aes256,
            HashKind::Sha512,
            SessionScheme::Standard,
            b"integrity matters",
            Some(b"ent"),
        );
        // Flip one bit somewhere inside the ciphertext field.
        let idx = raw.len() - 80;
        raw[idx] ^= 0x01;
        let blob = DpapiBlob::parse(&raw).unwrap();
        match decrypt_with_master_key(&blob, &mk, Some(b"ent")) {
            Err(DpapiError::WrongCredential) => {}
            other => panic!("expected WrongCredential, got {other:?}"),
        }
    }

    #[test]
    fn wrong_master_key_is_rejected() {
        let mk = test_master_key();
        let raw = build_blob(
            &mk,
            CipherKind::Aes256,
            HashKind::Sha512,
            SessionScheme::Standard,
            b"secret",
            None,
        );
        let blob = DpapiBlob::parse(&raw).unwrap();
        let other = MasterKey::new([0xEEu8; 64]);
        assert!(decrypt_with_master_key(&blob, &other, None).is_err());
    }
}
