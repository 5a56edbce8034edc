//! Per-blob session keys and the CryptoAPI key expansion.
//!
//! A blob is never decrypted with the master key directly. The master key
//! (via its SHA-1 when longer than 20 bytes, which it always is) keys an
//! HMAC over the blob salt plus optional caller entropy; the result is run
//! through `CryptDeriveKey`'s pad expansion when the digest is shorter than
//! the cipher key. The same construction, with the blob's stored nonce and
//! the envelope bytes appended, produces the signature that authenticates
//! the blob.
//!
//! Two keying schemes exist in the wild: the RFC-conformant HMAC used since
//! Vista, and the older construction that rebuilds the inner/outer pads by
//! hand and appends entropy outside the inner hash. Decryptors try the
//! standard scheme first and fall back to the compat one.

use sha1::{Digest, Sha1};
use sha2::Sha512;
use zeroize::Zeroizing;

use crate::crypto::algs::{CipherKind, HashKind};
use crate::crypto::cipher::fix_des_parity;
use crate::crypto::kdf::hmac_digest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionScheme {
    /// Standard HMAC keying (Vista and later).
    Standard,
    /// Pre-Vista hand-built pads; entropy and trailer are hashed into the
    /// outer stage only.
    Compat,
}

/// Schemes in the order decryptors should try them.
pub const SESSION_SCHEMES: [SessionScheme; 2] = [SessionScheme::Standard, SessionScheme::Compat];

/// Computes a session key (or, with `tail` set to the envelope bytes, a
/// blob signature) from the master key and a nonce.
pub fn session_key(
    scheme: SessionScheme,
    kind: HashKind,
    master_key: &[u8],
    nonce: &[u8],
    entropy: Option<&[u8]>,
    tail: Option<&[u8]>,
) -> Zeroizing<Vec<u8>> {
    // Long keys are folded through SHA-1 first, regardless of the declared
    // digest. Master keys are 64 bytes, so this always applies to them.
    let secret: Zeroizing<Vec<u8>> = if master_key.len() > 20 {
        Zeroizing::new(Sha1::digest(master_key).to_vec())
    } else {
        Zeroizing::new(master_key.to_vec())
    };

    match scheme {
        SessionScheme::Standard => {
            let mut parts: Vec<&[u8]> = vec![nonce];
            if let Some(e) = entropy {
                parts.push(e);
            }
            if let Some(t) = tail {
                parts.push(t);
            }
            Zeroizing::new(hmac_digest(kind, &secret, &parts))
        }
        SessionScheme::Compat => {
            let block = kind.block_len();
            let mut padded = Zeroizing::new(vec![0u8; block]);
            padded[..secret.len().min(block)]
                .copy_from_slice(&secret[..secret.len().min(block)]);

            let ipad: Vec<u8> = padded.iter().map(|b| b ^ 0x36).collect();
            let opad: Vec<u8> = padded.iter().map(|b| b ^ 0x5c).collect();

            let inner = hash_parts(kind, &[&ipad, nonce]);
            let mut outer: Vec<&[u8]> = vec![&opad, &inner];
            if let Some(e) = entropy {
                outer.push(e);
            }
            if let Some(t) = tail {
                outer.push(t);
            }
            Zeroizing::new(hash_parts(kind, &outer))
        }
    }
}

/// `CryptDeriveKey`: turns a session key into cipher keying material. A
/// digest at least as long as the cipher key is used as-is (truncated);
/// shorter digests are expanded with the 0x36/0x5c pad construction, and
/// 3DES material gets its parity bits fixed up.
pub fn crypt_derive_key(
    kind: HashKind,
    cipher: CipherKind,
    session_key: &[u8],
) -> Zeroizing<Vec<u8>> {
    let mut key = Zeroizing::new(session_key.to_vec());
    if key.len() > kind.block_len() {
        *key = hash_parts(kind, &[&key]);
    }
    if key.len() >= cipher.key_len() {
        key.truncate(cipher.key_len());
        return key;
    }

    key.resize(kind.block_len(), 0);
    let ipad: Vec<u8> = key.iter().map(|b| b ^ 0x36).collect();
    let opad: Vec<u8> = key.iter().map(|b| b ^ 0x5c).collect();
    let mut expanded = Zeroizing::new(hash_parts(kind, &[&ipad]));
    expanded.extend_from_slice(&hash_parts(kind, &[&opad]));
    if cipher == CipherKind::TripleDes {
        fix_des_parity(&mut expanded);
    }
    expanded.truncate(cipher.key_len());
    expanded
}

fn hash_parts(kind: HashKind, parts: &[&[u8]]) -> Vec<u8> {
    match kind {
        HashKind::Sha1 => {
            let mut h = Sha1::new();
            for p in parts {
                h.update(p);
            }
            h.finalize().to_vec()
        }
        HashKind::Sha512 => {
            let mut h = Sha512::new();
            for p in parts {
                h.update(p);
            }
            h.finalize().to_vec()
        }
    }
}
