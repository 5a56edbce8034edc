//! Cryptographic primitives for unprotect.
//!
//! This module provides:
//! - CryptoAPI algorithm identifiers and their parameters (`algs`)
//! - CBC block cipher wrappers for AES and 3DES (`cipher`)
//! - prekey candidates and the master-key KDF chain (`kdf`)
//! - the 64-byte master key container (`keys`)
//! - per-blob session keys and `CryptDeriveKey` (`session`)

pub mod algs;
pub mod cipher;
pub mod kdf;
pub mod keys;
pub mod session;

// Re-export the most commonly used items so callers can write:
//   use crate::crypto::{CipherKind, MasterKey, session_key, ...};
pub use algs::{CipherKind, HashKind};
pub use cipher::{cbc_decrypt, cbc_encrypt, strip_padding};
pub use kdf::{derive_and_decrypt, ms_pbkdf2, record_verifier, unlock_record};
pub use keys::{MasterKey, MASTER_KEY_LEN};
pub use session::{crypt_derive_key, session_key, SessionScheme, SESSION_SCHEMES};
