//! Credential Manager file decryption.
//!
//! A `.cred` file (the files under `Credentials/` and
//! `Protect/../Credentials` in a user profile) is a thin wrapper around
//! one DPAPI blob; the plaintext carries the stored target, username and
//! secret.

use crate::decrypt::blob::decrypt_parsed;
use crate::errors::{DpapiError, Result};
use crate::format::cred::{CredFile, Credential};
use crate::pool::MasterKeyPool;

/// Parses and decrypts a credential file with the pool's cached keys.
///
/// Credential blobs never carry caller entropy, so an envelope MAC failure
/// here means the unlocking credential was wrong for this blob, not that
/// entropy is missing.
pub fn decrypt_cred(raw: &[u8], pool: &MasterKeyPool) -> Result<Credential> {
    let file = CredFile::parse(raw)?;
    let clear = match decrypt_parsed(&file.blob, pool, None) {
        Err(DpapiError::EntropyRequired) => return Err(DpapiError::WrongCredential),
        other => other?,
    };
    Credential::parse(&clear)
}
