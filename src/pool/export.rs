//! Crackable export of a master key record.
//!
//! The `$DPAPImk$` line feeds hashcat modes 15300 (SHA-1/3DES records) and
//! 15900 (SHA-512/AES records) or John's dpapimk format. It carries the
//! record's public derivation parameters and ciphertext only; producing it
//! never requires, or performs, a decryption.

use crate::format::masterkey::KeyDerivationRecord;

/// How the SID's prekey should be derived by the cracker. Local accounts
/// and domain accounts bind differently, and Windows 10 1607 changed the
/// domain derivation once more.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashContext {
    Local,
    Domain,
    Domain1607,
}

impl HashContext {
    fn code(self) -> u32 {
        match self {
            HashContext::Local => 1,
            HashContext::Domain => 2,
            HashContext::Domain1607 => 3,
        }
    }
}

pub(crate) fn format_dpapi_hash(
    sid: &str,
    record: &KeyDerivationRecord,
    context: HashContext,
) -> String {
    let ct_hex = hex::encode(&record.ciphertext);
    format!(
        "$DPAPImk${}*{}*{}*{}*{}*{}*{}*{}*{}",
        record.version,
        context.code(),
        sid,
        record.cipher.label(),
        record.hash.label(),
        record.rounds,
        hex::encode(record.salt),
        ct_hex.len(),
        ct_hex,
    )
}
