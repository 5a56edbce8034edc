//! Recovered master-key material.
//!
//! A DPAPI master key is always 64 bytes of raw symmetric key. Once a record
//! verifies, the key lives in the pool cache for the rest of the process, so
//! the wrapper zeroes itself on drop and never implements `Debug`. The only
//! ways out are `as_bytes` for derivation and `to_hex` for reporting.

use zeroize::Zeroize;

/// Length of a decrypted DPAPI master key.
pub const MASTER_KEY_LEN: usize = 64;

#[derive(Zeroize, Clone)]
#[zeroize(drop)]
pub struct MasterKey {
    bytes: [u8; MASTER_KEY_LEN],
}

impl MasterKey {
    pub fn new(bytes: [u8; MASTER_KEY_LEN]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; MASTER_KEY_LEN] {
        &self.bytes
    }

    /// Hex rendering for outcome records and reports.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

impl PartialEq for MasterKey {
    fn eq(&self, other: &Self) -> bool {
        use subtle::ConstantTimeEq;
        self.bytes.ct_eq(&other.bytes).into()
    }
}

impl Eq for MasterKey {}
