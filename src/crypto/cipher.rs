//! CBC block-cipher plumbing shared by master-key records, blobs and vault
//! attributes. Padding is handled by the callers' protocols, not the cipher
//! layer: master-key records are exact multiples, blobs carry PKCS-style
//! trailers that are stripped only after their MAC has been verified.

use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::crypto::algs::CipherKind;
use crate::errors::{DpapiError, Result};

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type TdesCbcDec = cbc::Decryptor<des::TdesEde3>;
type TdesCbcEnc = cbc::Encryptor<des::TdesEde3>;

/// CBC-decrypts `ciphertext` in full. The buffer must already be a multiple
/// of the cipher's block size; record parsers enforce that invariant.
pub fn cbc_decrypt(kind: CipherKind, key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    check_lengths(kind, key, iv, ciphertext.len())?;
    let mut buf = ciphertext.to_vec();
    let out_len = match kind {
        CipherKind::Aes128 => Aes128CbcDec::new_from_slices(key, iv)
            .map_err(|e| DpapiError::MalformedStructure(format!("AES-128-CBC setup: {e}")))?
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map_err(|_| DpapiError::MalformedStructure("AES-128-CBC decrypt".into()))?
            .len(),
        CipherKind::Aes256 => Aes256CbcDec::new_from_slices(key, iv)
            .map_err(|e| DpapiError::MalformedStructure(format!("AES-256-CBC setup: {e}")))?
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map_err(|_| DpapiError::MalformedStructure("AES-256-CBC decrypt".into()))?
            .len(),
        CipherKind::TripleDes => TdesCbcDec::new_from_slices(key, iv)
            .map_err(|e| DpapiError::MalformedStructure(format!("3DES-CBC setup: {e}")))?
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map_err(|_| DpapiError::MalformedStructure("3DES-CBC decrypt".into()))?
            .len(),
    };
    buf.truncate(out_len);
    Ok(buf)
}

/// CBC-encrypts an exact multiple of the block size. Exists for the same
/// protocols in the forward direction (and for building test artifacts).
pub fn cbc_encrypt(kind: CipherKind, key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    check_lengths(kind, key, iv, plaintext.len())?;
    let len = plaintext.len();
    let mut buf = plaintext.to_vec();
    match kind {
        CipherKind::Aes128 => {
            Aes128CbcEnc::new_from_slices(key, iv)
                .map_err(|e| DpapiError::MalformedStructure(format!("AES-128-CBC setup: {e}")))?
                .encrypt_padded_mut::<NoPadding>(&mut buf, len)
                .map_err(|_| DpapiError::MalformedStructure("AES-128-CBC encrypt".into()))?;
        }
        CipherKind::Aes256 => {
            Aes256CbcEnc::new_from_slices(key, iv)
                .map_err(|e| DpapiError::MalformedStructure(format!("AES-256-CBC setup: {e}")))?
                .encrypt_padded_mut::<NoPadding>(&mut buf, len)
                .map_err(|_| DpapiError::MalformedStructure("AES-256-CBC encrypt".into()))?;
        }
        CipherKind::TripleDes => {
            TdesCbcEnc::new_from_slices(key, iv)
                .map_err(|e| DpapiError::MalformedStructure(format!("3DES-CBC setup: {e}")))?
                .encrypt_padded_mut::<NoPadding>(&mut buf, len)
                .map_err(|_| DpapiError::MalformedStructure("3DES-CBC encrypt".into()))?;
        }
    }
    Ok(buf)
}

fn check_lengths(kind: CipherKind, key: &[u8], iv: &[u8], data_len: usize) -> Result<()> {
    if key.len() != kind.key_len() || iv.len() != kind.iv_len() {
        return Err(DpapiError::MalformedStructure(format!(
            "{} key/iv length {}/{}",
            kind.label(),
            key.len(),
            iv.len()
        )));
    }
    if data_len % kind.block_len() != 0 {
        return Err(DpapiError::MalformedStructure(format!(
            "{} data length {data_len} not a multiple of {}",
            kind.label(),
            kind.block_len()
        )));
    }
    Ok(())
}

/// Strips a PKCS-style trailer the way CryptUnprotectData does: trust the
/// last byte as a pad count when it is plausible, leave the buffer alone
/// otherwise. Only called on plaintext whose MAC already verified.
pub fn strip_padding(kind: CipherKind, buf: &mut Vec<u8>) {
    if let Some(&pad) = buf.last() {
        let pad = pad as usize;
        if pad >= 1 && pad <= kind.block_len() && pad <= buf.len() {
            buf.truncate(buf.len() - pad);
        }
    }
}

/// Forces odd parity on every key byte, matching what CryptDeriveKey does
/// before handing expanded material to DES. The DES key schedule ignores
/// parity bits, so this only affects the bytes we report, not the result.
pub(crate) fn fix_des_parity(key: &mut [u8]) {
    for b in key.iter_mut() {
        let ones = (*b >> 1).count_ones();
        *b = (*b & 0xFE) | ((ones & 1) ^ 1) as u8;
    }
}
