use std::path::PathBuf;
use thiserror::Error;

use crate::format::Guid;

/// All errors that can occur while working with a DPAPI store.
///
/// `WrongCredential` is an expected outcome during unlock attempts, not an
/// exceptional condition; batch operations record it per item and continue.
#[derive(Debug, Error)]
pub enum DpapiError {
    // --- Structure errors ---
    #[error("truncated {context}: need {needed} bytes, {available} available")]
    Truncated {
        context: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("malformed structure: {0}")]
    MalformedStructure(String),

    #[error("unsupported algorithm id {0:#06x}")]
    UnsupportedAlgorithm(u32),

    // --- Key errors ---
    #[error("no master key {0} in the pool")]
    KeyNotFound(Guid),

    #[error("wrong credential — verifier mismatch after decryption")]
    WrongCredential,

    #[error("blob requires caller-supplied entropy to decrypt")]
    EntropyRequired,

    #[error("no preferred master key marker in the pool")]
    PreferredKeyUnknown,

    // --- Config errors ---
    #[error("invalid SID '{0}'")]
    InvalidSid(String),

    #[error("unusable credential hash: {0}")]
    InvalidHash(String),

    #[error("path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("invalid hex input: {0}")]
    Hex(#[from] hex::FromHexError),

    // --- IO and rendering errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("password prompt failed: {0}")]
    Prompt(String),
}

/// Convenience type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DpapiError>;
