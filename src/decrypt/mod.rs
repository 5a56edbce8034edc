//! Decryption of the artifacts DPAPI protects.
//!
//! This module provides:
//! - blob decryption against a pool of unlocked master keys (`blob`)
//! - Credential Manager file decryption (`cred`)
//! - Windows Vault policy and item decryption (`vault`)

pub mod blob;
pub mod cred;
pub mod vault;

// Re-export the most commonly used items so callers can write:
//   use crate::decrypt::{decrypt_blob, decrypt_cred, decrypt_vault};
pub use blob::{decrypt_blob, decrypt_parsed, decrypt_with_master_key};
pub use cred::decrypt_cred;
pub use vault::{decrypt_vault, VaultSecret};
