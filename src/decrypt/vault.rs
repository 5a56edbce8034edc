//! Windows Vault decryption.
//!
//! Two stages: the `Policy.vpol` envelope is opened with a pool master key
//! and yields the vault's AES key pair, then every `.vcrd` item in the
//! directory is decrypted attribute by attribute with those keys. Failures
//! stay local: an unreadable item or attribute is logged and skipped, and
//! whatever else decrypted is still reported.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::crypto::{cbc_decrypt, strip_padding, CipherKind};
use crate::decrypt::blob::decrypt_parsed;
use crate::errors::{DpapiError, Result};
use crate::format::guid::Guid;
use crate::format::reader::utf16le_to_string_strict;
use crate::format::vault::{VaultAttribute, VaultItem, VaultKeys, VaultPolicy};
use crate::pool::MasterKeyPool;

const POLICY_FILE_NAME: &str = "Policy.vpol";

/// One recovered vault item. Fields the item did not carry, or whose
/// attribute failed to decrypt, stay `None`.
#[derive(Debug, Clone, Serialize)]
pub struct VaultSecret {
    pub schema: Guid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_written: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authenticator: Option<String>,
}

/// Decrypts every item in a vault directory (for example
/// `%LOCALAPPDATA%\Microsoft\Vault\<guid>`).
pub fn decrypt_vault(dir: &Path, pool: &MasterKeyPool) -> Result<Vec<VaultSecret>> {
    let keys = unlock_policy(dir, pool)?;

    let mut item_paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_item = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("vcrd"));
        if is_item {
            item_paths.push(path);
        }
    }
    item_paths.sort();

    let mut secrets = Vec::new();
    for path in item_paths {
        let parsed = std::fs::read(&path)
            .map_err(DpapiError::from)
            .and_then(|raw| VaultItem::parse(&raw));
        match parsed {
            Ok(item) => secrets.push(decrypt_item(&item, &keys)),
            Err(err) => warn!(path = %path.display(), %err, "unreadable vault item, skipping"),
        }
    }
    Ok(secrets)
}

/// Finds and opens the vault's `Policy.vpol`, returning its key pair.
fn unlock_policy(dir: &Path, pool: &MasterKeyPool) -> Result<VaultKeys> {
    let mut policy_path = dir.join(POLICY_FILE_NAME);
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.eq_ignore_ascii_case(POLICY_FILE_NAME));
        if matches {
            policy_path = path;
            break;
        }
    }

    let policy = VaultPolicy::parse(&std::fs::read(&policy_path)?)?;
    debug!(name = %policy.name, guid = %policy.guid, "unlocking vault policy");
    let clear = match decrypt_parsed(&policy.key_blob, pool, None) {
        // Policy blobs carry no caller entropy.
        Err(DpapiError::EntropyRequired) => return Err(DpapiError::WrongCredential),
        other => other?,
    };
    VaultKeys::parse(&clear)
}

fn decrypt_item(item: &VaultItem, keys: &VaultKeys) -> VaultSecret {
    let mut secret = VaultSecret {
        schema: item.schema,
        name: item.name.clone(),
        last_written: item.last_written,
        resource: None,
        identity: None,
        authenticator: None,
    };
    for attr in &item.attributes {
        let slot = match attr.id {
            1 => &mut secret.resource,
            2 => &mut secret.identity,
            3 => &mut secret.authenticator,
            other => {
                debug!(id = other, "vault attribute outside the schema triple, ignoring");
                continue;
            }
        };
        match decrypt_attribute(attr, keys) {
            Ok(text) => *slot = Some(text),
            Err(err) => warn!(id = attr.id, %err, "vault attribute failed to decrypt"),
        }
    }
    secret
}

/// Decrypts one attribute payload. An explicit IV selects the AES-256 key;
/// otherwise the AES-128 key is used with a zero IV.
fn decrypt_attribute(attr: &VaultAttribute, keys: &VaultKeys) -> Result<String> {
    let (cipher, mut clear) = match &attr.iv {
        Some(iv) => (
            CipherKind::Aes256,
            cbc_decrypt(CipherKind::Aes256, &keys.aes256, iv, &attr.data)?,
        ),
        None => (
            CipherKind::Aes128,
            cbc_decrypt(CipherKind::Aes128, &keys.aes128, &[0u8; 16], &attr.data)?,
        ),
    };
    strip_padding(cipher, &mut clear);

    // Most payloads are UTF-16 text; anything else is reported as hex
    // rather than dropped.
    Ok(utf16le_to_string_strict(&clear).unwrap_or_else(|| hex::encode(&clear)))
}
