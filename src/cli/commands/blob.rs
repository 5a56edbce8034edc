//! `unprotect blob` — decrypt one CryptProtectData blob file.

use std::fs;
use std::path::Path;

use crate::cli::output;
use crate::cli::{build_pool, unlock_pool, CredentialArgs, PoolArgs};
use crate::config::UnlockOptions;
use crate::decrypt::decrypt_blob;
use crate::errors::Result;
use crate::format::reader::utf16le_to_string_strict;

/// Execute the `blob` command.
pub fn execute(
    pool_args: &PoolArgs,
    credential: &CredentialArgs,
    file: &Path,
    entropy: Option<&str>,
    out: Option<&Path>,
) -> Result<()> {
    let entropy = entropy.map(hex::decode).transpose()?;

    let pool = build_pool(pool_args)?;
    unlock_pool(&pool, credential, &UnlockOptions::default())?;

    let raw = fs::read(file)?;
    let clear = decrypt_blob(&raw, &pool, entropy.as_deref())?;

    match out {
        Some(dest) => {
            fs::write(dest, clear.as_slice())?;
            output::success(&format!(
                "{} plaintext byte(s) written to {}",
                clear.len(),
                dest.display()
            ));
        }
        None => println!("{}", render_plaintext(&clear)),
    }
    Ok(())
}

/// Blob plaintexts are usually UTF-16 text, sometimes UTF-8, sometimes
/// neither; print the best readable form.
fn render_plaintext(clear: &[u8]) -> String {
    if let Some(text) = utf16le_to_string_strict(clear) {
        return text;
    }
    match std::str::from_utf8(clear) {
        Ok(text) => text.trim_end_matches('\0').to_string(),
        Err(_) => hex::encode(clear),
    }
}
