//! `unprotect cred` — decrypt a Credential Manager file.

use std::fs;
use std::path::Path;

use crate::cli::output;
use crate::cli::{build_pool, unlock_pool, CredentialArgs, PoolArgs};
use crate::config::UnlockOptions;
use crate::decrypt::decrypt_cred;
use crate::errors::Result;

/// Execute the `cred` command.
pub fn execute(
    pool_args: &PoolArgs,
    credential: &CredentialArgs,
    file: &Path,
    json: bool,
) -> Result<()> {
    let pool = build_pool(pool_args)?;
    unlock_pool(&pool, credential, &UnlockOptions::default())?;

    let raw = fs::read(file)?;
    let cred = decrypt_cred(&raw, &pool)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&cred)?);
    } else {
        output::print_credential_table(&cred);
    }
    Ok(())
}
