//! `unprotect vault` — decrypt every item in a Windows Vault directory.

use std::path::Path;

use crate::cli::output;
use crate::cli::{build_pool, unlock_pool, CredentialArgs, PoolArgs};
use crate::config::UnlockOptions;
use crate::decrypt::decrypt_vault;
use crate::errors::Result;

/// Execute the `vault` command.
pub fn execute(
    pool_args: &PoolArgs,
    credential: &CredentialArgs,
    dir: &Path,
    json: bool,
) -> Result<()> {
    let pool = build_pool(pool_args)?;
    unlock_pool(&pool, credential, &UnlockOptions::default())?;

    let secrets = decrypt_vault(dir, &pool)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&secrets)?);
    } else {
        output::print_vault_table(&secrets);
    }
    Ok(())
}
