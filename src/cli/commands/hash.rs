//! `unprotect hash` — export the preferred master key as a crackable
//! `$DPAPImk$` line. Needs no credential: the point is to recover one.

use crate::cli::{build_pool, ContextArg, PoolArgs};
use crate::errors::Result;

/// Execute the `hash` command.
pub fn execute(pool_args: &PoolArgs, context: ContextArg) -> Result<()> {
    let pool = build_pool(pool_args)?;
    // Raw line on stdout so it pipes straight into a cracker.
    let line = pool.dpapi_hash(context.into())?;
    println!("{line}");
    Ok(())
}
